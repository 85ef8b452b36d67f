use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    error::IdentifierError,
    types::{RegisteredGroup, Site, PATIENT_GROUP_IDENTIFIER_TYPE},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierRequest {
    pub identifier_type: String,
    pub group_identifier_as_pk: Uuid,
    pub requesting_model: String,
    pub site: Site,
}

#[async_trait]
pub trait IdentifierGenerator {
    async fn identifier(&self, request: &IdentifierRequest) -> Result<String, IdentifierError>;
}

/// Where registered groups live. `register_if_absent` must be atomic on the pk.
#[async_trait]
pub trait GroupRegistry {
    async fn registration(&self, pk: Uuid) -> Result<Option<RegisteredGroup>, IdentifierError>;

    async fn next_sequence(&self, site_id: i32) -> Result<u32, IdentifierError>;

    /// Returns the stored registration, which is the existing one if the pk was already taken.
    async fn register_if_absent(
        &self,
        candidate: RegisteredGroup,
    ) -> Result<RegisteredGroup, IdentifierError>;
}

const MAX_SITE_ID: i32 = 99;
const MAX_SEQUENCE: u32 = 99_999;

/// Issues `{protocol}{site:02}{sequence:05}{check}` identifiers and registers the group.
/// Asking twice for the same group returns the same identifier.
#[derive(Clone)]
pub struct GroupIdentifier {
    protocol_number: String,
    registry: Arc<dyn GroupRegistry + Send + Sync>,
}

impl GroupIdentifier {
    pub fn new(protocol_number: &str, registry: Arc<dyn GroupRegistry + Send + Sync>) -> Self {
        GroupIdentifier {
            protocol_number: protocol_number.to_string(),
            registry,
        }
    }

    /// Both fields are fixed width, so out-of-range values are refused rather than widened.
    pub fn format(&self, site_id: i32, sequence: u32) -> Result<String, IdentifierError> {
        if !(0..=MAX_SITE_ID).contains(&site_id) {
            return Err(IdentifierError::SiteOutOfRange(site_id));
        }
        if !(1..=MAX_SEQUENCE).contains(&sequence) {
            return Err(IdentifierError::SequenceOutOfRange { site_id, sequence });
        }
        let payload = format!("{}{:02}{:05}", self.protocol_number, site_id, sequence);
        let check = luhn_check_digit(&payload);
        Ok(format!("{payload}{check}"))
    }
}

#[async_trait]
impl IdentifierGenerator for GroupIdentifier {
    #[instrument(skip_all, fields(group = %request.group_identifier_as_pk, site = request.site.id))]
    async fn identifier(&self, request: &IdentifierRequest) -> Result<String, IdentifierError> {
        if request.identifier_type != PATIENT_GROUP_IDENTIFIER_TYPE {
            return Err(IdentifierError::UnsupportedType(
                request.identifier_type.clone(),
            ));
        }

        if let Some(existing) = self
            .registry
            .registration(request.group_identifier_as_pk)
            .await?
        {
            return Ok(existing.group_identifier);
        }

        if !(0..=MAX_SITE_ID).contains(&request.site.id) {
            return Err(IdentifierError::SiteOutOfRange(request.site.id));
        }
        let sequence = self.registry.next_sequence(request.site.id).await?;
        let identifier = self.format(request.site.id, sequence)?;
        let registered = self
            .registry
            .register_if_absent(RegisteredGroup {
                group_identifier: identifier,
                group_identifier_as_pk: request.group_identifier_as_pk,
                site_id: request.site.id,
                registration_datetime: Utc::now(),
                randomization_datetime: None,
                sid: None,
            })
            .await?;

        tracing::debug!(
            identifier = %registered.group_identifier,
            requesting_model = %request.requesting_model,
            "registered group"
        );
        Ok(registered.group_identifier)
    }
}

/// Luhn mod 10 over the digits of `payload`; anything that isn't a digit is skipped.
pub fn luhn_check_digit(payload: &str) -> u32 {
    let sum: u32 = payload
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 0 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    (10 - sum % 10) % 10
}
