use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use crate::{
    config::Config,
    eligibility::EligibilityGate,
    error::{GroupRandomizationError, IdentifierError},
    group_identifier::{IdentifierGenerator, IdentifierRequest},
    group_store::GroupStore,
    randomizer::RandomizerRegistry,
    types::{
        is_placeholder_identifier, Group, GroupRandomizationUpdate, RandomizationReport,
        RandomizationRequest, PATIENT_GROUP_IDENTIFIER_TYPE, PATIENT_GROUP_MODEL,
    },
};

/// Gates a group, has it allocated exactly once, and writes the outcome back.
///
/// Holds no locks and never retries: serializing concurrent attempts is the
/// randomizer's job, and whatever it reports is passed through untouched.
#[derive(Clone)]
pub struct RandomizeGroup {
    gate: EligibilityGate,
    randomizers: Arc<RandomizerRegistry>,
    identifiers: Arc<dyn IdentifierGenerator + Send + Sync>,
    groups: Arc<dyn GroupStore + Send + Sync>,
    randomizer_name: String,
}

impl RandomizeGroup {
    pub fn new(
        gate: EligibilityGate,
        randomizers: Arc<RandomizerRegistry>,
        identifiers: Arc<dyn IdentifierGenerator + Send + Sync>,
        groups: Arc<dyn GroupStore + Send + Sync>,
        randomizer_name: &str,
    ) -> Self {
        RandomizeGroup {
            gate,
            randomizers,
            identifiers,
            groups,
            randomizer_name: randomizer_name.to_string(),
        }
    }

    pub fn from_config(
        config: &Config,
        randomizers: Arc<RandomizerRegistry>,
        identifiers: Arc<dyn IdentifierGenerator + Send + Sync>,
        groups: Arc<dyn GroupStore + Send + Sync>,
    ) -> Self {
        Self::new(
            EligibilityGate::new(config.min_group_size),
            randomizers,
            identifiers,
            groups,
            &config.randomizer_name,
        )
    }

    /// On success `group` is replaced by its reloaded, randomized state.
    #[instrument(skip_all, fields(group = %group.group_identifier_as_pk, site = %group.site.name))]
    pub async fn randomize_group(
        &self,
        group: &mut Group,
    ) -> Result<RandomizationReport, GroupRandomizationError> {
        self.gate.assess(group).await?;

        self.randomize(group).await?;

        tracing::info!(
            group_identifier = %group.group_identifier,
            "group randomized"
        );
        Ok(RandomizationReport {
            success: true,
            timestamp: Utc::now(),
            user_modified: group.user_modified.clone(),
            group_identifier: group.group_identifier.clone(),
        })
    }

    async fn randomize(&self, group: &mut Group) -> Result<(), GroupRandomizationError> {
        let identifier = self
            .identifiers
            .identifier(&IdentifierRequest {
                identifier_type: PATIENT_GROUP_IDENTIFIER_TYPE.to_string(),
                group_identifier_as_pk: group.group_identifier_as_pk,
                requesting_model: PATIENT_GROUP_MODEL.to_string(),
                site: group.site.clone(),
            })
            .await?;
        if is_placeholder_identifier(&identifier) {
            return Err(IdentifierError::PlaceholderCollision(identifier).into());
        }

        let report_datetime = Utc::now();
        self.randomizers
            .randomize(
                &self.randomizer_name,
                &RandomizationRequest {
                    identifier: identifier.clone(),
                    report_datetime,
                    site: group.site.clone(),
                    user: group.user_created.clone(),
                },
            )
            .await?;

        let pk = group.group_identifier_as_pk;
        self.groups
            .save_randomization(
                pk,
                GroupRandomizationUpdate {
                    group_identifier: identifier,
                    randomized: true,
                    modified: report_datetime,
                },
            )
            .await
            .map_err(|e| {
                tracing::error!("allocated but failed to save group: {}", e);
                e
            })?;
        *group = self.groups.reload(pk).await?;
        Ok(())
    }
}
