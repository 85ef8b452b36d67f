use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rand::{distributions::Alphanumeric, seq::SliceRandom, Rng};
use uuid::Uuid;

use crate::{
    eligibility::{ConsentLookup, ConsentRecord, EligibilityRecord, ScreeningLookup},
    error::{IdentifierError, LookupError, RandomizationError},
    group_identifier::{IdentifierGenerator, IdentifierRequest},
    randomization_list::RandomizationList,
    randomizer::Randomizer,
    types::{
        Allocation, Arm, Group, GroupStatus, Patient, RandomizationListEntry,
        RandomizationRequest, RegisteredGroup, Site, YesNo, RANDOMIZE_CONFIRMATION,
    },
};

pub const DEFAULT_MIN_GROUP_SIZE: usize = 14;

pub fn random_string(prefix: &str, length: usize) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();
    format!("{}{}", prefix, suffix)
}

pub fn create_site(id: i32, name: &str) -> Site {
    Site {
        id,
        name: name.to_string(),
    }
}

/// A patient who has been through screening and consent.
pub fn create_patient() -> Patient {
    Patient {
        id: Uuid::new_v4(),
        name: random_string("patient-", 6),
        screening_identifier: Some(random_string("S", 7)),
        subject_identifier: Some(random_string("105-", 7)),
    }
}

/// A complete, confirmed, not yet randomized group with `size` ready patients.
pub fn eligible_group(size: usize) -> Group {
    let pk = Uuid::new_v4();
    let now = Utc::now();
    Group {
        group_identifier_as_pk: pk,
        group_identifier: pk.to_string(),
        name: random_string("group-", 6),
        status: GroupStatus::Complete,
        randomize_now: YesNo::Yes,
        confirm_randomize_now: Some(RANDOMIZE_CONFIRMATION.to_string()),
        randomized: false,
        patients: (0..size).map(|_| create_patient()).collect(),
        site: create_site(51, "kasangati"),
        user_created: "erikvw".to_string(),
        user_modified: "erikvw".to_string(),
        created: now,
        modified: now,
        randomization_datetime: None,
    }
}

pub fn registered_group(group_identifier: &str, site_id: i32) -> RegisteredGroup {
    RegisteredGroup {
        group_identifier: group_identifier.to_string(),
        group_identifier_as_pk: Uuid::new_v4(),
        site_id,
        registration_datetime: Utc::now(),
        randomization_datetime: None,
        sid: None,
    }
}

/// Balanced blocks of two, shuffled, numbered from `first_sid`.
pub fn shuffled_list(site_name: &str, first_sid: u32, blocks: usize) -> RandomizationList {
    let mut rng = rand::thread_rng();
    let mut arms = Vec::with_capacity(blocks * 2);
    for _ in 0..blocks {
        let mut block = [Arm::Intervention, Arm::Control];
        block.shuffle(&mut rng);
        arms.extend(block);
    }
    RandomizationList::new(
        arms.into_iter()
            .zip(first_sid..)
            .map(|(arm, sid)| RandomizationListEntry::new(sid, arm, site_name))
            .collect(),
    )
}

/// Records every call; answers with a canned allocation or a canned error.
pub struct CountingRandomizer {
    name: String,
    calls: AtomicUsize,
    last_request: Mutex<Option<RandomizationRequest>>,
    failure: Option<RandomizationError>,
}

impl CountingRandomizer {
    pub fn new(name: &str) -> Self {
        CountingRandomizer {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
            failure: None,
        }
    }

    pub fn failing(name: &str, failure: RandomizationError) -> Self {
        CountingRandomizer {
            failure: Some(failure),
            ..Self::new(name)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<RandomizationRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl Randomizer for CountingRandomizer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn randomize(
        &self,
        request: &RandomizationRequest,
    ) -> Result<Allocation, RandomizationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_request.lock().unwrap() = Some(request.clone());
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        Ok(Allocation {
            sid: call as u32,
            assignment: Arm::Intervention,
            group_identifier: request.identifier.clone(),
            site_id: request.site.id,
            allocated_datetime: request.report_datetime,
            allocated_user: request.user.clone(),
        })
    }
}

/// Hands out the same identifier whatever the request.
pub struct FixedIdentifier {
    identifier: String,
}

impl FixedIdentifier {
    pub fn new(identifier: &str) -> Self {
        FixedIdentifier {
            identifier: identifier.to_string(),
        }
    }
}

#[async_trait]
impl IdentifierGenerator for FixedIdentifier {
    async fn identifier(&self, _request: &IdentifierRequest) -> Result<String, IdentifierError> {
        Ok(self.identifier.clone())
    }
}

#[derive(Default)]
pub struct StaticScreeningLookup {
    records: HashMap<Uuid, EligibilityRecord>,
    outage: Option<String>,
}

impl StaticScreeningLookup {
    /// Every patient in the group has an eligible screening record.
    pub fn for_group(group: &Group) -> Self {
        let records = group
            .patients
            .iter()
            .map(|p| {
                (
                    p.id,
                    EligibilityRecord {
                        screening_identifier: p.screening_identifier.clone().unwrap_or_default(),
                        eligible: true,
                    },
                )
            })
            .collect();
        StaticScreeningLookup {
            records,
            outage: None,
        }
    }

    pub fn unavailable(reason: &str) -> Self {
        StaticScreeningLookup {
            records: HashMap::new(),
            outage: Some(reason.to_string()),
        }
    }

    pub fn ineligible(mut self, patient: &Patient) -> Self {
        if let Some(record) = self.records.get_mut(&patient.id) {
            record.eligible = false;
        }
        self
    }

    pub fn without(mut self, patient: &Patient) -> Self {
        self.records.remove(&patient.id);
        self
    }
}

#[async_trait]
impl ScreeningLookup for StaticScreeningLookup {
    async fn eligibility(&self, patient: &Patient) -> Result<EligibilityRecord, LookupError> {
        if let Some(reason) = &self.outage {
            return Err(LookupError::Unavailable(reason.clone()));
        }
        self.records
            .get(&patient.id)
            .cloned()
            .ok_or(LookupError::NotFound)
    }
}

#[derive(Default)]
pub struct StaticConsentLookup {
    records: HashMap<Uuid, ConsentRecord>,
}

impl StaticConsentLookup {
    pub fn for_group(group: &Group) -> Self {
        let records = group
            .patients
            .iter()
            .map(|p| {
                (
                    p.id,
                    ConsentRecord {
                        subject_identifier: p.subject_identifier.clone().unwrap_or_default(),
                    },
                )
            })
            .collect();
        StaticConsentLookup { records }
    }

    pub fn without(mut self, patient: &Patient) -> Self {
        self.records.remove(&patient.id);
        self
    }
}

#[async_trait]
impl ConsentLookup for StaticConsentLookup {
    async fn consent(&self, patient: &Patient) -> Result<ConsentRecord, LookupError> {
        self.records
            .get(&patient.id)
            .cloned()
            .ok_or(LookupError::NotFound)
    }
}
