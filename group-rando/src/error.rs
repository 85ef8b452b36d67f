use thiserror::Error;
use uuid::Uuid;

/// Why a group may not be randomized, or why an attempt to randomize it failed.
#[derive(Error, Debug)]
pub enum GroupRandomizationError {
    #[error("Group is already randomized. Got {group}.")]
    AlreadyRandomized { group: String },
    #[error("Invalid. Expected YES. See `randomize_now`. Got {randomize_now}, confirmation {confirmation:?}.")]
    InvalidIntent {
        randomize_now: String,
        confirmation: Option<String>,
    },
    #[error("Group is not complete. Got {group} with status {status}.")]
    NotComplete { group: String, status: String },
    #[error("Patient group must have at least {min} members. Got {count}.")]
    InsufficientMembers { min: usize, count: usize },
    #[error("Patient has not screened. Got {patient}.")]
    PatientNotScreened { patient: String },
    #[error("Patient is not eligible. Got {patient}.")]
    PatientNotEligible { patient: String },
    #[error("Patient has not consented. Got {patient}.")]
    PatientNotConsented { patient: String },
    #[error("eligibility lookup failed: {0}")]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
    #[error(transparent)]
    Randomization(#[from] RandomizationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GroupRandomizationError {
    /// Covers both the gate's own check and a concurrent allocation caught by the randomizer.
    pub fn is_already_randomized(&self) -> bool {
        matches!(
            self,
            GroupRandomizationError::AlreadyRandomized { .. }
                | GroupRandomizationError::Randomization(RandomizationError::AlreadyRandomized { .. })
        )
    }
}

/// Errors raised by a randomizer or the allocation table behind it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RandomizationError {
    #[error("Patient Group already randomized. See RegisteredGroup. Got {group_identifier} SID={sid}")]
    AlreadyRandomized { group_identifier: String, sid: u32 },
    #[error("Randomization list exhausted for site {site}")]
    AllocationExhausted { site: String },
    #[error("Patient Group does not exist. Got {0}")]
    GroupNotRegistered(String),
    #[error("no randomizer registered as {0}")]
    UnknownRandomizer(String),
    #[error("randomizer {0} is already registered")]
    AlreadyRegistered(String),
    #[error("allocation storage failed: {0}")]
    Storage(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("unsupported identifier type {0}")]
    UnsupportedType(String),
    #[error("site id {0} does not fit the two-digit identifier field")]
    SiteOutOfRange(i32),
    #[error("identifier sequence {sequence} for site {site_id} does not fit the five-digit field")]
    SequenceOutOfRange { site_id: i32, sequence: u32 },
    #[error("generated identifier {0} is indistinguishable from a placeholder")]
    PlaceholderCollision(String),
    #[error("identifier {identifier} is already registered to group {existing}")]
    Duplicate { identifier: String, existing: Uuid },
    #[error("identifier registry failed: {0}")]
    Registry(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("group {0} not found")]
    NotFound(Uuid),
    #[error("group {0} already exists")]
    AlreadyExists(Uuid),
    #[error("group store unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the screening and consent source-of-truth lookups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("record not found")]
    NotFound,
    #[error("lookup unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum ListLoadError {
    #[error("could not read randomization list: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: invalid assignment {value}")]
    InvalidAssignment { row: usize, value: String },
    #[error("row {row}: duplicate sid {sid}")]
    DuplicateSid { row: usize, sid: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_randomized_covers_allocator_flavour() {
        let gate = GroupRandomizationError::AlreadyRandomized {
            group: "g".to_string(),
        };
        let allocator: GroupRandomizationError = RandomizationError::AlreadyRandomized {
            group_identifier: "99951000013".to_string(),
            sid: 3,
        }
        .into();
        let other: GroupRandomizationError = RandomizationError::AllocationExhausted {
            site: "kasangati".to_string(),
        }
        .into();

        assert!(gate.is_already_randomized());
        assert!(allocator.is_already_randomized());
        assert!(!other.is_already_randomized());
    }

    #[test]
    fn test_allocator_message_passes_through_unchanged() {
        let inner = RandomizationError::AlreadyRandomized {
            group_identifier: "99951000013".to_string(),
            sid: 3,
        };
        let outer: GroupRandomizationError = inner.clone().into();
        assert_eq!(outer.to_string(), inner.to_string());
    }

    #[test]
    fn test_insufficient_members_names_minimum() {
        let err = GroupRandomizationError::InsufficientMembers { min: 14, count: 11 };
        assert_eq!(
            err.to_string(),
            "Patient group must have at least 14 members. Got 11."
        );
    }
}
