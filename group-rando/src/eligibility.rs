use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    error::{GroupRandomizationError, LookupError},
    types::{Group, GroupStatus, Patient, YesNo, RANDOMIZE_CONFIRMATION},
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EligibilityRecord {
    pub screening_identifier: String,
    pub eligible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConsentRecord {
    pub subject_identifier: String,
}

/// Source of truth for screening eligibility, re-checked instead of trusting the patient record.
#[async_trait]
pub trait ScreeningLookup {
    async fn eligibility(&self, patient: &Patient) -> Result<EligibilityRecord, LookupError>;
}

/// Source of truth for consent.
#[async_trait]
pub trait ConsentLookup {
    async fn consent(&self, patient: &Patient) -> Result<ConsentRecord, LookupError>;
}

/// Decides whether a group may go on to randomization. Never decides the arm.
#[derive(Clone)]
pub struct EligibilityGate {
    min_group_size: usize,
    screening: Option<Arc<dyn ScreeningLookup + Send + Sync>>,
    consent: Option<Arc<dyn ConsentLookup + Send + Sync>>,
}

impl EligibilityGate {
    pub fn new(min_group_size: usize) -> Self {
        EligibilityGate {
            min_group_size,
            screening: None,
            consent: None,
        }
    }

    pub fn with_screening_lookup(mut self, lookup: Arc<dyn ScreeningLookup + Send + Sync>) -> Self {
        self.screening = Some(lookup);
        self
    }

    pub fn with_consent_lookup(mut self, lookup: Arc<dyn ConsentLookup + Send + Sync>) -> Self {
        self.consent = Some(lookup);
        self
    }

    /// Runs every check in order and stops at the first failure.
    #[instrument(skip_all, fields(group = %group.group_identifier_as_pk))]
    pub async fn assess(&self, group: &Group) -> Result<(), GroupRandomizationError> {
        let result = self.run_checks(group).await;
        if let Err(e) = &result {
            tracing::warn!("group failed eligibility: {}", e);
        }
        result
    }

    async fn run_checks(&self, group: &Group) -> Result<(), GroupRandomizationError> {
        check_not_randomized(group)?;
        check_intent(group)?;
        check_complete(group)?;
        self.check_group_size(group)?;
        self.check_screening(group).await?;
        self.check_consent(group).await?;
        Ok(())
    }

    fn check_group_size(&self, group: &Group) -> Result<(), GroupRandomizationError> {
        let count = group.patients.len();
        if count < self.min_group_size {
            return Err(GroupRandomizationError::InsufficientMembers {
                min: self.min_group_size,
                count,
            });
        }
        Ok(())
    }

    async fn check_screening(&self, group: &Group) -> Result<(), GroupRandomizationError> {
        for patient in &group.patients {
            if patient.screening_identifier.is_none() {
                return Err(GroupRandomizationError::PatientNotScreened {
                    patient: patient.to_string(),
                });
            }
            let Some(lookup) = &self.screening else {
                continue;
            };
            match lookup.eligibility(patient).await {
                Ok(record) if record.eligible => {}
                Ok(_) => {
                    return Err(GroupRandomizationError::PatientNotEligible {
                        patient: patient.to_string(),
                    })
                }
                Err(LookupError::NotFound) => {
                    return Err(GroupRandomizationError::PatientNotScreened {
                        patient: patient.to_string(),
                    })
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn check_consent(&self, group: &Group) -> Result<(), GroupRandomizationError> {
        for patient in &group.patients {
            if patient.subject_identifier.is_none() {
                return Err(GroupRandomizationError::PatientNotConsented {
                    patient: patient.to_string(),
                });
            }
            let Some(lookup) = &self.consent else {
                continue;
            };
            match lookup.consent(patient).await {
                Ok(_) => {}
                Err(LookupError::NotFound) => {
                    return Err(GroupRandomizationError::PatientNotConsented {
                        patient: patient.to_string(),
                    })
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn check_not_randomized(group: &Group) -> Result<(), GroupRandomizationError> {
    if group.randomized {
        return Err(GroupRandomizationError::AlreadyRandomized {
            group: group.to_string(),
        });
    }
    Ok(())
}

// Both flags are required; the literal confirmation guards against a stray click.
fn check_intent(group: &Group) -> Result<(), GroupRandomizationError> {
    let confirmed = group.confirm_randomize_now.as_deref() == Some(RANDOMIZE_CONFIRMATION);
    if group.randomize_now != YesNo::Yes || !confirmed {
        return Err(GroupRandomizationError::InvalidIntent {
            randomize_now: group.randomize_now.to_string(),
            confirmation: group.confirm_randomize_now.clone(),
        });
    }
    Ok(())
}

fn check_complete(group: &Group) -> Result<(), GroupRandomizationError> {
    if group.status != GroupStatus::Complete {
        return Err(GroupRandomizationError::NotComplete {
            group: group.to_string(),
            status: group.status.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::test_utils::{
        eligible_group, StaticConsentLookup, StaticScreeningLookup, DEFAULT_MIN_GROUP_SIZE,
    };

    fn gate() -> EligibilityGate {
        EligibilityGate::new(DEFAULT_MIN_GROUP_SIZE)
    }

    #[tokio::test]
    async fn test_eligible_group_passes() {
        let group = eligible_group(DEFAULT_MIN_GROUP_SIZE);
        gate().assess(&group).await.unwrap();
    }

    #[tokio::test]
    async fn test_already_randomized_wins_over_everything_else() {
        let mut group = eligible_group(3);
        group.randomized = true;
        group.randomize_now = YesNo::No;
        group.status = GroupStatus::New;

        match gate().assess(&group).await {
            Err(GroupRandomizationError::AlreadyRandomized { .. }) => (),
            other => panic!("Expected AlreadyRandomized, got {:?}", other),
        };
    }

    #[rstest]
    #[case(YesNo::No, Some("RANDOMIZE"))]
    #[case(YesNo::NotApplicable, Some("RANDOMIZE"))]
    #[case(YesNo::Yes, None)]
    #[case(YesNo::Yes, Some("randomize"))]
    #[case(YesNo::Yes, Some("RANDOMIZE "))]
    #[case(YesNo::Yes, Some(""))]
    #[tokio::test]
    async fn test_intent_requires_exact_confirmation(
        #[case] randomize_now: YesNo,
        #[case] confirmation: Option<&str>,
    ) {
        let mut group = eligible_group(DEFAULT_MIN_GROUP_SIZE);
        group.randomize_now = randomize_now;
        group.confirm_randomize_now = confirmation.map(str::to_string);
        // other failures must not mask the intent check
        group.status = GroupStatus::Recruiting;
        group.patients.clear();

        let err = gate().assess(&group).await.unwrap_err();
        assert!(
            matches!(err, GroupRandomizationError::InvalidIntent { .. }),
            "got {:?}",
            err
        );
        assert!(err.to_string().contains("Expected YES"));
    }

    #[rstest]
    #[case(GroupStatus::New)]
    #[case(GroupStatus::Recruiting)]
    #[case(GroupStatus::Unknown)]
    #[tokio::test]
    async fn test_incomplete_group_is_refused(#[case] status: GroupStatus) {
        let mut group = eligible_group(DEFAULT_MIN_GROUP_SIZE);
        group.status = status;

        match gate().assess(&group).await {
            Err(GroupRandomizationError::NotComplete { .. }) => (),
            other => panic!("Expected NotComplete, got {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_group_size_boundary() {
        let group = eligible_group(DEFAULT_MIN_GROUP_SIZE - 1);
        let err = gate().assess(&group).await.unwrap_err();
        assert!(err
            .to_string()
            .contains("Patient group must have at least 14 members"));

        let group = eligible_group(DEFAULT_MIN_GROUP_SIZE);
        assert!(gate().assess(&group).await.is_ok());
    }

    #[tokio::test]
    async fn test_group_size_is_configurable() {
        let group = eligible_group(5);
        assert!(EligibilityGate::new(5).assess(&group).await.is_ok());
        assert!(EligibilityGate::new(6).assess(&group).await.is_err());
    }

    #[tokio::test]
    async fn test_unscreened_patient_is_named() {
        let mut group = eligible_group(DEFAULT_MIN_GROUP_SIZE);
        group.patients[4].screening_identifier = None;
        // an unconsented patient later in the list must not be reported first
        group.patients[9].subject_identifier = None;
        let expected = group.patients[4].to_string();

        match gate().assess(&group).await {
            Err(GroupRandomizationError::PatientNotScreened { patient }) => {
                assert_eq!(patient, expected)
            }
            other => panic!("Expected PatientNotScreened, got {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_unconsented_patient_is_named() {
        let mut group = eligible_group(DEFAULT_MIN_GROUP_SIZE);
        group.patients[0].subject_identifier = None;
        let expected = group.patients[0].to_string();

        let err = gate().assess(&group).await.unwrap_err();
        assert!(err.to_string().contains("Patient has not consented"));
        match err {
            GroupRandomizationError::PatientNotConsented { patient } => {
                assert_eq!(patient, expected)
            }
            other => panic!("Expected PatientNotConsented, got {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_screening_lookup_cross_checks_eligibility() {
        let group = eligible_group(DEFAULT_MIN_GROUP_SIZE);
        let ineligible = group.patients[2].clone();
        let lookup = StaticScreeningLookup::for_group(&group).ineligible(&ineligible);
        let gate = gate().with_screening_lookup(Arc::new(lookup));

        match gate.assess(&group).await {
            Err(GroupRandomizationError::PatientNotEligible { patient }) => {
                assert_eq!(patient, ineligible.to_string())
            }
            other => panic!("Expected PatientNotEligible, got {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_missing_screening_record_counts_as_not_screened() {
        let group = eligible_group(DEFAULT_MIN_GROUP_SIZE);
        let lookup = StaticScreeningLookup::for_group(&group).without(&group.patients[7]);
        let gate = gate().with_screening_lookup(Arc::new(lookup));

        match gate.assess(&group).await {
            Err(GroupRandomizationError::PatientNotScreened { .. }) => (),
            other => panic!("Expected PatientNotScreened, got {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_missing_consent_record_counts_as_not_consented() {
        let group = eligible_group(DEFAULT_MIN_GROUP_SIZE);
        let lookup = StaticConsentLookup::for_group(&group).without(&group.patients[13]);
        let gate = gate().with_consent_lookup(Arc::new(lookup));

        match gate.assess(&group).await {
            Err(GroupRandomizationError::PatientNotConsented { .. }) => (),
            other => panic!("Expected PatientNotConsented, got {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_lookup_outage_is_not_reported_as_patient_failure() {
        let group = eligible_group(DEFAULT_MIN_GROUP_SIZE);
        let lookup = StaticScreeningLookup::unavailable("connection refused");
        let gate = gate().with_screening_lookup(Arc::new(lookup));

        match gate.assess(&group).await {
            Err(GroupRandomizationError::Lookup(LookupError::Unavailable(_))) => (),
            other => panic!("Expected Lookup error, got {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_lookups_passing_keeps_group_eligible() {
        let group = eligible_group(DEFAULT_MIN_GROUP_SIZE);
        let gate = gate()
            .with_screening_lookup(Arc::new(StaticScreeningLookup::for_group(&group)))
            .with_consent_lookup(Arc::new(StaticConsentLookup::for_group(&group)));

        gate.assess(&group).await.unwrap();
    }
}
