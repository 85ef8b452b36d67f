use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The literal an operator must type to confirm randomization.
pub const RANDOMIZE_CONFIRMATION: &str = "RANDOMIZE";

pub const PATIENT_GROUP_IDENTIFIER_TYPE: &str = "patient_group";
pub const PATIENT_GROUP_MODEL: &str = "group_rando.patientgroup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum YesNo {
    Yes,
    No,
    NotApplicable,
}

impl fmt::Display for YesNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            YesNo::Yes => "YES",
            YesNo::No => "NO",
            YesNo::NotApplicable => "NOT_APPLICABLE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupStatus {
    New,
    Recruiting,
    Complete,
    // Anything the upstream workflow sends that we don't recognise. Never eligible.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GroupStatus::New => "NEW",
            GroupStatus::Recruiting => "RECRUITING",
            GroupStatus::Complete => "COMPLETE",
            GroupStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Site {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub screening_identifier: Option<String>,
    pub subject_identifier: Option<String>,
}

impl fmt::Display for Patient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Group {
    pub group_identifier_as_pk: Uuid,
    // Holds the pk as a placeholder until randomized.
    pub group_identifier: String,
    pub name: String,
    pub status: GroupStatus,
    pub randomize_now: YesNo,
    #[serde(default)]
    pub confirm_randomize_now: Option<String>,
    #[serde(default)]
    pub randomized: bool,
    #[serde(default)]
    pub patients: Vec<Patient>,
    pub site: Site,
    pub user_created: String,
    pub user_modified: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub randomization_datetime: Option<DateTime<Utc>>,
}

impl Group {
    /// True while the group still carries its pre-randomization identifier.
    pub fn has_placeholder_identifier(&self) -> bool {
        is_placeholder_identifier(&self.group_identifier)
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.group_identifier)
    }
}

/// Placeholders are UUIDs; allocated identifiers never are.
pub fn is_placeholder_identifier(identifier: &str) -> bool {
    Uuid::parse_str(identifier).is_ok()
}

/// Fields written back onto a group once the randomizer has allocated a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRandomizationUpdate {
    pub group_identifier: String,
    pub randomized: bool,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Arm {
    Intervention,
    Control,
}

impl Arm {
    pub fn assignment_code(&self) -> u8 {
        match self {
            Arm::Intervention => 1,
            Arm::Control => 2,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Arm::Intervention => "intervention",
            Arm::Control => "control",
        }
    }
}

impl fmt::Display for Arm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl FromStr for Arm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "intervention" | "1" => Ok(Arm::Intervention),
            "control" | "2" => Ok(Arm::Control),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegisteredGroup {
    pub group_identifier: String,
    pub group_identifier_as_pk: Uuid,
    pub site_id: i32,
    pub registration_datetime: DateTime<Utc>,
    pub randomization_datetime: Option<DateTime<Utc>>,
    // Set once a slot from the randomization list is consumed
    pub sid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RandomizationListEntry {
    pub sid: u32,
    pub assignment: Arm,
    pub site_name: String,
    pub allocated: bool,
    pub allocated_datetime: Option<DateTime<Utc>>,
    pub allocated_user: Option<String>,
    pub allocated_site_id: Option<i32>,
    pub group_identifier: Option<String>,
}

impl RandomizationListEntry {
    pub fn new(sid: u32, assignment: Arm, site_name: &str) -> Self {
        Self {
            sid,
            assignment,
            site_name: site_name.to_string(),
            allocated: false,
            allocated_datetime: None,
            allocated_user: None,
            allocated_site_id: None,
            group_identifier: None,
        }
    }
}

/// What a randomizer hands back for a successful allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub sid: u32,
    pub assignment: Arm,
    pub group_identifier: String,
    pub site_id: i32,
    pub allocated_datetime: DateTime<Utc>,
    pub allocated_user: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomizationRequest {
    pub identifier: String,
    pub report_datetime: DateTime<Utc>,
    pub site: Site,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RandomizationReport {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub user_modified: String,
    pub group_identifier: String,
}
