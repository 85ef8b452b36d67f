use std::collections::HashSet;
use std::io::Read;

use serde::Deserialize;

use crate::{
    error::ListLoadError,
    types::{Arm, RandomizationListEntry},
};

#[derive(Debug, Deserialize)]
struct ListRow {
    sid: u32,
    assignment: String,
    site_name: String,
}

/// The pre-shuffled allocation table. Slots are consumed lowest sid first within a site.
#[derive(Debug, Default, Clone)]
pub struct RandomizationList {
    entries: Vec<RandomizationListEntry>,
}

impl RandomizationList {
    pub fn new(entries: Vec<RandomizationListEntry>) -> Self {
        RandomizationList { entries }
    }

    /// Reads `sid,assignment,site_name` rows. Assignment is a description or its code.
    pub fn from_csv<R: Read>(reader: R) -> Result<Self, ListLoadError> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for (index, row) in csv_reader.deserialize::<ListRow>().enumerate() {
            // header is row 1
            let row_number = index + 2;
            let row = row?;
            let assignment: Arm =
                row.assignment
                    .parse()
                    .map_err(|value| ListLoadError::InvalidAssignment {
                        row: row_number,
                        value,
                    })?;
            if !seen.insert(row.sid) {
                return Err(ListLoadError::DuplicateSid {
                    row: row_number,
                    sid: row.sid,
                });
            }
            entries.push(RandomizationListEntry::new(row.sid, assignment, &row.site_name));
        }

        Ok(RandomizationList { entries })
    }

    pub fn entries(&self) -> &[RandomizationListEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn available(&self, site_name: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| !e.allocated && e.site_name == site_name)
            .count()
    }

    pub fn next_available_mut(&mut self, site_name: &str) -> Option<&mut RandomizationListEntry> {
        self.entries
            .iter_mut()
            .filter(|e| !e.allocated && e.site_name == site_name)
            .min_by_key(|e| e.sid)
    }

    pub fn allocated_to(&self, group_identifier: &str) -> Option<&RandomizationListEntry> {
        self.entries
            .iter()
            .find(|e| e.group_identifier.as_deref() == Some(group_identifier))
    }
}
