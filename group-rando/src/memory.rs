use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::{IdentifierError, RandomizationError},
    group_identifier::GroupRegistry,
    randomization_list::RandomizationList,
    randomizer::AllocationStore,
    types::{Allocation, RandomizationListEntry, RandomizationRequest, RegisteredGroup},
};

#[derive(Debug, Default)]
struct RandomizationState {
    list: RandomizationList,
    registrations: HashMap<Uuid, RegisteredGroup>,
    sequences: HashMap<i32, u32>,
}

impl RandomizationState {
    fn allocate(
        &mut self,
        request: &RandomizationRequest,
    ) -> Result<Allocation, RandomizationError> {
        let registration = self
            .registrations
            .values_mut()
            .find(|r| r.group_identifier == request.identifier)
            .ok_or_else(|| RandomizationError::GroupNotRegistered(request.identifier.clone()))?;

        if let Some(sid) = registration.sid {
            return Err(RandomizationError::AlreadyRandomized {
                group_identifier: registration.group_identifier.clone(),
                sid,
            });
        }

        let entry = self
            .list
            .next_available_mut(&request.site.name)
            .ok_or_else(|| RandomizationError::AllocationExhausted {
                site: request.site.name.clone(),
            })?;

        entry.allocated = true;
        entry.allocated_datetime = Some(request.report_datetime);
        entry.allocated_user = Some(request.user.clone());
        entry.allocated_site_id = Some(request.site.id);
        entry.group_identifier = Some(request.identifier.clone());

        registration.sid = Some(entry.sid);
        registration.randomization_datetime = Some(request.report_datetime);

        Ok(Allocation {
            sid: entry.sid,
            assignment: entry.assignment,
            group_identifier: request.identifier.clone(),
            site_id: request.site.id,
            allocated_datetime: request.report_datetime,
            allocated_user: request.user.clone(),
        })
    }
}

/// Registered groups, identifier sequences and the randomization list behind one lock.
#[derive(Debug, Default)]
pub struct InMemoryRandomizationStore {
    state: Mutex<RandomizationState>,
}

impl InMemoryRandomizationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_list(list: RandomizationList) -> Self {
        InMemoryRandomizationStore {
            state: Mutex::new(RandomizationState {
                list,
                ..Default::default()
            }),
        }
    }

    pub async fn list_entries(&self) -> Vec<RandomizationListEntry> {
        self.state.lock().await.list.entries().to_vec()
    }

    pub async fn available(&self, site_name: &str) -> usize {
        self.state.lock().await.list.available(site_name)
    }

    pub async fn allocated_to(&self, group_identifier: &str) -> Option<RandomizationListEntry> {
        self.state
            .lock()
            .await
            .list
            .allocated_to(group_identifier)
            .cloned()
    }

    pub async fn registered_by_identifier(&self, group_identifier: &str) -> Option<RegisteredGroup> {
        self.state
            .lock()
            .await
            .registrations
            .values()
            .find(|r| r.group_identifier == group_identifier)
            .cloned()
    }
}

#[async_trait]
impl GroupRegistry for InMemoryRandomizationStore {
    async fn registration(&self, pk: Uuid) -> Result<Option<RegisteredGroup>, IdentifierError> {
        Ok(self.state.lock().await.registrations.get(&pk).cloned())
    }

    async fn next_sequence(&self, site_id: i32) -> Result<u32, IdentifierError> {
        let mut state = self.state.lock().await;
        let sequence = state.sequences.entry(site_id).or_insert(0);
        *sequence += 1;
        Ok(*sequence)
    }

    async fn register_if_absent(
        &self,
        candidate: RegisteredGroup,
    ) -> Result<RegisteredGroup, IdentifierError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.registrations.get(&candidate.group_identifier_as_pk) {
            return Ok(existing.clone());
        }
        if let Some(clash) = state
            .registrations
            .values()
            .find(|r| r.group_identifier == candidate.group_identifier)
        {
            return Err(IdentifierError::Duplicate {
                identifier: candidate.group_identifier.clone(),
                existing: clash.group_identifier_as_pk,
            });
        }
        state
            .registrations
            .insert(candidate.group_identifier_as_pk, candidate.clone());
        Ok(candidate)
    }
}

#[async_trait]
impl AllocationStore for InMemoryRandomizationStore {
    async fn allocate(
        &self,
        request: &RandomizationRequest,
    ) -> Result<Allocation, RandomizationError> {
        self.state.lock().await.allocate(request)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        test_utils::{create_site, registered_group},
        types::Arm,
    };

    fn request(identifier: &str, site_name: &str) -> RandomizationRequest {
        RandomizationRequest {
            identifier: identifier.to_string(),
            report_datetime: Utc::now(),
            site: create_site(51, site_name),
            user: "erikvw".to_string(),
        }
    }

    fn store() -> InMemoryRandomizationStore {
        InMemoryRandomizationStore::with_list(RandomizationList::new(vec![
            RandomizationListEntry::new(7, Arm::Control, "kasangati"),
            RandomizationListEntry::new(4, Arm::Intervention, "kasangati"),
            RandomizationListEntry::new(1, Arm::Control, "amana"),
        ]))
    }

    #[tokio::test]
    async fn test_allocates_lowest_free_slot_for_site() {
        let store = store();
        store
            .register_if_absent(registered_group("99951000013", 51))
            .await
            .unwrap();

        let allocation = store
            .allocate(&request("99951000013", "kasangati"))
            .await
            .unwrap();
        assert_eq!(allocation.sid, 4);
        assert_eq!(allocation.assignment, Arm::Intervention);

        let entry = store.allocated_to("99951000013").await.unwrap();
        assert!(entry.allocated);
        assert_eq!(entry.allocated_user.as_deref(), Some("erikvw"));

        let registered = store.registered_by_identifier("99951000013").await.unwrap();
        assert_eq!(registered.sid, Some(4));
        assert!(registered.randomization_datetime.is_some());
        assert_eq!(store.available("kasangati").await, 1);
    }

    #[tokio::test]
    async fn test_second_allocation_is_already_randomized() {
        let store = store();
        store
            .register_if_absent(registered_group("99951000013", 51))
            .await
            .unwrap();
        store
            .allocate(&request("99951000013", "kasangati"))
            .await
            .unwrap();

        assert_eq!(
            store.allocate(&request("99951000013", "kasangati")).await,
            Err(RandomizationError::AlreadyRandomized {
                group_identifier: "99951000013".to_string(),
                sid: 4,
            })
        );
        assert_eq!(store.available("kasangati").await, 1);
    }

    #[tokio::test]
    async fn test_unregistered_group() {
        let store = store();

        assert_eq!(
            store.allocate(&request("99951000013", "kasangati")).await,
            Err(RandomizationError::GroupNotRegistered(
                "99951000013".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_exhausted_site() {
        let store = store();
        store
            .register_if_absent(registered_group("99951000013", 51))
            .await
            .unwrap();
        store
            .register_if_absent(registered_group("99951000021", 51))
            .await
            .unwrap();
        store
            .allocate(&request("99951000013", "amana"))
            .await
            .unwrap();

        match store.allocate(&request("99951000021", "amana")).await {
            Err(RandomizationError::AllocationExhausted { site }) => assert_eq!(site, "amana"),
            other => panic!("Expected AllocationExhausted, got {:?}", other),
        };
        // the registration stays open for a retry once the list is topped up
        let registered = store.registered_by_identifier("99951000021").await.unwrap();
        assert_eq!(registered.sid, None);
    }

    #[tokio::test]
    async fn test_register_if_absent_keeps_first_registration() {
        let store = store();
        let first = registered_group("99951000013", 51);
        let mut second = registered_group("99951000021", 51);
        second.group_identifier_as_pk = first.group_identifier_as_pk;

        store.register_if_absent(first.clone()).await.unwrap();
        let stored = store.register_if_absent(second).await.unwrap();
        assert_eq!(stored, first);
    }

    #[tokio::test]
    async fn test_register_rejects_identifier_reuse() {
        let store = store();
        store
            .register_if_absent(registered_group("99951000013", 51))
            .await
            .unwrap();

        match store
            .register_if_absent(registered_group("99951000013", 51))
            .await
        {
            Err(IdentifierError::Duplicate { identifier, .. }) => {
                assert_eq!(identifier, "99951000013")
            }
            other => panic!("Expected Duplicate, got {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_sequences() {
        let store = store();
        assert_eq!(store.next_sequence(51).await.unwrap(), 1);
        assert_eq!(store.next_sequence(51).await.unwrap(), 2);
        assert_eq!(store.next_sequence(60).await.unwrap(), 1);
    }
}
