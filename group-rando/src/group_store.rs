use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::StoreError,
    types::{Group, GroupRandomizationUpdate},
};

/// Persisted groups. Only the randomization fields are ever written from here.
#[async_trait]
pub trait GroupStore {
    async fn insert(&self, group: Group) -> Result<(), StoreError>;

    async fn save_randomization(
        &self,
        pk: Uuid,
        update: GroupRandomizationUpdate,
    ) -> Result<(), StoreError>;

    async fn reload(&self, pk: Uuid) -> Result<Group, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryGroupStore {
    groups: RwLock<HashMap<Uuid, Group>>,
}

impl InMemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GroupStore for InMemoryGroupStore {
    async fn insert(&self, group: Group) -> Result<(), StoreError> {
        let mut groups = self.groups.write().await;
        if groups.contains_key(&group.group_identifier_as_pk) {
            return Err(StoreError::AlreadyExists(group.group_identifier_as_pk));
        }
        groups.insert(group.group_identifier_as_pk, group);
        Ok(())
    }

    async fn save_randomization(
        &self,
        pk: Uuid,
        update: GroupRandomizationUpdate,
    ) -> Result<(), StoreError> {
        let mut groups = self.groups.write().await;
        let group = groups.get_mut(&pk).ok_or(StoreError::NotFound(pk))?;
        group.group_identifier = update.group_identifier;
        group.randomized = update.randomized;
        group.modified = update.modified;
        Ok(())
    }

    async fn reload(&self, pk: Uuid) -> Result<Group, StoreError> {
        self.groups
            .read()
            .await
            .get(&pk)
            .cloned()
            .ok_or(StoreError::NotFound(pk))
    }
}
