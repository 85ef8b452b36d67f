use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::{
    error::RandomizationError,
    types::{Allocation, RandomizationRequest},
};

pub const DEFAULT_RANDOMIZER_NAME: &str = "default";

#[async_trait]
pub trait Randomizer {
    fn name(&self) -> &str;

    /// Consumes one slot. Must fail with `AlreadyRandomized` if the identifier already holds one.
    async fn randomize(
        &self,
        request: &RandomizationRequest,
    ) -> Result<Allocation, RandomizationError>;
}

/// The allocation table. `allocate` has to be atomic: it is the only thing serializing
/// concurrent randomizations of the same group.
#[async_trait]
pub trait AllocationStore {
    async fn allocate(
        &self,
        request: &RandomizationRequest,
    ) -> Result<Allocation, RandomizationError>;
}

/// Randomizers by name, built once and handed to whoever needs to randomize.
#[derive(Default, Clone)]
pub struct RandomizerRegistry {
    randomizers: HashMap<String, Arc<dyn Randomizer + Send + Sync>>,
}

impl RandomizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        randomizer: Arc<dyn Randomizer + Send + Sync>,
    ) -> Result<(), RandomizationError> {
        let name = randomizer.name().to_string();
        if self.randomizers.contains_key(&name) {
            return Err(RandomizationError::AlreadyRegistered(name));
        }
        self.randomizers.insert(name, randomizer);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Randomizer + Send + Sync>, RandomizationError> {
        self.randomizers
            .get(name)
            .cloned()
            .ok_or_else(|| RandomizationError::UnknownRandomizer(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.randomizers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub async fn randomize(
        &self,
        name: &str,
        request: &RandomizationRequest,
    ) -> Result<Allocation, RandomizationError> {
        self.get(name)?.randomize(request).await
    }
}

/// Allocates from a site-keyed randomization list. Unblinded, so the arm is reported.
pub struct ListRandomizer {
    name: String,
    store: Arc<dyn AllocationStore + Send + Sync>,
}

impl ListRandomizer {
    pub fn new(name: &str, store: Arc<dyn AllocationStore + Send + Sync>) -> Self {
        ListRandomizer {
            name: name.to_string(),
            store,
        }
    }
}

#[async_trait]
impl Randomizer for ListRandomizer {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(randomizer = %self.name, identifier = %request.identifier, site = %request.site.name))]
    async fn randomize(
        &self,
        request: &RandomizationRequest,
    ) -> Result<Allocation, RandomizationError> {
        if request.identifier.is_empty() {
            return Err(RandomizationError::GroupNotRegistered(
                request.identifier.clone(),
            ));
        }

        match self.store.allocate(request).await {
            Ok(allocation) => {
                tracing::info!(
                    sid = allocation.sid,
                    assignment = %allocation.assignment,
                    "allocated randomization slot"
                );
                Ok(allocation)
            }
            Err(e @ RandomizationError::AlreadyRandomized { .. }) => {
                tracing::warn!("refused allocation: {}", e);
                Err(e)
            }
            Err(e) => {
                tracing::error!("allocation failed: {}", e);
                Err(e)
            }
        }
    }
}
