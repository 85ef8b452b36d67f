use std::sync::Arc;

use once_cell::sync::Lazy;

use group_rando::config::Config;
use group_rando::group_identifier::GroupIdentifier;
use group_rando::group_store::{GroupStore, InMemoryGroupStore};
use group_rando::memory::InMemoryRandomizationStore;
use group_rando::randomization_list::RandomizationList;
use group_rando::randomizer::{ListRandomizer, RandomizerRegistry};
use group_rando::types::Group;
use group_rando::RandomizeGroup;

pub use group_rando::test_utils::*;

pub static DEFAULT_CONFIG: Lazy<Config> = Lazy::new(Config::default_test_config);

/// A fully wired orchestrator over in-memory stores.
pub struct TrialHandle {
    pub orchestrator: RandomizeGroup,
    pub allocations: Arc<InMemoryRandomizationStore>,
    pub groups: Arc<InMemoryGroupStore>,
}

impl TrialHandle {
    pub fn for_config(config: &Config, list: RandomizationList) -> TrialHandle {
        let allocations = Arc::new(InMemoryRandomizationStore::with_list(list));
        let mut registry = RandomizerRegistry::new();
        registry
            .register(Arc::new(ListRandomizer::new(
                &config.randomizer_name,
                allocations.clone(),
            )))
            .expect("failed to register randomizer");
        let groups = Arc::new(InMemoryGroupStore::new());

        let orchestrator = RandomizeGroup::from_config(
            config,
            Arc::new(registry),
            Arc::new(GroupIdentifier::new(
                &config.protocol_number,
                allocations.clone(),
            )),
            groups.clone(),
        );

        TrialHandle {
            orchestrator,
            allocations,
            groups,
        }
    }

    pub async fn add_group(&self, group: &Group) {
        self.groups
            .insert(group.clone())
            .await
            .expect("failed to insert group");
    }
}
