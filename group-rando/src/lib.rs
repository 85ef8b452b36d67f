pub mod cli;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod group_identifier;
pub mod group_store;
pub mod memory;
pub mod randomization_list;
pub mod randomize_group;
pub mod randomizer;
pub mod types;

// Test utilities
pub mod test_utils;

pub use error::GroupRandomizationError;
pub use error::RandomizationError;
pub use randomize_group::RandomizeGroup;
