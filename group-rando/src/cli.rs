use std::io::{Read, Write};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::{
    config::Config,
    group_identifier::GroupIdentifier,
    group_store::{GroupStore, InMemoryGroupStore},
    memory::InMemoryRandomizationStore,
    randomization_list::RandomizationList,
    randomizer::{ListRandomizer, RandomizerRegistry},
    types::{Group, RandomizationReport},
    RandomizeGroup,
};

/// Randomizes the group read from `group` against the list read from `list`,
/// then writes the report and the allocated slot to `out` as pretty JSON.
///
/// Nothing is written when the attempt fails.
pub async fn run<L: Read, G: Read, W: Write>(
    config: &Config,
    list: L,
    group: G,
    mut out: W,
) -> Result<RandomizationReport> {
    let list = RandomizationList::from_csv(list)?;
    tracing::info!(slots = list.len(), "loaded randomization list");

    let mut group: Group = serde_json::from_reader(group).context("parsing group")?;

    let allocations = Arc::new(InMemoryRandomizationStore::with_list(list));
    let mut registry = RandomizerRegistry::new();
    registry.register(Arc::new(ListRandomizer::new(
        &config.randomizer_name,
        allocations.clone(),
    )))?;

    let groups = Arc::new(InMemoryGroupStore::new());
    groups.insert(group.clone()).await?;

    let orchestrator = RandomizeGroup::from_config(
        config,
        Arc::new(registry),
        Arc::new(GroupIdentifier::new(&config.protocol_number, allocations.clone())),
        groups,
    );

    let report = orchestrator.randomize_group(&mut group).await?;
    let allocation = allocations.allocated_to(&report.group_identifier).await;

    let output = serde_json::json!({
        "report": report,
        "allocation": allocation,
    });
    serde_json::to_writer_pretty(&mut out, &output)?;
    writeln!(out)?;
    Ok(report)
}
