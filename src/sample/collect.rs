//! Seed and bulk collection.

use super::expand::{Collected, Expander};
use crate::schema::{EntityId, Row};
use ahash::AHashSet;
use anyhow::{Context, Result};
use tracing::info;

/// Gather the policy's seed rows and expand them in both directions.
///
/// Every entity reachable from the seed entity through reverse references
/// gets a bucket up front, even if it ends up empty; the bulk phase treats
/// those entities as handled.
pub fn collect_seed(expander: &Expander<'_>, collected: &mut Collected) -> Result<()> {
    let schema = expander.schema();

    let Some(seed) = expander.policy().seed() else {
        info!("no seed configured");
        return Ok(());
    };
    let Some(entity) = schema.get_entity(&seed.entity) else {
        info!("seed entity {} is not in the catalog, skipping", seed.entity);
        return Ok(());
    };

    info!("loading seed rows from {}", entity.name);
    let limit = expander.limit(entity.id);
    let rows = match (&seed.field, &seed.value) {
        (Some(field), Some(value)) => expander.source().matching(entity, field, value, limit),
        _ => expander.source().latest(entity, limit),
    }
    .with_context(|| format!("Failed to read seed rows from {}", entity.name))?;

    collected.init_bucket(entity.id);
    for id in expander.graph().reverse_closure(entity.id) {
        collected.init_bucket(id);
    }

    let added = collected.add(entity.id, rows);
    expander.reverse(entity.id, &added, collected)
}

/// Sample every planned entity that had no bucket when this phase started.
///
/// `entity_limit` truncates the plan to its first N entries. `progress` is
/// called once per plan entry with the entity name.
pub fn collect_bulk(
    expander: &Expander<'_>,
    collected: &mut Collected,
    entity_limit: Option<usize>,
    progress: &dyn Fn(&str),
) -> Result<()> {
    let schema = expander.schema();
    let entries = expander.plan().entries();
    let entries = &entries[..entity_limit.unwrap_or(entries.len()).min(entries.len())];

    // Decided up front: buckets created by this phase do not cause skips
    let handled: AHashSet<EntityId> = entries
        .iter()
        .map(|&(id, _)| id)
        .filter(|&id| collected.has_bucket(id))
        .collect();

    for &(id, limit) in entries {
        let entity = schema
            .entity(id)
            .with_context(|| format!("Unknown entity {}", id))?;
        progress(&entity.name);

        if handled.contains(&id) {
            info!("skipping already collected data for {}", entity.name);
            continue;
        }

        info!("getting {} items for {}", limit, entity.name);
        let batch = expander
            .source()
            .latest(entity, limit)
            .with_context(|| format!("Failed to sample {}", entity.name))?;
        let added = collected.add(id, batch);
        expander.forward(id, &added, collected)?;
    }

    Ok(())
}

/// Add rows that bypass the plan and close them forward.
///
/// Rows whose identity is already collected are dropped. Returns how many
/// of `rows` were added.
pub fn collect_extra(
    expander: &Expander<'_>,
    collected: &mut Collected,
    rows: Vec<Row>,
) -> Result<usize> {
    let mut batches: Vec<(EntityId, Vec<Row>)> = Vec::new();
    for row in rows {
        match batches.iter_mut().find(|(id, _)| *id == row.entity) {
            Some((_, batch)) => batch.push(row),
            None => batches.push((row.entity, vec![row])),
        }
    }

    let mut count = 0;
    for (id, batch) in batches {
        let added = collected.add(id, batch);
        count += added.len();
        expander.forward(id, &added, collected)?;
    }

    Ok(count)
}
