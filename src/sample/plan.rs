//! Per-entity sample size planning.

use super::config::SizeConfig;
use super::policy::SamplingPolicy;
use crate::cache::CachedPlan;
use crate::schema::{EntityId, Schema};
use crate::store::Catalog;
use anyhow::{Context, Result};
use tracing::{info, warn};

/// Ordered (entity, limit) pairs, one per working-set entity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SamplingPlan {
    entries: Vec<(EntityId, usize)>,
}

impl SamplingPlan {
    pub fn new(entries: Vec<(EntityId, usize)>) -> Self {
        Self { entries }
    }

    /// Entries in plan order
    pub fn entries(&self) -> &[(EntityId, usize)] {
        &self.entries
    }

    /// Planned limit for an entity, if it is part of the plan
    pub fn limit(&self, entity: EntityId) -> Option<usize> {
        self.entries
            .iter()
            .find(|(id, _)| *id == entity)
            .map(|&(_, limit)| limit)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Convert to the name-keyed form stored by the plan cache
    pub fn to_cached(&self, schema: &Schema) -> CachedPlan {
        CachedPlan::new(
            self.entries
                .iter()
                .map(|&(id, limit)| (schema.name(id).to_string(), limit))
                .collect(),
        )
    }

    /// Resolve a cached plan against the current schema. Entities that no
    /// longer exist are dropped.
    pub fn from_cached(schema: &Schema, cached: &CachedPlan) -> Self {
        let entries = cached
            .entries
            .iter()
            .filter_map(|entry| match schema.entity_id(&entry.entity) {
                Some(id) => Some((id, entry.limit)),
                None => {
                    warn!("cached plan names unknown entity {}", entry.entity);
                    None
                }
            })
            .collect();
        Self { entries }
    }
}

/// Limit for one entity given its size proxy
pub fn limit_for(sizes: &SizeConfig, size_hint: u64, full_required: bool) -> usize {
    if full_required {
        sizes.full_limit
    } else if size_hint > sizes.large_threshold {
        sizes.large_limit
    } else {
        sizes.default_limit
    }
}

/// Compute the plan for a working set. Queries every entity's size, so this
/// is the expensive step worth caching.
pub fn plan_sizes<C: Catalog + ?Sized>(
    catalog: &C,
    policy: &dyn SamplingPolicy,
    working_set: &[EntityId],
) -> Result<SamplingPlan> {
    let schema = catalog.schema();
    let mut entries = Vec::with_capacity(working_set.len());

    for &id in working_set {
        let entity = schema
            .entity(id)
            .with_context(|| format!("Unknown entity {}", id))?;
        info!("getting settings for {}", entity.name);
        let size = catalog
            .size_hint(entity)
            .with_context(|| format!("Failed to size {}", entity.name))?;
        let limit = limit_for(policy.sizes(), size, policy.is_full_required(&entity.name));
        entries.push((id, limit));
    }

    Ok(SamplingPlan::new(entries))
}
