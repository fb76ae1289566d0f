//! Reference-aware sampling.
//!
//! A run selects the working set, plans a row budget per entity, collects
//! the policy's seed rows, samples every remaining entity and finally
//! deduplicates. Every reference made by an output row resolves to another
//! output row, except references into auxiliary entities.
//!
//! ```text
//! working set -> plan (cached) -> seed -> bulk -> extra rows -> dedup
//! ```

mod collect;
mod config;
mod dedup;
mod expand;
mod plan;
mod policy;
mod working_set;

pub use collect::{collect_bulk, collect_extra, collect_seed};
pub use config::{ExtraConfig, LoadConfig, SamplerConfig, SeedConfig, SizeConfig};
pub use dedup::dedup;
pub use expand::{Collected, Expander};
pub use plan::{limit_for, plan_sizes, SamplingPlan};
pub use policy::{ConfigPolicy, SamplingPolicy};
pub use working_set::select_working_set;

use crate::cache::PlanCache;
use crate::schema::{EntityId, Row, SchemaGraph};
use crate::store::Store;
use anyhow::Result;
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

/// Statistics from a sampling run
#[derive(Debug, Default, Serialize)]
pub struct SampleStats {
    /// Entities in the working set
    pub entities: usize,
    /// Rows gathered by the seed phase
    pub seed_rows: usize,
    /// Rows gathered overall, before extra rows
    pub collected_rows: usize,
    /// Rows contributed by the policy's extra rows
    pub extra_rows: usize,
    /// Rows dropped as duplicates
    pub duplicates: usize,
    /// Per-entity row counts in the final output, in first-seen order
    pub entity_stats: Vec<EntitySampleStats>,
}

/// Per-entity output statistics
#[derive(Debug, Clone, Serialize)]
pub struct EntitySampleStats {
    pub name: String,
    pub rows: usize,
}

/// Rows of a run plus its statistics
#[derive(Debug)]
pub struct SampleOutput {
    pub rows: Vec<Row>,
    pub stats: SampleStats,
}

/// Context of one sampling run.
///
/// Working set, graph and plan are computed once in [`Sampler::new`] and
/// stay fixed; [`Sampler::run`] may be called repeatedly.
pub struct Sampler<'a, S: Store> {
    store: &'a S,
    policy: &'a dyn SamplingPolicy,
    working_set: Vec<EntityId>,
    graph: SchemaGraph,
    plan: SamplingPlan,
}

impl<'a, S: Store> Sampler<'a, S> {
    /// Prepare a run. When a plan cache is given, a fresh cached plan is
    /// reused and a newly computed one is stored; cache failures only warn.
    pub fn new(
        store: &'a S,
        policy: &'a dyn SamplingPolicy,
        cache: Option<&PlanCache>,
    ) -> Result<Self> {
        let schema = store.schema();
        let working_set = select_working_set(store, policy);
        let graph = SchemaGraph::build(schema, &working_set);

        let start = Instant::now();
        let plan = obtain_plan(store, policy, &working_set, cache)?;
        info!("plan ready for {} entities in {:?}", plan.len(), start.elapsed());

        Ok(Self {
            store,
            policy,
            working_set,
            graph,
            plan,
        })
    }

    pub fn working_set(&self) -> &[EntityId] {
        &self.working_set
    }

    pub fn graph(&self) -> &SchemaGraph {
        &self.graph
    }

    pub fn plan(&self) -> &SamplingPlan {
        &self.plan
    }

    /// Run without progress reporting
    pub fn run(&self, entity_limit: Option<usize>) -> Result<SampleOutput> {
        self.run_with_progress(entity_limit, &|_| {})
    }

    /// Collect, add extra rows with their forward closure and deduplicate.
    ///
    /// `entity_limit` truncates the plan to its first N entries. `progress`
    /// is called once per plan entry with the entity name.
    pub fn run_with_progress(
        &self,
        entity_limit: Option<usize>,
        progress: &dyn Fn(&str),
    ) -> Result<SampleOutput> {
        let schema = self.store.schema();
        let expander = Expander::new(schema, &self.graph, self.store, &self.plan, self.policy);
        let mut collected = Collected::new();
        let mut stats = SampleStats {
            entities: self.working_set.len(),
            ..SampleStats::default()
        };

        let start = Instant::now();
        collect_seed(&expander, &mut collected)?;
        stats.seed_rows = collected.len();
        collect_bulk(&expander, &mut collected, entity_limit, progress)?;
        stats.collected_rows = collected.len();
        info!(
            "collected {} rows in {:?}",
            stats.collected_rows,
            start.elapsed()
        );

        let extra = self.policy.extra_rows(schema, self.store)?;
        stats.extra_rows = extra.len();
        let mut extra_duplicates = 0;
        if !extra.is_empty() {
            // Extra entities may sit outside the working set
            let mut roots: Vec<EntityId> = extra.iter().map(|row| row.entity).collect();
            roots.sort();
            roots.dedup();
            let graph = SchemaGraph::build(schema, &roots);
            let expander = Expander::new(schema, &graph, self.store, &self.plan, self.policy);
            let added = collect_extra(&expander, &mut collected, extra)?;
            extra_duplicates = stats.extra_rows - added;
        }

        let rows = collected.into_rows();
        let start = Instant::now();
        let before = rows.len();
        let rows = dedup(rows);
        stats.duplicates = extra_duplicates + before - rows.len();
        info!(
            "removed {} duplicate rows in {:?}",
            stats.duplicates,
            start.elapsed()
        );

        for row in &rows {
            let name = schema.name(row.entity);
            match stats.entity_stats.iter_mut().find(|s| s.name == name) {
                Some(entry) => entry.rows += 1,
                None => stats.entity_stats.push(EntitySampleStats {
                    name: name.to_string(),
                    rows: 1,
                }),
            }
        }

        Ok(SampleOutput { rows, stats })
    }
}

fn obtain_plan<S: Store>(
    store: &S,
    policy: &dyn SamplingPolicy,
    working_set: &[EntityId],
    cache: Option<&PlanCache>,
) -> Result<SamplingPlan> {
    let Some(cache) = cache else {
        return plan_sizes(store, policy, working_set);
    };

    let schema = store.schema();
    let names: Vec<&str> = working_set.iter().map(|&id| schema.name(id)).collect();
    let key = cache.compute_key(policy.sizes(), &policy.full_required(), &names);

    match cache.get(&key) {
        Ok(Some(cached)) => {
            info!("using cached plan {}", key);
            return Ok(SamplingPlan::from_cached(schema, &cached));
        }
        Ok(None) => {}
        Err(e) => warn!("ignoring unreadable plan cache: {:#}", e),
    }

    let plan = plan_sizes(store, policy, working_set)?;
    if let Err(e) = cache.put(&key, &plan.to_cached(schema)) {
        warn!("could not cache plan: {:#}", e);
    }
    Ok(plan)
}
