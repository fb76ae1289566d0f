//! Dependency expansion.
//!
//! Forward expansion pulls in every row that collected rows point to, so the
//! output stays referentially closed. Reverse expansion pulls in rows that
//! point back at collected rows, bounded by each dependent's remaining
//! budget, then closes them forward.
//!
//! Both walks share one [`Collected`] state. Rows already recorded for an
//! entity are never queried again, which is what bounds both walks on
//! self-referencing and mutually-referencing schemas. Forward expansion runs
//! on an explicit stack; reverse expansion recurses once per dependent batch
//! and is bounded by budgets.

use super::plan::SamplingPlan;
use super::policy::SamplingPolicy;
use crate::schema::{Edge, EntityId, EntitySchema, Field, PkValue, Row, Schema, SchemaGraph};
use crate::store::RowSource;
use ahash::{AHashMap, AHashSet};
use anyhow::{Context, Result};
use tracing::debug;

/// Rows collected during a run, with the identities fetched per entity.
///
/// Rows are kept in discovery order. An entity may have a bucket with no rows
/// in it, which marks it as already handled by the seed phase.
#[derive(Debug, Default)]
pub struct Collected {
    rows: Vec<Row>,
    buckets: AHashSet<EntityId>,
    fetched: AHashMap<EntityId, AHashSet<PkValue>>,
}

impl Collected {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty bucket for an entity if it has none
    pub fn init_bucket(&mut self, entity: EntityId) {
        self.buckets.insert(entity);
    }

    pub fn has_bucket(&self, entity: EntityId) -> bool {
        self.buckets.contains(&entity)
    }

    pub fn is_fetched(&self, entity: EntityId, pk: &PkValue) -> bool {
        self.fetched
            .get(&entity)
            .is_some_and(|pks| pks.contains(pk))
    }

    /// Number of identities recorded for an entity
    pub fn fetched_count(&self, entity: EntityId) -> usize {
        self.fetched.get(&entity).map_or(0, |pks| pks.len())
    }

    /// Identities recorded for an entity, sorted
    pub fn fetched(&self, entity: EntityId) -> Vec<PkValue> {
        let mut pks: Vec<PkValue> = self
            .fetched
            .get(&entity)
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        pks.sort();
        pks
    }

    /// Record rows whose identity is new for `entity`; returns those rows
    pub fn add(&mut self, entity: EntityId, rows: Vec<Row>) -> Vec<Row> {
        let fetched = self.fetched.entry(entity).or_default();
        self.buckets.insert(entity);
        let mut added = Vec::new();

        for row in rows {
            if row.entity != entity || !fetched.insert(row.pk.clone()) {
                continue;
            }
            self.rows.push(row.clone());
            added.push(row);
        }

        added
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows in discovery order
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// Pending forward edges of one batch of newly collected rows
struct Frame<'g> {
    entity: EntityId,
    rows: Vec<Row>,
    edges: Vec<&'g Edge>,
}

/// Forward/reverse expansion over a schema graph
pub struct Expander<'a> {
    schema: &'a Schema,
    graph: &'a SchemaGraph,
    source: &'a dyn RowSource,
    plan: &'a SamplingPlan,
    policy: &'a dyn SamplingPolicy,
}

impl<'a> Expander<'a> {
    pub fn new(
        schema: &'a Schema,
        graph: &'a SchemaGraph,
        source: &'a dyn RowSource,
        plan: &'a SamplingPlan,
        policy: &'a dyn SamplingPolicy,
    ) -> Self {
        Self {
            schema,
            graph,
            source,
            plan,
            policy,
        }
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub fn graph(&self) -> &'a SchemaGraph {
        self.graph
    }

    pub fn source(&self) -> &'a dyn RowSource {
        self.source
    }

    pub fn plan(&self) -> &'a SamplingPlan {
        self.plan
    }

    pub fn policy(&self) -> &'a dyn SamplingPolicy {
        self.policy
    }

    /// Planned limit for an entity, or the default limit outside the plan
    pub fn limit(&self, entity: EntityId) -> usize {
        self.plan
            .limit(entity)
            .unwrap_or(self.policy.sizes().default_limit)
    }

    /// Rows an entity may still gain through reverse expansion
    pub fn remaining_budget(&self, entity: EntityId, collected: &Collected) -> usize {
        self.limit(entity)
            .saturating_sub(collected.fetched_count(entity))
    }

    fn entity(&self, id: EntityId) -> Result<&'a EntitySchema> {
        self.schema
            .entity(id)
            .with_context(|| format!("Unknown entity {}", id))
    }

    /// Fetch every row that `rows` reference and is not collected yet,
    /// transitively.
    ///
    /// Walks depth first with an explicit stack, so long reference chains do
    /// not grow the call stack.
    pub fn forward(&self, entity: EntityId, rows: &[Row], collected: &mut Collected) -> Result<()> {
        let mut stack = vec![self.frame(entity, rows.to_vec())];

        while let Some(frame) = stack.last_mut() {
            let Some(edge) = frame.edges.pop() else {
                stack.pop();
                continue;
            };
            let source = self.entity(frame.entity)?;
            let target = self.entity(edge.entity)?;
            if self.policy.is_auxiliary(&target.name) {
                continue;
            }

            debug!("fetching dependency {} -> {}", source.name, target.name);

            let multi = source.field(&edge.field).is_some_and(Field::is_multi);
            let mut seen: AHashSet<PkValue> = AHashSet::new();
            let mut wanted: Vec<PkValue> = Vec::new();
            for row in &frame.rows {
                let values = if multi {
                    row.references(&edge.field)
                } else {
                    row.reference(&edge.field).into_iter().collect()
                };
                for pk in values {
                    if !collected.is_fetched(target.id, &pk) && seen.insert(pk.clone()) {
                        wanted.push(pk);
                    }
                }
            }

            if wanted.is_empty() {
                continue;
            }

            let found = self.source.by_pks(target, &wanted).with_context(|| {
                format!("Failed to fetch {} -> {}", source.name, target.name)
            })?;
            let added = collected.add(target.id, found);

            if !added.is_empty() && self.graph.has_forward(target.id) {
                stack.push(self.frame(target.id, added));
            }
        }

        Ok(())
    }

    fn frame(&self, entity: EntityId, rows: Vec<Row>) -> Frame<'a> {
        // reversed so that popping visits edges in graph order
        let mut edges: Vec<&'a Edge> = self.graph.forward(entity).collect();
        edges.reverse();
        Frame {
            entity,
            rows,
            edges,
        }
    }

    /// Close `rows` forward, then fetch rows of dependent entities that
    /// reference them, within each dependent's remaining budget, recursively.
    pub fn reverse(&self, entity: EntityId, rows: &[Row], collected: &mut Collected) -> Result<()> {
        self.forward(entity, rows, collected)?;

        let source = self.entity(entity)?;
        let targets: Vec<PkValue> = rows.iter().map(|r| r.pk.clone()).collect();
        if targets.is_empty() {
            return Ok(());
        }

        for edge in self.graph.reverse(entity) {
            let dependent = self.entity(edge.entity)?;
            let budget = self.remaining_budget(dependent.id, collected);
            if budget == 0 {
                debug!("budget for {} exhausted", dependent.name);
                continue;
            }

            debug!("fetching dependency {} <- {}", source.name, dependent.name);

            let exclude = collected.fetched(dependent.id);
            let mut found = self
                .source
                .referencing(dependent, &edge.field, &targets, &exclude, budget)
                .with_context(|| {
                    format!("Failed to fetch {} <- {}", source.name, dependent.name)
                })?;
            found.truncate(budget);
            let added = collected.add(dependent.id, found);

            if added.is_empty() {
                continue;
            }

            if self.graph.has_reverse(dependent.id) {
                self.reverse(dependent.id, &added, collected)?;
            } else if self.graph.has_forward(dependent.id) {
                self.forward(dependent.id, &added, collected)?;
            }
        }

        Ok(())
    }
}
