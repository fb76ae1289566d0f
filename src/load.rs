//! Snapshot restore.
//!
//! Rows are inserted entity by entity in dependency order, so a sink that
//! enforces foreign keys accepts them. Inside a self-referencing entity,
//! referenced rows go first.

use crate::schema::{EntityId, EntitySchema, Row, SchemaGraph};
use crate::snapshot::SnapshotRecord;
use crate::store::{Catalog, LoadMode, RowSink};
use ahash::{AHashMap, AHashSet};
use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{debug, info};

/// Statistics from a restore
#[derive(Debug, Default, Serialize)]
pub struct LoadStats {
    /// Bootstrap entities emptied before inserting
    pub cleared: Vec<String>,
    /// Entities that received rows
    pub entities: usize,
    /// Rows inserted
    pub rows: usize,
}

/// Restores snapshots into a sink
pub struct Loader {
    clear: Vec<String>,
    mode: LoadMode,
}

impl Loader {
    /// Loader that empties `clear` before inserting, in bulk mode
    pub fn new(clear: Vec<String>) -> Self {
        Self {
            clear,
            mode: LoadMode::Bulk,
        }
    }

    /// Insert with a different mode; [`LoadMode::Normal`] runs creation hooks
    pub fn with_mode(mut self, mode: LoadMode) -> Self {
        self.mode = mode;
        self
    }

    /// Restore `records` into `store` inside one transaction.
    ///
    /// Records naming an unknown entity fail the restore before anything is
    /// written.
    pub fn restore<S>(&self, store: &mut S, records: Vec<SnapshotRecord>) -> Result<LoadStats>
    where
        S: Catalog + RowSink + ?Sized,
    {
        let (batches, cleared) = self.prepare(store, records)?;

        store.begin()?;
        match self.write(store, &batches, &cleared) {
            Ok(stats) => {
                store.commit()?;
                info!(
                    "loaded {} rows into {} entities",
                    stats.rows, stats.entities
                );
                Ok(stats)
            }
            Err(e) => {
                store.rollback();
                Err(e)
            }
        }
    }

    /// Resolve records to rows grouped per entity, in load order
    fn prepare<S>(
        &self,
        store: &S,
        records: Vec<SnapshotRecord>,
    ) -> Result<(Vec<(EntitySchema, Vec<Row>)>, Vec<EntitySchema>)>
    where
        S: Catalog + ?Sized,
    {
        let schema = store.schema();

        let mut grouped: AHashMap<EntityId, Vec<Row>> = AHashMap::new();
        for record in records {
            let Some(entity) = schema.get_entity(&record.model) else {
                bail!("Snapshot references unknown entity '{}'", record.model);
            };
            let mut row = Row::new(entity.id, record.pk);
            row.fields = record.fields;
            row.fields
                .insert(entity.primary_key.clone(), row.pk.to_json());
            grouped.entry(entity.id).or_default().push(row);
        }

        let graph = SchemaGraph::from_schema(schema);
        let order = graph.load_order();
        let mut batches = Vec::with_capacity(grouped.len());
        for &id in &order {
            let (Some(rows), Some(entity)) = (grouped.remove(&id), schema.entity(id)) else {
                continue;
            };
            let rows = if graph.has_self_reference(id) {
                let fields: Vec<&str> = graph
                    .forward(id)
                    .filter(|edge| edge.entity == id)
                    .map(|edge| edge.field.as_str())
                    .collect();
                parents_first(rows, &fields)
            } else {
                rows
            };
            batches.push((entity.clone(), rows));
        }

        // Referencing entities are emptied before the entities they reference
        let mut cleared: Vec<EntitySchema> = self
            .clear
            .iter()
            .filter_map(|name| match schema.get_entity(name) {
                Some(entity) => Some(entity.clone()),
                None => {
                    debug!("no bootstrap entity {} to clear", name);
                    None
                }
            })
            .collect();
        cleared.sort_by_key(|entity| {
            std::cmp::Reverse(order.iter().position(|&id| id == entity.id))
        });
        cleared.dedup_by_key(|entity| entity.id);

        Ok((batches, cleared))
    }

    fn write<S>(
        &self,
        store: &mut S,
        batches: &[(EntitySchema, Vec<Row>)],
        cleared: &[EntitySchema],
    ) -> Result<LoadStats>
    where
        S: RowSink + ?Sized,
    {
        let mut stats = LoadStats::default();

        for entity in cleared {
            info!("clearing {}", entity.name);
            store.clear(entity)?;
            stats.cleared.push(entity.name.clone());
        }

        for (entity, rows) in batches {
            debug!("inserting {} rows into {}", rows.len(), entity.name);
            store.insert(entity, rows, self.mode)?;
            stats.entities += 1;
            stats.rows += rows.len();
        }

        Ok(stats)
    }
}

/// Order rows so that a row referenced through `fields` precedes the rows
/// referencing it. Rows caught in a reference cycle keep their input order
/// at the end.
pub fn parents_first(rows: Vec<Row>, fields: &[&str]) -> Vec<Row> {
    let present: AHashSet<_> = rows.iter().map(|r| r.pk.clone()).collect();
    let mut placed = AHashSet::with_capacity(rows.len());
    let mut ordered = Vec::with_capacity(rows.len());
    let mut pending = rows;

    loop {
        let before = pending.len();
        let mut waiting = Vec::new();
        for row in pending {
            let ready = fields.iter().all(|field| match row.reference(field) {
                Some(parent) => {
                    parent == row.pk || !present.contains(&parent) || placed.contains(&parent)
                }
                None => true,
            });
            if ready {
                placed.insert(row.pk.clone());
                ordered.push(row);
            } else {
                waiting.push(row);
            }
        }
        if waiting.is_empty() || waiting.len() == before {
            ordered.extend(waiting);
            return ordered;
        }
        pending = waiting;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parents_first() {
        let rows = vec![
            Row::new(EntityId(0), 3).with("parent_id", 2),
            Row::new(EntityId(0), 2).with("parent_id", 1),
            Row::new(EntityId(0), 1).with("parent_id", serde_json::Value::Null),
            Row::new(EntityId(0), 4).with("parent_id", 99),
        ];
        let pks: Vec<_> = parents_first(rows, &["parent_id"])
            .into_iter()
            .map(|r| r.pk.as_int().unwrap())
            .collect();
        assert_eq!(pks, vec![1, 4, 2, 3]);
    }

    #[test]
    fn test_parents_first_keeps_cycles() {
        let rows = vec![
            Row::new(EntityId(0), 1).with("parent_id", 2),
            Row::new(EntityId(0), 2).with("parent_id", 1),
            Row::new(EntityId(0), 3).with("parent_id", 3),
        ];
        let pks: Vec<_> = parents_first(rows, &["parent_id"])
            .into_iter()
            .map(|r| r.pk.as_int().unwrap())
            .collect();
        assert_eq!(pks, vec![3, 1, 2]);
    }
}
