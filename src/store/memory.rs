//! In-memory store.
//!
//! Holds rows per entity in insertion order. Used by the test suite and the
//! benchmarks, and handy for embedding the sampler over data that is already
//! in process.

use super::{Catalog, LoadMode, RowSink, RowSource};
use crate::schema::{EntityId, EntitySchema, PkValue, Row, Schema};
use ahash::{AHashMap, AHashSet};
use anyhow::{bail, Result};

/// Row-creation side effect: receives the inserted row and returns rows to
/// add as a consequence (for example a profile created for every new user).
pub type CreateHook = Box<dyn Fn(&Row) -> Vec<Row>>;

pub struct MemoryStore {
    schema: Schema,
    tables: Vec<Vec<Row>>,
    broken: AHashSet<EntityId>,
    hooks: AHashMap<EntityId, Vec<CreateHook>>,
}

impl MemoryStore {
    pub fn new(schema: Schema) -> Self {
        let tables = vec![Vec::new(); schema.len()];
        Self {
            schema,
            tables,
            broken: AHashSet::new(),
            hooks: AHashMap::new(),
        }
    }

    /// Entity ID by name; panics on unknown names, for fixture setup
    pub fn id(&self, name: &str) -> EntityId {
        self.schema
            .entity_id(name)
            .unwrap_or_else(|| panic!("unknown entity {name}"))
    }

    /// Append a row, replacing any existing row with the same key
    pub fn push(&mut self, row: Row) {
        let table = &mut self.tables[row.entity.0 as usize];
        if let Some(existing) = table.iter_mut().find(|r| r.pk == row.pk) {
            *existing = row;
        } else {
            table.push(row);
        }
    }

    /// Make every read of `entity` fail, as an unmigrated table would
    pub fn mark_broken(&mut self, entity: EntityId) {
        self.broken.insert(entity);
    }

    /// Register a hook run for each row inserted in [`LoadMode::Normal`]
    pub fn on_create(&mut self, entity: EntityId, hook: CreateHook) {
        self.hooks.entry(entity).or_default().push(hook);
    }

    /// All rows of an entity in insertion order
    pub fn rows(&self, entity: EntityId) -> &[Row] {
        self.tables
            .get(entity.0 as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of rows across entities
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(Vec::len).sum()
    }

    fn table(&self, entity: &EntitySchema) -> Result<&[Row]> {
        if self.broken.contains(&entity.id) {
            bail!("relation \"{}\" does not exist", entity.name);
        }
        Ok(self.rows(entity.id))
    }

    fn sorted(&self, entity: &EntitySchema) -> Result<Vec<&Row>> {
        let mut rows: Vec<&Row> = self.table(entity)?.iter().collect();
        rows.sort_by(|a, b| a.pk.cmp(&b.pk));
        Ok(rows)
    }
}

impl Catalog for MemoryStore {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn size_hint(&self, entity: &EntitySchema) -> Result<u64> {
        Ok(self
            .table(entity)?
            .iter()
            .filter_map(|r| r.pk.as_int())
            .max()
            .map(|max| max.max(0) as u64)
            .unwrap_or(0))
    }
}

impl RowSource for MemoryStore {
    fn probe(&self, entity: &EntitySchema) -> Result<()> {
        self.table(entity).map(|_| ())
    }

    fn latest(&self, entity: &EntitySchema, limit: usize) -> Result<Vec<Row>> {
        Ok(self
            .sorted(entity)?
            .into_iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    fn by_pks(&self, entity: &EntitySchema, pks: &[PkValue]) -> Result<Vec<Row>> {
        let wanted: AHashSet<&PkValue> = pks.iter().collect();
        Ok(self
            .sorted(entity)?
            .into_iter()
            .filter(|r| wanted.contains(&r.pk))
            .cloned()
            .collect())
    }

    fn referencing(
        &self,
        entity: &EntitySchema,
        field: &str,
        targets: &[PkValue],
        exclude: &[PkValue],
        limit: usize,
    ) -> Result<Vec<Row>> {
        let targets: AHashSet<&PkValue> = targets.iter().collect();
        let exclude: AHashSet<&PkValue> = exclude.iter().collect();
        Ok(self
            .sorted(entity)?
            .into_iter()
            .filter(|r| !exclude.contains(&r.pk))
            .filter(|r| r.references(field).iter().any(|v| targets.contains(v)))
            .take(limit)
            .cloned()
            .collect())
    }

    fn matching(
        &self,
        entity: &EntitySchema,
        field: &str,
        value: &serde_json::Value,
        limit: usize,
    ) -> Result<Vec<Row>> {
        Ok(self
            .sorted(entity)?
            .into_iter()
            .filter(|r| r.fields.get(field) == Some(value))
            .take(limit)
            .cloned()
            .collect())
    }
}

impl RowSink for MemoryStore {
    fn clear(&mut self, entity: &EntitySchema) -> Result<()> {
        if let Some(table) = self.tables.get_mut(entity.id.0 as usize) {
            table.clear();
        }
        Ok(())
    }

    fn insert(&mut self, entity: &EntitySchema, rows: &[Row], mode: LoadMode) -> Result<()> {
        for row in rows {
            if row.entity != entity.id {
                bail!(
                    "row {} does not belong to entity '{}'",
                    row.pk,
                    entity.name
                );
            }
            self.push(row.clone());

            if mode == LoadMode::Normal {
                let created: Vec<Row> = self
                    .hooks
                    .get(&entity.id)
                    .into_iter()
                    .flatten()
                    .flat_map(|hook| hook(row))
                    .collect();
                for row in created {
                    self.push(row);
                }
            }
        }
        Ok(())
    }
}
