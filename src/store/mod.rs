//! Data source and sink abstractions.
//!
//! The sampler only talks to a store through these traits:
//! - [`Catalog`]: the schema and a cheap size proxy per entity
//! - [`RowSource`]: the handful of reads the expander needs
//! - [`RowSink`]: bulk restore of a snapshot
//!
//! Two implementations ship with the crate: [`DuckDbStore`] for real
//! databases and [`MemoryStore`] for tests and embedding.

mod duckdb;
mod memory;

pub use self::duckdb::DuckDbStore;
pub use memory::{CreateHook, MemoryStore};

use crate::schema::{EntitySchema, PkValue, Row, Schema};
use anyhow::Result;

/// Schema metadata provider
pub trait Catalog {
    /// The full entity catalog
    fn schema(&self) -> &Schema;

    /// Cheap size proxy: the largest integer primary key currently assigned,
    /// or 0 when the entity is empty or keyed by non-integers.
    fn size_hint(&self, entity: &EntitySchema) -> Result<u64>;
}

/// Read access used by the sampler
pub trait RowSource {
    /// Read at most one row, surfacing any error the entity produces
    fn probe(&self, entity: &EntitySchema) -> Result<()>;

    /// Up to `limit` rows ordered by primary key, descending
    fn latest(&self, entity: &EntitySchema, limit: usize) -> Result<Vec<Row>>;

    /// Rows whose primary key is in `pks`
    fn by_pks(&self, entity: &EntitySchema, pks: &[PkValue]) -> Result<Vec<Row>>;

    /// Up to `limit` rows whose `field` references one of `targets`,
    /// skipping rows whose primary key is in `exclude`
    fn referencing(
        &self,
        entity: &EntitySchema,
        field: &str,
        targets: &[PkValue],
        exclude: &[PkValue],
        limit: usize,
    ) -> Result<Vec<Row>>;

    /// Up to `limit` rows whose `field` equals `value`, by primary key ascending
    fn matching(
        &self,
        entity: &EntitySchema,
        field: &str,
        value: &serde_json::Value,
        limit: usize,
    ) -> Result<Vec<Row>>;
}

/// How rows are written by a [`RowSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Regular inserts: row-creation hooks run
    #[default]
    Normal,
    /// Snapshot restore: row-creation hooks are skipped
    Bulk,
}

/// Write access used by the loader.
///
/// A restore calls `begin`, then `clear`/`insert` any number of times, then
/// `commit`; `rollback` is called instead of `commit` when anything failed.
pub trait RowSink {
    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    /// Remove every row of an entity
    fn clear(&mut self, entity: &EntitySchema) -> Result<()>;

    /// Insert rows of one entity
    fn insert(&mut self, entity: &EntitySchema, rows: &[Row], mode: LoadMode) -> Result<()>;

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) {}
}

/// Convenience bound for stores that can be sampled from
pub trait Store: Catalog + RowSource {}

impl<T: Catalog + RowSource> Store for T {}
