//! DuckDB-backed store.
//!
//! Introspects the `main` schema of a DuckDB database into a [`Schema`] and
//! serves the sampler's reads with parameterized SQL. Pure join tables (two
//! single-column foreign keys and nothing else but a primary key) are hidden
//! from the entity list and surface as implicit multi-reference fields on the
//! first referencing table.

use super::{Catalog, LoadMode, RowSink, RowSource};
use crate::schema::{EntityId, EntitySchema, Field, PkValue, Row, Schema};
use ahash::AHashMap;
use anyhow::{Context, Result};
use duckdb::types::{TimeUnit, Value, ValueRef};
use duckdb::{params_from_iter, Connection};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Join table backing an implicit multi-reference field
#[derive(Debug, Clone)]
struct JoinTable {
    table: String,
    source_column: String,
    target_column: String,
}

/// Single-column foreign key as reported by `duckdb_constraints()`
#[derive(Debug, Clone)]
struct ForeignKey {
    column: String,
    referenced_table: String,
}

/// Raw catalog facts for one table or view
#[derive(Debug, Default)]
struct TableInfo {
    is_view: bool,
    columns: Vec<String>,
    primary_key: Option<String>,
    foreign_keys: Vec<ForeignKey>,
}

pub struct DuckDbStore {
    conn: Connection,
    schema: Schema,
    /// Implicit multi-reference fields, keyed by (entity, field)
    joins: AHashMap<(EntityId, String), JoinTable>,
    /// Row-creation hooks: SQL with one `?` bound to the new row's key
    hooks: AHashMap<EntityId, Vec<String>>,
    /// Join rows collected during `insert`, written on `commit`
    pending_links: Vec<(JoinTable, PkValue, PkValue)>,
}

impl DuckDbStore {
    /// Open a database file and introspect its schema
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB database: {}", path.display()))?;
        Self::from_connection(conn)
    }

    /// Wrap an existing connection and introspect its schema
    pub fn from_connection(conn: Connection) -> Result<Self> {
        let tables = read_catalog(&conn)?;
        let (schema, joins) = build_schema(tables);
        debug!("introspected {} entities", schema.len());
        Ok(Self {
            conn,
            schema,
            joins,
            hooks: AHashMap::new(),
            pending_links: Vec::new(),
        })
    }

    /// Register row-creation hooks for an entity
    pub fn with_hooks(mut self, entity: &str, statements: Vec<String>) -> Result<Self> {
        let id = self
            .schema
            .entity_id(entity)
            .with_context(|| format!("Unknown entity in load hooks: {}", entity))?;
        self.hooks.entry(id).or_default().extend(statements);
        Ok(self)
    }

    /// Get the underlying DuckDB connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn join(&self, entity: &EntitySchema, field: &str) -> Option<&JoinTable> {
        self.joins.get(&(entity.id, field.to_string()))
    }

    /// Run `SELECT <stored columns> FROM <entity> <clause>` and build rows
    fn select(&self, entity: &EntitySchema, clause: &str, params: &[Value]) -> Result<Vec<Row>> {
        let columns: Vec<&Field> = entity.fields.iter().filter(|f| !f.is_multi()).collect();
        let sql = format!(
            "SELECT {} FROM {} {}",
            columns
                .iter()
                .map(|f| quote(&f.name))
                .collect::<Vec<_>>()
                .join(", "),
            quote(&entity.name),
            clause
        );

        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("Failed to prepare query: {}", sql))?;
        let mut result = stmt
            .query(params_from_iter(params.iter()))
            .with_context(|| format!("Failed to execute query: {}", sql))?;

        let mut rows = Vec::new();
        while let Some(record) = result.next()? {
            let mut fields = serde_json::Map::new();
            for (i, field) in columns.iter().enumerate() {
                fields.insert(field.name.clone(), to_json(record.get_ref(i)?));
            }
            let pk = fields
                .get(&entity.primary_key)
                .and_then(PkValue::from_json)
                .with_context(|| format!("Row of '{}' has no usable primary key", entity.name))?;
            rows.push(Row {
                entity: entity.id,
                pk,
                fields,
            });
        }
        drop(result);

        self.attach_links(entity, &mut rows)?;
        Ok(rows)
    }

    /// Fill implicit multi-reference fields from their join tables
    fn attach_links(&self, entity: &EntitySchema, rows: &mut [Row]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        for field in entity.fields.iter().filter(|f| f.is_multi()) {
            let Some(join) = self.join(entity, &field.name) else {
                continue;
            };

            let keys: Vec<Value> = rows.iter().map(|r| to_param(&r.pk)).collect();
            let sql = format!(
                "SELECT {src}, {dst} FROM {table} WHERE {src} IN ({marks}) ORDER BY {src}, {dst}",
                src = quote(&join.source_column),
                dst = quote(&join.target_column),
                table = quote(&join.table),
                marks = placeholders(keys.len()),
            );

            let mut stmt = self
                .conn
                .prepare(&sql)
                .with_context(|| format!("Failed to prepare query: {}", sql))?;
            let mut result = stmt.query(params_from_iter(keys.iter()))?;

            let mut links: BTreeMap<PkValue, Vec<serde_json::Value>> = BTreeMap::new();
            while let Some(record) = result.next()? {
                let source = PkValue::from_json(&to_json(record.get_ref(0)?));
                let target = to_json(record.get_ref(1)?);
                if let Some(source) = source {
                    links.entry(source).or_default().push(target);
                }
            }

            for row in rows.iter_mut() {
                let values = links.remove(&row.pk).unwrap_or_default();
                row.fields
                    .insert(field.name.clone(), serde_json::Value::Array(values));
            }
        }

        Ok(())
    }
}

impl Catalog for DuckDbStore {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn size_hint(&self, entity: &EntitySchema) -> Result<u64> {
        let sql = format!(
            "SELECT {pk} FROM {table} ORDER BY {pk} DESC LIMIT 1",
            pk = quote(&entity.primary_key),
            table = quote(&entity.name)
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("Failed to prepare query: {}", sql))?;
        let mut result = stmt.query([])?;
        let max = match result.next()? {
            Some(record) => PkValue::from_json(&to_json(record.get_ref(0)?))
                .and_then(|pk| pk.as_int())
                .unwrap_or(0),
            None => 0,
        };
        Ok(max.max(0) as u64)
    }
}

impl RowSource for DuckDbStore {
    fn probe(&self, entity: &EntitySchema) -> Result<()> {
        let sql = format!("SELECT * FROM {} LIMIT 1", quote(&entity.name));
        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("Failed to prepare query: {}", sql))?;
        let mut result = stmt.query([])?;
        result.next()?;
        Ok(())
    }

    fn latest(&self, entity: &EntitySchema, limit: usize) -> Result<Vec<Row>> {
        let clause = format!(
            "ORDER BY {} DESC LIMIT {}",
            quote(&entity.primary_key),
            limit
        );
        self.select(entity, &clause, &[])
    }

    fn by_pks(&self, entity: &EntitySchema, pks: &[PkValue]) -> Result<Vec<Row>> {
        if pks.is_empty() {
            return Ok(Vec::new());
        }
        let clause = format!(
            "WHERE {pk} IN ({}) ORDER BY {pk}",
            placeholders(pks.len()),
            pk = quote(&entity.primary_key)
        );
        let params: Vec<Value> = pks.iter().map(to_param).collect();
        self.select(entity, &clause, &params)
    }

    fn referencing(
        &self,
        entity: &EntitySchema,
        field: &str,
        targets: &[PkValue],
        exclude: &[PkValue],
        limit: usize,
    ) -> Result<Vec<Row>> {
        if targets.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let pk = quote(&entity.primary_key);
        let mut clause = match self.join(entity, field) {
            Some(join) => format!(
                "WHERE {pk} IN (SELECT {src} FROM {table} WHERE {dst} IN ({marks}))",
                src = quote(&join.source_column),
                dst = quote(&join.target_column),
                table = quote(&join.table),
                marks = placeholders(targets.len()),
            ),
            None => format!(
                "WHERE {} IN ({})",
                quote(field),
                placeholders(targets.len())
            ),
        };
        if !exclude.is_empty() {
            clause.push_str(&format!(" AND {pk} NOT IN ({})", placeholders(exclude.len())));
        }
        clause.push_str(&format!(" ORDER BY {pk} LIMIT {limit}"));

        let params: Vec<Value> = targets.iter().chain(exclude).map(to_param).collect();
        self.select(entity, &clause, &params)
    }

    fn matching(
        &self,
        entity: &EntitySchema,
        field: &str,
        value: &serde_json::Value,
        limit: usize,
    ) -> Result<Vec<Row>> {
        let clause = format!(
            "WHERE {} = ? ORDER BY {} LIMIT {}",
            quote(field),
            quote(&entity.primary_key),
            limit
        );
        self.select(entity, &clause, &[from_json(value)])
    }
}

impl RowSink for DuckDbStore {
    fn begin(&mut self) -> Result<()> {
        self.conn
            .execute_batch("BEGIN TRANSACTION")
            .context("Failed to begin transaction")
    }

    fn clear(&mut self, entity: &EntitySchema) -> Result<()> {
        self.conn
            .execute(&format!("DELETE FROM {}", quote(&entity.name)), [])
            .with_context(|| format!("Failed to clear {}", entity.name))?;
        Ok(())
    }

    fn insert(&mut self, entity: &EntitySchema, rows: &[Row], mode: LoadMode) -> Result<()> {
        let columns: Vec<&Field> = entity.fields.iter().filter(|f| !f.is_multi()).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(&entity.name),
            columns
                .iter()
                .map(|f| quote(&f.name))
                .collect::<Vec<_>>()
                .join(", "),
            placeholders(columns.len())
        );

        for row in rows {
            let params: Vec<Value> = columns
                .iter()
                .map(|f| {
                    if f.name == entity.primary_key {
                        to_param(&row.pk)
                    } else {
                        row.fields.get(&f.name).map(from_json).unwrap_or(Value::Null)
                    }
                })
                .collect();
            self.conn
                .execute(&sql, params_from_iter(params.iter()))
                .with_context(|| format!("Failed to insert {} #{}", entity.name, row.pk))?;

            for field in entity.fields.iter().filter(|f| f.is_multi()) {
                if let Some(join) = self.joins.get(&(entity.id, field.name.clone())) {
                    for target in row.references(&field.name) {
                        self.pending_links
                            .push((join.clone(), row.pk.clone(), target));
                    }
                }
            }

            if mode == LoadMode::Normal {
                for hook in self.hooks.get(&entity.id).into_iter().flatten() {
                    self.conn
                        .execute(hook, params_from_iter([to_param(&row.pk)].iter()))
                        .with_context(|| format!("Create hook failed for {}: {}", entity.name, hook))?;
                }
            }
        }

        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        for (join, source, target) in std::mem::take(&mut self.pending_links) {
            let sql = format!(
                "INSERT INTO {} ({}, {}) VALUES (?, ?)",
                quote(&join.table),
                quote(&join.source_column),
                quote(&join.target_column)
            );
            self.conn
                .execute(&sql, params_from_iter([to_param(&source), to_param(&target)].iter()))
                .with_context(|| format!("Failed to insert link into {}", join.table))?;
        }
        self.conn
            .execute_batch("COMMIT")
            .context("Failed to commit transaction")
    }

    fn rollback(&mut self) {
        self.pending_links.clear();
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            warn!("rollback failed: {}", e);
        }
    }
}

/// Read tables, columns and key constraints of the `main` schema
fn read_catalog(conn: &Connection) -> Result<BTreeMap<String, TableInfo>> {
    let mut tables: BTreeMap<String, TableInfo> = BTreeMap::new();

    let mut stmt = conn.prepare(
        "SELECT table_name, table_type FROM information_schema.tables \
         WHERE table_schema = 'main' ORDER BY table_name",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    for row in rows {
        let (name, kind) = row?;
        tables.insert(
            name,
            TableInfo {
                is_view: kind.eq_ignore_ascii_case("VIEW"),
                ..Default::default()
            },
        );
    }

    let mut stmt = conn.prepare(
        "SELECT table_name, column_name FROM information_schema.columns \
         WHERE table_schema = 'main' ORDER BY table_name, ordinal_position",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    for row in rows {
        let (table, column) = row?;
        if let Some(info) = tables.get_mut(&table) {
            info.columns.push(column);
        }
    }

    let mut stmt = conn.prepare(
        "SELECT table_name, constraint_type, \
                array_to_string(constraint_column_names, ','), \
                referenced_table \
         FROM duckdb_constraints() \
         WHERE schema_name = 'main' AND constraint_type IN ('PRIMARY KEY', 'FOREIGN KEY') \
         ORDER BY table_name, constraint_index",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;
    for row in rows {
        let (table, kind, columns, referenced) = row?;
        let Some(info) = tables.get_mut(&table) else {
            continue;
        };
        let columns = columns.unwrap_or_default();
        if columns.contains(',') {
            warn!(
                "skipping composite {} on {} ({}): not supported",
                kind.to_lowercase(),
                table,
                columns
            );
            continue;
        }
        match (kind.as_str(), referenced) {
            ("PRIMARY KEY", _) => info.primary_key = Some(columns),
            ("FOREIGN KEY", Some(referenced_table)) => {
                if !info.foreign_keys.iter().any(|fk| fk.column == columns) {
                    info.foreign_keys.push(ForeignKey {
                        column: columns,
                        referenced_table,
                    });
                }
            }
            _ => {}
        }
    }

    Ok(tables)
}

/// Turn raw catalog facts into a schema plus implicit join descriptors
fn build_schema(
    tables: BTreeMap<String, TableInfo>,
) -> (Schema, AHashMap<(EntityId, String), JoinTable>) {
    // Pure join tables: exactly two foreign keys, nothing else but the key
    let mut links: BTreeMap<String, Vec<(String, JoinTable)>> = BTreeMap::new();
    for (name, info) in &tables {
        if info.is_view || info.foreign_keys.len() != 2 {
            continue;
        }
        let extra = info.columns.iter().any(|c| {
            Some(c) != info.primary_key.as_ref()
                && !info.foreign_keys.iter().any(|fk| &fk.column == c)
        });
        if extra {
            continue;
        }
        let mut fks = info.foreign_keys.clone();
        fks.sort_by_key(|fk| info.columns.iter().position(|c| c == &fk.column));
        links.entry(fks[0].referenced_table.clone()).or_default().push((
            fks[1].referenced_table.clone(),
            JoinTable {
                table: name.clone(),
                source_column: fks[0].column.clone(),
                target_column: fks[1].column.clone(),
            },
        ));
    }
    let hidden: Vec<String> = links
        .values()
        .flatten()
        .map(|(_, join)| join.table.clone())
        .collect();

    let mut schema = Schema::new();
    let mut joins = AHashMap::new();

    for (name, info) in tables {
        if hidden.contains(&name) {
            continue;
        }

        let primary_key = match info.primary_key.clone().or_else(|| {
            info.columns
                .iter()
                .find(|c| c.eq_ignore_ascii_case("id"))
                .cloned()
        }) {
            Some(pk) => pk,
            None if info.is_view && !info.columns.is_empty() => info.columns[0].clone(),
            None => {
                warn!("skipping {}: no primary key", name);
                continue;
            }
        };

        let mut entity = EntitySchema::new(name.clone(), primary_key.clone());
        if info.is_view {
            entity = entity.as_view();
        }
        for column in info.columns.iter().filter(|c| **c != primary_key) {
            let field = match info.foreign_keys.iter().find(|fk| &fk.column == column) {
                Some(fk) => Field::reference(column.clone(), fk.referenced_table.clone()),
                None => Field::scalar(column.clone()),
            };
            entity = entity.with_field(field);
        }

        let mut implicit = Vec::new();
        for (target, join) in links.remove(&name).unwrap_or_default() {
            entity = entity.with_field(Field::many(join.table.clone(), target));
            implicit.push(join);
        }

        let id = schema.add_entity(entity);
        for join in implicit {
            joins.insert((id, join.table.clone()), join);
        }
    }

    (schema, joins)
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn to_param(pk: &PkValue) -> Value {
    match pk {
        PkValue::Int(i) => Value::BigInt(*i),
        PkValue::Text(s) => Value::Text(s.clone()),
    }
}

fn from_json(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::BigInt(i)
            } else if let Some(u) = n.as_u64() {
                Value::UBigInt(u)
            } else {
                Value::Double(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

fn to_json(value: ValueRef<'_>) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        ValueRef::Null => Json::Null,
        ValueRef::Boolean(b) => Json::from(b),
        ValueRef::TinyInt(n) => Json::from(n),
        ValueRef::SmallInt(n) => Json::from(n),
        ValueRef::Int(n) => Json::from(n),
        ValueRef::BigInt(n) => Json::from(n),
        ValueRef::HugeInt(n) => match i64::try_from(n) {
            Ok(n) => Json::from(n),
            Err(_) => Json::from(n.to_string()),
        },
        ValueRef::UTinyInt(n) => Json::from(n),
        ValueRef::USmallInt(n) => Json::from(n),
        ValueRef::UInt(n) => Json::from(n),
        ValueRef::UBigInt(n) => Json::from(n),
        ValueRef::Float(f) => Json::from(f as f64),
        ValueRef::Double(f) => Json::from(f),
        ValueRef::Decimal(d) => Json::from(d.to_string()),
        ValueRef::Text(s) => Json::from(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => Json::from(hex::encode(b)),
        ValueRef::Timestamp(unit, ts) => {
            let micros = to_micros(unit, ts);
            let secs = micros.div_euclid(1_000_000);
            let nanos = (micros.rem_euclid(1_000_000) * 1000) as u32;
            match chrono::DateTime::from_timestamp(secs, nanos) {
                Some(dt) => Json::from(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
                None => Json::from(ts),
            }
        }
        ValueRef::Date32(days) => {
            // 719163 = days from 0001-01-01 to 1970-01-01
            match chrono::NaiveDate::from_num_days_from_ce_opt(719163 + days) {
                Some(date) => Json::from(date.format("%Y-%m-%d").to_string()),
                None => Json::from(days),
            }
        }
        ValueRef::Time64(unit, t) => {
            let micros = to_micros(unit, t);
            let secs = (micros / 1_000_000) as u32;
            let nanos = ((micros % 1_000_000) * 1000) as u32;
            match chrono::NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos) {
                Some(time) => Json::from(time.format("%H:%M:%S%.f").to_string()),
                None => Json::from(t),
            }
        }
        other => Json::from(format!("{:?}", other)),
    }
}

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value * 1_000_000,
        TimeUnit::Millisecond => value * 1_000,
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}
