//! Snapshot files.
//!
//! A snapshot is a list of records shaped like Django fixtures:
//!
//! ```json
//! [{"model": "blog_post", "pk": 10, "fields": {"author_id": 1, "title": "Hi"}}]
//! ```
//!
//! The format comes from the first suffix of the file name and the
//! compression from the last one, so `development_data.json.gz` is gzipped
//! JSON.

mod compression;

pub use compression::Compression;

use crate::schema::{PkValue, Row, Schema};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;

/// Serialization format of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Json,
    JsonLines,
    Yaml,
}

impl SnapshotFormat {
    /// Guess the format from the first suffix of the file name.
    ///
    /// Names without a suffix, or with only a compression suffix, are JSON.
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let mut suffixes = name.trim_start_matches('.').split('.').skip(1);

        match suffixes.next().map(str::to_lowercase) {
            None => Ok(SnapshotFormat::Json),
            Some(ext) if Compression::from_extension(&ext) != Compression::None => {
                Ok(SnapshotFormat::Json)
            }
            Some(ext) => ext.parse(),
        }
    }
}

impl FromStr for SnapshotFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(SnapshotFormat::Json),
            "jsonl" | "ndjson" => Ok(SnapshotFormat::JsonLines),
            "yaml" | "yml" => Ok(SnapshotFormat::Yaml),
            _ => bail!(
                "Unknown serialization format: {}. Valid options: json, jsonl, yaml",
                s
            ),
        }
    }
}

impl fmt::Display for SnapshotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotFormat::Json => write!(f, "json"),
            SnapshotFormat::JsonLines => write!(f, "jsonl"),
            SnapshotFormat::Yaml => write!(f, "yaml"),
        }
    }
}

/// One serialized row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub model: String,
    pub pk: PkValue,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl SnapshotRecord {
    /// Build a record from a row; the primary key moves out of `fields`
    pub fn from_row(schema: &Schema, row: &Row) -> Self {
        let mut fields = row.fields.clone();
        if let Some(entity) = schema.entity(row.entity) {
            fields.remove(&entity.primary_key);
        }
        Self {
            model: schema.name(row.entity).to_string(),
            pk: row.pk.clone(),
            fields,
        }
    }
}

/// Write records to `path` atomically.
///
/// Data goes to a temporary file next to `path` that replaces it only once
/// everything has been written. `indent` applies to JSON; 0 is compact.
pub fn write_snapshot(
    path: &Path,
    format: SnapshotFormat,
    indent: usize,
    records: &[SnapshotRecord],
) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;

    let compression = Compression::from_path(path);
    let writer = compression.encode(BufWriter::new(tmp.as_file()), |w| {
        serialize(w, format, indent, records)
    })?;
    writer
        .into_inner()
        .map_err(|e| e.into_error())
        .context("Failed to flush snapshot")?;

    tmp.persist(path)
        .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
    Ok(())
}

fn serialize(
    w: &mut dyn Write,
    format: SnapshotFormat,
    indent: usize,
    records: &[SnapshotRecord],
) -> Result<()> {
    match format {
        SnapshotFormat::Json if indent == 0 => serde_json::to_writer(&mut *w, records)?,
        SnapshotFormat::Json => {
            let spaces = " ".repeat(indent);
            let formatter = serde_json::ser::PrettyFormatter::with_indent(spaces.as_bytes());
            let mut ser = serde_json::Serializer::with_formatter(&mut *w, formatter);
            records.serialize(&mut ser)?;
        }
        SnapshotFormat::JsonLines => {
            for record in records {
                serde_json::to_writer(&mut *w, record)?;
                w.write_all(b"\n")?;
            }
        }
        SnapshotFormat::Yaml => serde_yaml::to_writer(&mut *w, records)?,
    }
    w.flush()?;
    Ok(())
}

/// Read a snapshot, detecting compression and format from the file name
pub fn read_snapshot(path: &Path) -> Result<Vec<SnapshotRecord>> {
    let format = SnapshotFormat::from_path(path)?;
    read_snapshot_as(path, format)
}

/// Read a snapshot in an explicit format
pub fn read_snapshot_as(path: &Path, format: SnapshotFormat) -> Result<Vec<SnapshotRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open snapshot: {}", path.display()))?;
    let reader = Compression::from_path(path).wrap_reader(Box::new(file))?;
    let mut reader = BufReader::new(reader);

    let records: Vec<SnapshotRecord> = match format {
        SnapshotFormat::Json => serde_json::from_reader(reader)?,
        SnapshotFormat::JsonLines => {
            let mut records = Vec::new();
            let mut line = String::new();
            let mut line_no = 0;
            while reader.read_line(&mut line)? > 0 {
                line_no += 1;
                if !line.trim().is_empty() {
                    records.push(
                        serde_json::from_str(&line)
                            .with_context(|| format!("Invalid record on line {}", line_no))?,
                    );
                }
                line.clear();
            }
            records
        }
        SnapshotFormat::Yaml => {
            let mut content = String::new();
            reader.read_to_string(&mut content)?;
            serde_yaml::from_str(&content)?
        }
    };

    Ok(records)
}
