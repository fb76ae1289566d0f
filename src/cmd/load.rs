//! Load command CLI handler.

use anyhow::Context;
use devdb::load::Loader;
use devdb::sample::SamplerConfig;
use devdb::snapshot::{read_snapshot_as, SnapshotFormat};
use devdb::store::{DuckDbStore, LoadMode};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

pub fn run(
    snapshot: PathBuf,
    database: PathBuf,
    format: Option<String>,
    force: bool,
    run_hooks: bool,
    config: Option<PathBuf>,
) -> anyhow::Result<()> {
    let start = Instant::now();

    let config = match &config {
        Some(path) => SamplerConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => SamplerConfig::default(),
    };
    let format = match &format {
        Some(f) => f.parse::<SnapshotFormat>()?,
        None => SnapshotFormat::from_path(&snapshot)?,
    };

    let records = read_snapshot_as(&snapshot, format)?;
    info!("read {} records from {}", records.len(), snapshot.display());

    if !force && !confirm(&database)? {
        info!("restore aborted, nothing was changed");
        return Ok(());
    }

    let mut store = DuckDbStore::open(&database)?;
    let mode = if run_hooks {
        for (entity, statements) in &config.load.hooks {
            store = store.with_hooks(entity, statements.clone())?;
        }
        LoadMode::Normal
    } else {
        LoadMode::Bulk
    };

    let stats = Loader::new(config.load.clear)
        .with_mode(mode)
        .restore(&mut store, records)?;

    info!(
        "restored {} rows into {} entities (cleared {}) in {:?}",
        stats.rows,
        stats.entities,
        stats.cleared.join(", "),
        start.elapsed()
    );
    Ok(())
}

fn confirm(database: &Path) -> anyhow::Result<bool> {
    let mut rl = DefaultEditor::new()?;
    let prompt = format!(
        "This replaces the data in {}. Continue? [y/N] ",
        database.display()
    );

    match rl.readline(&prompt) {
        Ok(line) => Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes")),
        Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
