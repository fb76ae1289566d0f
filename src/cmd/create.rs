//! Create command CLI handler.

use anyhow::Context;
use devdb::cache::PlanCache;
use devdb::sample::{ConfigPolicy, SamplerConfig, Sampler};
use devdb::snapshot::{write_snapshot, SnapshotFormat, SnapshotRecord};
use devdb::store::{Catalog, DuckDbStore};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct CreateArgs {
    pub database: PathBuf,
    pub output: PathBuf,
    pub format: Option<String>,
    pub indent: usize,
    pub limit: Option<usize>,
    pub clear_cache: bool,
    pub config: Option<PathBuf>,
    pub progress: bool,
}

pub fn run(args: CreateArgs) -> anyhow::Result<()> {
    let total = Instant::now();

    // Reject bad formats before touching the database
    let format = match &args.format {
        Some(f) => f.parse::<SnapshotFormat>()?,
        None => SnapshotFormat::from_path(&args.output)?,
    };
    info!("serializing using {} and indent {}", format, args.indent);

    let config = match &args.config {
        Some(path) => SamplerConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => SamplerConfig::default(),
    };

    let store = DuckDbStore::open(&args.database)?;
    let cache = open_cache(&args.database, &config, args.clear_cache);
    let policy = ConfigPolicy::new(config);
    let sampler = Sampler::new(&store, &policy, cache.as_ref())?;

    let planned = sampler.plan().len();
    let planned = args.limit.map_or(planned, |limit| limit.min(planned));
    let progress_bar = if args.progress {
        let pb = ProgressBar::new(planned as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            )?
            .progress_chars("█▓▒░  "),
        );
        Some(pb)
    } else {
        None
    };
    let report = |entity: &str| {
        if let Some(pb) = &progress_bar {
            pb.set_message(entity.to_string());
            pb.inc(1);
        }
    };

    let output = sampler.run_with_progress(args.limit, &report)?;
    if let Some(pb) = &progress_bar {
        pb.finish_and_clear();
    }

    info!("serializing data with format {} (this can take a while)", format);
    let start = Instant::now();
    let schema = store.schema();
    let records: Vec<SnapshotRecord> = output
        .rows
        .iter()
        .map(|row| SnapshotRecord::from_row(schema, row))
        .collect();
    write_snapshot(&args.output, format, args.indent, &records)?;
    info!(
        "serialized {} rows to {} in {:?}",
        records.len(),
        args.output.display(),
        start.elapsed()
    );
    info!("total time {:?}", total.elapsed());

    if args.progress {
        let stats = &output.stats;
        eprintln!();
        eprintln!("Sample Statistics:");
        eprintln!("  Entities sampled: {}", stats.entities);
        eprintln!("  Seed rows: {}", stats.seed_rows);
        eprintln!("  Rows collected: {}", stats.collected_rows);
        eprintln!("  Extra rows: {}", stats.extra_rows);
        eprintln!("  Duplicates removed: {}", stats.duplicates);
        eprintln!();
        for entity in &stats.entity_stats {
            eprintln!("  {:<40} {:>8}", entity.name, entity.rows);
        }
    }

    Ok(())
}

/// Open the plan cache for a database; a cache that cannot be opened only
/// disables caching.
fn open_cache(database: &Path, config: &SamplerConfig, clear: bool) -> Option<PlanCache> {
    let source = database
        .canonicalize()
        .unwrap_or_else(|_| database.to_path_buf())
        .display()
        .to_string();

    let cache = match PlanCache::new(source, Duration::from_secs(config.plan_ttl_secs)) {
        Ok(cache) => cache,
        Err(e) => {
            warn!("plan cache disabled: {:#}", e);
            return None;
        }
    };

    if clear {
        match cache.clear_all() {
            Ok(n) => info!("cleared {} cached plans", n),
            Err(e) => warn!("could not clear plan cache: {:#}", e),
        }
    }

    Some(cache)
}
