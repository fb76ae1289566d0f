mod create;
mod load;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "devdb")]
#[command(version)]
#[command(
    about = "Create small, referentially consistent development snapshots of a database",
    long_about = None
)]
pub struct Cli {
    /// More log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sample the database into a snapshot file
    Create {
        /// DuckDB database to sample from
        #[arg(short, long)]
        database: PathBuf,

        /// Output file; .gz, .bz2, .xz and .zst are compressed
        #[arg(short, long, default_value = "development_data.json.gz")]
        output: PathBuf,

        /// Serialization format: json, jsonl, yaml (default: guessed from the output name)
        #[arg(short, long)]
        format: Option<String>,

        /// Indentation of JSON output (0 for compact)
        #[arg(long, default_value_t = 4)]
        indent: usize,

        /// Only sample the first N entities of the plan
        #[arg(short, long)]
        limit: Option<usize>,

        /// Discard cached sampling plans before running
        #[arg(long)]
        clear_cache: bool,

        /// YAML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Show progress during sampling
        #[arg(short, long)]
        progress: bool,
    },

    /// Restore a snapshot into a development database
    Load {
        /// Snapshot file created by `devdb create`
        #[arg(default_value = "development_data.json.gz")]
        snapshot: PathBuf,

        /// DuckDB database to restore into
        #[arg(short, long)]
        database: PathBuf,

        /// Serialization format (default: guessed from the snapshot name)
        #[arg(short, long)]
        format: Option<String>,

        /// Do not ask for confirmation
        #[arg(long)]
        force: bool,

        /// Run the configured row-creation hooks for restored rows
        #[arg(long)]
        run_hooks: bool,

        /// YAML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    init_logging(cli.verbose, cli.quiet)?;

    match cli.command {
        Commands::Create {
            database,
            output,
            format,
            indent,
            limit,
            clear_cache,
            config,
            progress,
        } => create::run(create::CreateArgs {
            database,
            output,
            format,
            indent,
            limit,
            clear_cache,
            config,
            progress,
        }),
        Commands::Load {
            snapshot,
            database,
            format,
            force,
            run_hooks,
            config,
        } => load::run(snapshot, database, format, force, run_hooks, config),
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "devdb", &mut io::stdout());
            Ok(())
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) -> anyhow::Result<()> {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))
}
