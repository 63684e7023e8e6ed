//! komet CLI tool
//!
//! Command-line interface for resolving versions with komet-core.
//!
//! ## Commands
//!
//! - `resolve <scenario>`: apply a scenario to a store and print the outcome of each query
//! - `compare <scenario>`: apply a scenario, then compare two points from a destination
//! - `stats`: open a store and print registry counts
//!
//! Every command opens its store from a `komet.toml` (see [StoreConfig]). Without one, the store
//! is in memory and discarded on exit. With a `data_dir`, the store is restored from and synced
//! back to that directory.

use clap::{Parser, Subcommand, ValueEnum};
use komet_core::{
    config::{ConfigProvider, StoreConfig, TomlConfigProvider, CONFIG_FILE_NAME},
    coordinate::{StampCoordinate, StampPrecedence},
    scenario::{parse_point, Scenario},
    store::TerminologyStore,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "komet")]
#[command(author, version, about = "Resolve component versions across branching paths", long_about = None)]
struct Cli {
    /// Verbose logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Precedence {
    Time,
    Path,
}

impl From<Precedence> for StampPrecedence {
    fn from(value: Precedence) -> Self {
        match value {
            Precedence::Time => StampPrecedence::Time,
            Precedence::Path => StampPrecedence::Path,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a scenario and print the latest version for each of its queries
    Resolve {
        /// Scenario TOML file
        scenario: PathBuf,

        /// Store configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Apply a scenario and compare two points as seen from a destination
    Compare {
        /// Scenario TOML file
        scenario: PathBuf,

        /// Destination, as `path` or `path:time`
        #[arg(long)]
        at: String,

        /// First point, as `path:time`
        #[arg(long)]
        left: String,

        /// Second point, as `path:time`
        #[arg(long)]
        right: String,

        #[arg(long, value_enum, default_value_t = Precedence::Path)]
        precedence: Precedence,

        /// Store configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Open a store and print registry counts
    Stats {
        /// Store configuration file
        #[arg(short, long, default_value = CONFIG_FILE_NAME)]
        config: PathBuf,
    },
}

fn open_store(config: Option<PathBuf>) -> Result<TerminologyStore, Box<dyn std::error::Error>> {
    let config = match config {
        Some(path) => TomlConfigProvider::new(path).load()?,
        None => StoreConfig::in_memory(),
    };
    Ok(TerminologyStore::open(config)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Resolve { scenario, config } => {
            let store = open_store(config)?;
            let scenario = Scenario::load(&scenario)?;
            scenario.apply(&store)?;
            let outcomes = scenario.evaluate(&store)?;
            for outcome in &outcomes {
                println!("{outcome}");
            }
            let contradicted = outcomes.iter().filter(|o| o.is_contradicted()).count();
            if contradicted > 0 {
                println!("{contradicted} of {} queries are contradicted", outcomes.len());
            }
            runtime.block_on(store.shutdown())?;
            Ok(())
        }

        Commands::Compare {
            scenario,
            at,
            left,
            right,
            precedence,
            config,
        } => {
            let store = open_store(config)?;
            Scenario::load(&scenario)?.apply(&store)?;
            let coordinate =
                StampCoordinate::new(parse_point(&store, &at)?).with_precedence(precedence.into());
            let (left, right) = (parse_point(&store, &left)?, parse_point(&store, &right)?);
            let segments = store
                .positions()
                .segment_map(coordinate.position, store.paths())?;
            let position = segments.relative_position(coordinate.precedence, left, right);
            println!("{left} is {position} {right} from {coordinate}");
            runtime.block_on(store.shutdown())?;
            Ok(())
        }

        Commands::Stats { config } => {
            let store = open_store(Some(config))?;
            let stats = store.stats();
            println!("nids:            {}", stats.nids);
            println!("stamps:          {}", stats.stamps);
            println!("pending stamps:  {}", stats.pending_stamps);
            println!("paths:           {}", stats.paths);
            println!("chronologies:    {}", stats.chronologies);
            println!("versions:        {}", stats.versions);
            Ok(())
        }
    }
}
