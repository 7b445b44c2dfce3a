//! algocmp - algorithm comparison ingestion and reporting
//!
//! Usage:
//!   algocmp ingest                 # last N days of the downloaded tree
//!   algocmp ingest --all           # everything under the comparisons dir
//!   algocmp ingest --root DIR      # an arbitrary tree
//!   algocmp report [--json]        # statistics over the store
//!   algocmp run                    # ingest the window, then report
//!
//! Environment: ALGOCMP_DB_PATH, ALGOCMP_DATA_ROOT, ALGOCMP_PROJECT,
//! ALGOCMP_DAYS, ALGOCMP_WORKERS, ALGOCMP_TOP_DIFFERENCES, RUST_LOG

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use algocmp_backend::{
    logging::init_tracing,
    report::{render_ingest_summary, render_store_report},
    ComparisonStore, DayWindow, Ingestor, PipelineConfig, StoreReport,
};

#[derive(Parser, Debug)]
#[command(name = "algocmp")]
#[command(about = "Load JS/Swift algorithm comparison batches into SQLite and report divergences")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Trailing day window
    #[arg(long, global = true)]
    days: Option<u32>,

    /// Ingestion threads
    #[arg(long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load batch files into the store
    Ingest {
        /// Ingest every JSON file under this directory instead of the dated tree
        #[arg(long)]
        root: Option<PathBuf>,

        /// Ingest all days, not only the trailing window
        #[arg(long, conflicts_with = "root")]
        all: bool,
    },

    /// Print statistics over the store
    Report {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Ingest the trailing window, then report
    Run,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(days) = cli.days {
        config.days = days;
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }

    let store = ComparisonStore::open(&config.db_path)?;
    let window = DayWindow::ending_today(config.days);

    match cli.command {
        Commands::Ingest { root, all } => {
            let ingestor = Ingestor::new(store, &config);
            let summary = match (root, all) {
                (Some(root), _) => ingestor.ingest_tree(&root)?,
                (None, true) => ingestor.ingest_tree(&config.comparisons_dir())?,
                (None, false) => ingestor.ingest_window(&config.comparisons_dir(), &window)?,
            };
            print!("{}", render_ingest_summary(&summary));
        }
        Commands::Report { json } => {
            let report = StoreReport::collect(&store, config.top_differences)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", render_store_report(&report));
            }
        }
        Commands::Run => {
            info!(
                "Processing the last {} days from {}",
                config.days,
                config.comparisons_dir().display()
            );
            let ingestor = Ingestor::new(store, &config);
            let (summary, report) = ingestor.run(&config.comparisons_dir(), &window)?;
            print!("{}", render_ingest_summary(&summary));
            print!("{}", render_store_report(&report));
        }
    }

    Ok(())
}
