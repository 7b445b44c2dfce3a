//! Comparison File Statistics
//!
//! Error and timing statistics straight from the downloaded batch tree, no
//! database needed.
//!
//! Usage:
//!   cargo run --bin comparison_file_stats -- --days 7
//!   cargo run --bin comparison_file_stats -- --dir ./downloaded_files/trio-oref-validation/algorithm-comparisons

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

use algocmp_backend::{
    collect_file_stats, logging::init_tracing, report::render_file_stats, DayWindow,
    PipelineConfig,
};

#[derive(Parser, Debug)]
#[command(name = "comparison_file_stats")]
#[command(about = "Error and timing statistics over the dated comparison tree")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dated comparisons directory (defaults to {data_root}/{project}/algorithm-comparisons)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Number of trailing days to process
    #[arg(long)]
    days: Option<u32>,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = PipelineConfig::load(args.config.as_deref())?;
    let dir = args.dir.unwrap_or_else(|| config.comparisons_dir());
    let days = args.days.unwrap_or(config.days);

    if !dir.is_dir() {
        bail!(
            "Download directory not found at {}; run the downloader first",
            dir.display()
        );
    }

    let stats = collect_file_stats(&dir, &DayWindow::ending_today(days));
    print!("{}", render_file_stats(&stats));
    Ok(())
}
