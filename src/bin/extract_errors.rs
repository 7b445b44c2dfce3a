//! Error Extraction CLI
//!
//! Splits the non-matching records of a batch file into `{batch}.{index}.json`
//! files for replay in the native test harness.
//!
//! Usage:
//!   cargo run --bin extract_errors -- path/to/batch.json --out errors

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use algocmp_backend::{extract::extract_errors, logging::init_tracing};

#[derive(Parser, Debug)]
#[command(name = "extract_errors")]
#[command(about = "Write each non-matching comparison of a batch file to its own JSON file")]
struct Args {
    /// Batch file to split
    file: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "errors")]
    out: PathBuf,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    let written = extract_errors(&args.file, &args.out)?;
    println!("{}", written);
    Ok(())
}
