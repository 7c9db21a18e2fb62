use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tally::synth::{generate_dataset, DEFAULT_FILES, DEFAULT_SAMPLES, DEFAULT_SEED};
use tracing::info;

#[derive(Parser, Debug)]
struct Args {
    /// Output directory for the generated CSV files
    #[arg(long, default_value = "data")]
    output: PathBuf,
    /// Number of samples per file
    #[arg(long, default_value_t = DEFAULT_SAMPLES)]
    n_samples: usize,
    /// Number of files to generate
    #[arg(long, default_value_t = DEFAULT_FILES)]
    n_files: usize,
    /// Seed for names and contents; the same seed yields the same dataset
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,
    /// Log every written file
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt().with_env_filter(if args.verbose { "debug" } else { "info" }).init();

    let paths = generate_dataset(&args.output, args.n_samples, args.n_files, args.seed)
        .with_context(|| format!("generating dataset in {}", args.output.display()))?;
    if args.verbose {
        for p in &paths {
            info!(path = %p.display(), samples = args.n_samples, "wrote file");
        }
    }
    info!(files = paths.len(), samples_per_file = args.n_samples, seed = args.seed, output = %args.output.display(), "Dataset generated");
    Ok(())
}
