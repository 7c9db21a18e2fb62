use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tally::{run_to_file, EmptyInputPolicy, Method, PipelineConfig, Schema};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// Input directory of CSV files
    #[arg(long)]
    input: PathBuf,
    /// Output CSV file (key,average)
    #[arg(long, default_value = "averages.csv")]
    output: PathBuf,
    /// Aggregation worker threads (defaults to the core count, or TALLY_WORKERS)
    #[arg(long)]
    workers: Option<usize>,
    /// File reader threads (defaults to 2x cores capped at 32, or TALLY_READERS)
    #[arg(long)]
    readers: Option<usize>,
    /// Items buffered per channel (or TALLY_CHANNEL_CAP)
    #[arg(long)]
    channel_capacity: Option<usize>,
    /// Glob matched against file names
    #[arg(long, default_value = tally::constants::DEFAULT_PATTERN)]
    pattern: String,
    /// Descend into subdirectories
    #[arg(long)]
    recursive: bool,
    #[arg(long, default_value = tally::constants::DEFAULT_KEY_COLUMN)]
    key_column: String,
    #[arg(long, default_value = tally::constants::DEFAULT_VALUE_COLUMN)]
    value_column: String,
    /// `pipeline` (concurrent) or `baseline` (sequential)
    #[arg(long, default_value = "pipeline")]
    method: Method,
    /// Treat an input directory without matching files as an empty result instead of an error
    #[arg(long)]
    allow_empty: bool,
    /// Print run statistics as JSON on stdout
    #[arg(long)]
    stats_json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut config = PipelineConfig::from_env(&args.input)
        .with_pattern(args.pattern)
        .with_recursive(args.recursive)
        .with_schema(Schema::new(args.key_column, args.value_column));
    if let Some(n) = args.workers { config.workers = n; }
    if let Some(n) = args.readers { config.readers = n; }
    if let Some(n) = args.channel_capacity { config.channel_capacity = n; }
    if args.allow_empty { config.empty_input = EmptyInputPolicy::Empty; }

    let outcome = run_to_file(&config, args.method, &args.output)
        .with_context(|| format!("computing averages from {}", args.input.display()))?;

    if args.stats_json {
        println!("{}", serde_json::to_string_pretty(&outcome.stats)?);
    }
    Ok(())
}
