use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tally::utils::timed;
use tally::{run_to_file, Method, PipelineConfig};
use tracing::{debug, info};

/// Times the concurrent pipeline against the sequential baseline on the same input.
#[derive(Parser, Debug)]
struct Args {
    /// Input directory of CSV files
    #[arg(long, default_value = "data")]
    input: PathBuf,
    /// Where each trial writes its averages
    #[arg(long, default_value = "averages.csv")]
    output: PathBuf,
    /// Per-trial results (method,execution_time)
    #[arg(long, default_value = "experiment_results.csv")]
    results: PathBuf,
    /// Number of timed trials
    #[arg(long, default_value_t = 200)]
    trials: usize,
    /// Seed for the per-trial method choice
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long)]
    readers: Option<usize>,
}

#[derive(Debug)]
struct Summary {
    count: usize,
    mean: f64,
    std: f64,
    min: f64,
    median: f64,
    max: f64,
}

impl Summary {
    fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() { return None; }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        // Sample standard deviation, matching pandas' describe().
        let std = if n > 1 {
            (sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
        } else {
            f64::NAN
        };
        let median = if n % 2 == 1 { sorted[n / 2] } else { (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0 };
        Some(Self { count: n, mean, std, min: sorted[0], median, max: sorted[n - 1] })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let mut config = PipelineConfig::from_env(&args.input);
    if let Some(n) = args.workers { config.workers = n; }
    if let Some(n) = args.readers { config.readers = n; }

    // Untimed run so both methods see a warm page cache.
    run_to_file(&config, Method::Baseline, &args.output).context("dry run")?;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut trials: Vec<(Method, f64)> = Vec::with_capacity(args.trials);
    for trial in 0..args.trials {
        let method = *Method::ALL.choose(&mut rng).unwrap_or(&Method::Pipeline);
        let (res, elapsed) = timed(|| run_to_file(&config, method, &args.output));
        res.with_context(|| format!("trial {trial} ({method})"))?;
        debug!(trial, method = %method, secs = elapsed.as_secs_f64(), "trial done");
        trials.push((method, elapsed.as_secs_f64()));
    }

    let mut w = BufWriter::new(File::create(&args.results).with_context(|| format!("create {}", args.results.display()))?);
    writeln!(w, "method,execution_time")?;
    for (method, secs) in &trials {
        writeln!(w, "{method},{secs}")?;
    }
    w.flush()?;
    info!(trials = trials.len(), results = %args.results.display(), "Experiment complete");

    let mut by_method: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for (method, secs) in &trials {
        by_method.entry(method.as_str()).or_default().push(*secs);
    }
    println!("Experiment results:");
    println!("{:<10} {:>6} {:>10} {:>10} {:>10} {:>10} {:>10}", "method", "count", "mean", "std", "min", "50%", "max");
    for (method, samples) in &by_method {
        if let Some(s) = Summary::from_samples(samples) {
            println!(
                "{:<10} {:>6} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
                method, s.count, s.mean, s.std, s.min, s.median, s.max
            );
        }
    }
    Ok(())
}
