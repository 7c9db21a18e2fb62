use crate::api::PartialAggregate;
use crate::error::Result;
use crate::io::load_batch;
use crate::runtime::{Method, PipelineConfig, RunOutcome};
use crate::stats::RunStats;
use std::time::Instant;
use tracing::{debug, info};

/// Sequential reference implementation: load, aggregate and merge one file
/// at a time on the calling thread. Same inputs, validation, empty-input
/// policy and errors as [`run_pipeline`](crate::runtime::run_pipeline).
pub fn run_baseline(config: &PipelineConfig) -> Result<RunOutcome> {
    let start = Instant::now();
    let files = config.resolve_inputs()?;
    info!(input = %config.input_dir.display(), files = files.len(), "Baseline starting");

    let mut stats = RunStats { method: Method::Baseline.to_string(), readers: 1, workers: 1, ..Default::default() };
    let mut table = PartialAggregate::new();
    for path in &files {
        let batch = load_batch(path, &config.schema)?;
        stats.files += 1;
        stats.batches += 1;
        stats.records += batch.len() as u64;
        stats.bytes += batch.bytes;
        table.merge(PartialAggregate::from_batch(&batch));
        stats.partials += 1;
        debug!(path = %path.display(), records = batch.len(), "baseline merged file");
    }

    stats.keys = table.len() as u64;
    let averages = table.finalize();
    stats.wall_ms = start.elapsed().as_millis() as u64;
    info!(phase = "baseline", files = stats.files, records = stats.records, keys = stats.keys, wall_ms = stats.wall_ms, "Baseline complete");
    Ok(RunOutcome { averages, stats })
}
