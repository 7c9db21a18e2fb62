use crate::api::{Batch, FinalAverage, PartialAggregate};
use crate::channel::stage_channel;
use crate::constants::{
    DEFAULT_CHANNEL_CAP, DEFAULT_PATTERN, ENV_ALLOW_EMPTY, ENV_CHANNEL_CAP, ENV_READERS, ENV_WORKERS,
    MAX_DEFAULT_READERS, READERS_PER_CORE,
};
use crate::error::{PipelineError, Result};
use crate::io::{list_input_files, write_averages, Schema};
use crate::reader::ReaderStage;
use crate::reducer::run_reducer;
use crate::stats::{RunStats, WorkerStats};
use crate::utils::{env_usize, env_var_truthy, fd_soft_limit};
use crate::worker::WorkerStage;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::Instant;
use tracing::{error, info};

/// What to do when no input file matches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EmptyInputPolicy {
    /// Return [`PipelineError::EmptyInput`] without starting any stage.
    #[default]
    Fail,
    /// Run the stages over zero batches and return an empty result.
    Empty,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    /// Glob matched against file names.
    pub pattern: String,
    pub recursive: bool,
    pub schema: Schema,
    /// I/O-bound reader threads.
    pub readers: usize,
    /// CPU-bound aggregation threads.
    pub workers: usize,
    pub channel_capacity: usize,
    pub empty_input: EmptyInputPolicy,
}

impl PipelineConfig {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        let cores = num_cpus::get().max(1);
        Self {
            input_dir: input_dir.into(),
            pattern: DEFAULT_PATTERN.to_string(),
            recursive: false,
            schema: Schema::default(),
            readers: (cores * READERS_PER_CORE).min(MAX_DEFAULT_READERS),
            workers: cores,
            channel_capacity: DEFAULT_CHANNEL_CAP,
            empty_input: EmptyInputPolicy::Fail,
        }
    }

    /// Defaults, overridden by `TALLY_*` environment variables when set.
    pub fn from_env(input_dir: impl Into<PathBuf>) -> Self {
        let mut cfg = Self::new(input_dir);
        if let Some(n) = env_usize(ENV_READERS) { cfg.readers = n; }
        if let Some(n) = env_usize(ENV_WORKERS) { cfg.workers = n; }
        if let Some(n) = env_usize(ENV_CHANNEL_CAP) { cfg.channel_capacity = n; }
        if env_var_truthy(ENV_ALLOW_EMPTY) { cfg.empty_input = EmptyInputPolicy::Empty; }
        cfg
    }

    pub fn with_readers(mut self, readers: usize) -> Self { self.readers = readers; self }
    pub fn with_workers(mut self, workers: usize) -> Self { self.workers = workers; self }
    pub fn with_channel_capacity(mut self, cap: usize) -> Self { self.channel_capacity = cap; self }
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self { self.pattern = pattern.into(); self }
    pub fn with_schema(mut self, schema: Schema) -> Self { self.schema = schema; self }
    pub fn with_recursive(mut self, recursive: bool) -> Self { self.recursive = recursive; self }
    pub fn with_empty_input(mut self, policy: EmptyInputPolicy) -> Self { self.empty_input = policy; self }

    pub fn validate(&self) -> Result<glob::Pattern> {
        let positive = |parameter: &'static str, v: usize| {
            if v == 0 {
                Err(PipelineError::InvalidConfig { parameter, reason: "must be >= 1".into() })
            } else {
                Ok(())
            }
        };
        positive("readers", self.readers)?;
        positive("workers", self.workers)?;
        positive("channel_capacity", self.channel_capacity)?;
        glob::Pattern::new(&self.pattern)
            .map_err(|e| PipelineError::InvalidConfig { parameter: "pattern", reason: e.to_string() })
    }

    /// Validates the config and lists its input files, applying the empty-input policy.
    pub(crate) fn resolve_inputs(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.validate()?;
        let files = list_input_files(&self.input_dir, &pattern, self.recursive)?;
        if files.is_empty() && self.empty_input == EmptyInputPolicy::Fail {
            return Err(PipelineError::EmptyInput { dir: self.input_dir.clone(), pattern: self.pattern.clone() });
        }
        Ok(files)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Pipeline,
    Baseline,
}

impl Method {
    pub const ALL: [Method; 2] = [Method::Pipeline, Method::Baseline];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Pipeline => "pipeline",
            Method::Baseline => "baseline",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pipeline" | "multithreading" => Ok(Method::Pipeline),
            "baseline" | "benchmark" => Ok(Method::Baseline),
            other => Err(format!("unknown method '{other}' (expected 'pipeline' or 'baseline')")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub averages: FinalAverage,
    pub stats: RunStats,
}

/// Runs the concurrent pipeline: readers → intake → workers → reduction → reducer.
///
/// Every stage runs in a scoped thread, so all of them have terminated by the
/// time this returns, whether the run succeeded or not.
pub fn run_pipeline(config: &PipelineConfig) -> Result<RunOutcome> {
    let start = Instant::now();
    let files = config.resolve_inputs()?;

    let fd_limit = fd_soft_limit();
    let mut readers = config.readers.min(files.len().max(1));
    if let Some(limit) = fd_limit {
        readers = readers.min(((limit / 2) as usize).max(1));
    }
    let workers = config.workers;
    info!(
        input = %config.input_dir.display(), files = files.len(), readers, workers,
        channel_capacity = config.channel_capacity, fd_soft_limit = fd_limit.unwrap_or(0),
        "Pipeline starting"
    );

    let (intake_tx, intake_rx) = stage_channel::<Batch>(config.channel_capacity);
    let (reduction_tx, reduction_rx) = stage_channel::<PartialAggregate>(config.channel_capacity);
    let reader_stage = ReaderStage::new(&files, &config.schema, readers, workers);
    let worker_stage = WorkerStage::new(workers);

    let (reduced, reader_stats, worker_stats, panicked) = thread::scope(|s| {
        let spawn_failed = |stage: &str, e: std::io::Error| PipelineError::protocol(format!("failed to spawn {stage}: {e}"));

        let reducer = thread::Builder::new()
            .name("tally-reducer".into())
            .spawn_scoped(s, move || run_reducer(reduction_rx))
            .map_err(|e| spawn_failed("reducer", e));

        let mut worker_handles = Vec::with_capacity(workers);
        let mut spawn_error = None;
        for w in 0..workers {
            let (rx, tx, stage) = (intake_rx.clone(), reduction_tx.clone(), &worker_stage);
            match thread::Builder::new().name(format!("tally-worker-{w}")).spawn_scoped(s, move || stage.run(w, rx, tx)) {
                Ok(h) => worker_handles.push(h),
                Err(e) => { spawn_error.get_or_insert(spawn_failed("worker", e)); }
            }
        }
        drop(intake_rx);
        drop(reduction_tx);

        let mut reader_handles = Vec::with_capacity(readers);
        for r in 0..readers {
            let (tx, stage) = (intake_tx.clone(), &reader_stage);
            match thread::Builder::new().name(format!("tally-reader-{r}")).spawn_scoped(s, move || stage.run(r, tx)) {
                Ok(h) => reader_handles.push(h),
                Err(e) => { spawn_error.get_or_insert(spawn_failed("reader", e)); }
            }
        }
        drop(intake_tx);

        let mut panicked: Vec<String> = Vec::new();
        let reader_stats: Vec<_> = reader_handles
            .into_iter()
            .enumerate()
            .filter_map(|(r, h)| h.join().map_err(|_| panicked.push(format!("reader {r}"))).ok())
            .collect();
        let worker_stats: Vec<WorkerStats> = worker_handles
            .into_iter()
            .enumerate()
            .filter_map(|(w, h)| h.join().map_err(|_| panicked.push(format!("worker {w}"))).ok())
            .collect();
        let reduced = match reducer {
            Ok(h) => h.join().unwrap_or_else(|_| {
                panicked.push("reducer".into());
                Err(PipelineError::protocol("reducer thread panicked"))
            }),
            Err(e) => Err(e),
        };
        let reduced = match spawn_error {
            Some(e) => reduced.and(Err(e)),
            None => reduced,
        };
        (reduced, reader_stats, worker_stats, panicked)
    });

    let (averages, reducer_stats) = match (reduced, panicked.is_empty()) {
        (Err(e), _) => {
            error!(kind = e.kind(), "Pipeline failed: {}", e);
            return Err(e);
        }
        (Ok(_), false) => {
            let e = PipelineError::protocol(format!("stage thread panicked: {}", panicked.join(", ")));
            error!("{}", e);
            return Err(e);
        }
        (Ok(out), true) => out,
    };

    let mut stats = RunStats { method: Method::Pipeline.to_string(), ..Default::default() };
    stats.record_readers(&reader_stats);
    stats.record_workers(&worker_stats);
    stats.record_reducer(&reducer_stats);
    stats.wall_ms = start.elapsed().as_millis() as u64;
    info!(
        phase = "pipeline", files = stats.files, records = stats.records, batches = stats.batches,
        partials = stats.partials, keys = stats.keys, min_reader_ms = stats.min_reader_ms,
        max_reader_ms = stats.max_reader_ms, wall_ms = stats.wall_ms,
        "Pipeline complete"
    );
    Ok(RunOutcome { averages, stats })
}

pub fn compute_averages(config: &PipelineConfig, method: Method) -> Result<RunOutcome> {
    match method {
        Method::Pipeline => run_pipeline(config),
        Method::Baseline => crate::baseline::run_baseline(config),
    }
}

/// Computes the averages and, only if that succeeded, writes them to `output`.
///
/// This is the unit of work the experiment harness times.
pub fn run_to_file(config: &PipelineConfig, method: Method, output: &Path) -> Result<RunOutcome> {
    let outcome = compute_averages(config, method)?;
    write_averages(output, &outcome.averages)?;
    info!(output = %output.display(), keys = outcome.averages.len(), method = %method, "Averages written");
    Ok(outcome)
}
