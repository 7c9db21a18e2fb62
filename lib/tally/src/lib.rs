pub mod api;
pub mod baseline;
pub mod channel;
pub mod constants;
pub mod error;
pub mod io;
pub mod reader;
pub mod reducer;
pub mod runtime;
pub mod stats;
pub mod synth;
pub mod utils;
pub mod worker;

pub use api::{Batch, FinalAverage, KeyAverage, KeySummary, PartialAggregate, Record};
pub use baseline::run_baseline;
pub use channel::{Closer, EndGate, StreamItem};
pub use error::{PipelineError, Result};
pub use io::{write_averages, Schema};
pub use runtime::{compute_averages, run_pipeline, run_to_file, EmptyInputPolicy, Method, PipelineConfig, RunOutcome};
pub use stats::RunStats;
