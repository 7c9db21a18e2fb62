use serde::Serialize;

#[derive(Default, Clone, Debug)]
pub struct ReaderStats {
    pub reader: usize,
    pub files: u64,
    pub records: u64,
    pub bytes: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug)]
pub struct WorkerStats {
    pub worker: usize,
    pub batches: u64,
    pub records: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug)]
pub struct ReducerStats {
    pub partials: u64,
    pub keys: u64,
    pub observations: u64,
    pub wall_ms: u64,
}

/// Summary of one run, logged on completion and printable as JSON.
#[derive(Default, Clone, Debug, Serialize)]
pub struct RunStats {
    pub method: String,
    pub files: u64,
    pub records: u64,
    pub bytes: u64,
    pub batches: u64,
    pub partials: u64,
    pub keys: u64,
    pub readers: usize,
    pub workers: usize,
    pub min_reader_ms: u64,
    pub max_reader_ms: u64,
    pub wall_ms: u64,
}

impl RunStats {
    pub fn record_readers(&mut self, per_reader: &[ReaderStats]) {
        if per_reader.is_empty() { return; }
        self.readers = per_reader.len();
        self.files = per_reader.iter().map(|r| r.files).sum();
        self.records = per_reader.iter().map(|r| r.records).sum();
        self.bytes = per_reader.iter().map(|r| r.bytes).sum();
        self.min_reader_ms = per_reader.iter().map(|r| r.wall_ms).min().unwrap_or(0);
        self.max_reader_ms = per_reader.iter().map(|r| r.wall_ms).max().unwrap_or(0);
    }

    pub fn record_workers(&mut self, per_worker: &[WorkerStats]) {
        self.workers = per_worker.len();
        self.batches = per_worker.iter().map(|w| w.batches).sum();
    }

    pub fn record_reducer(&mut self, reducer: &ReducerStats) {
        self.partials = reducer.partials;
        self.keys = reducer.keys;
    }
}
