//! File-loading stage.
//!
//! Reader threads pull file indices from a shared cursor, load each file as a
//! [`Batch`] and push it onto the intake channel. The first load failure
//! aborts the whole group: it is recorded in the group's [`EndGate`] and no
//! reader starts another file. The last reader to exit closes the intake
//! channel with one marker per worker.

use crate::api::Batch;
use crate::channel::{send_closers, EndGate, StageSender, StreamItem};
use crate::io::{load_batch, Schema};
use crate::stats::ReaderStats;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, warn};

pub struct ReaderStage<'a> {
    files: &'a [PathBuf],
    schema: &'a Schema,
    cursor: AtomicUsize,
    abort: AtomicBool,
    gate: EndGate,
    consumers: usize,
}

impl<'a> ReaderStage<'a> {
    /// `readers` threads will call [`run`](Self::run); `consumers` is the
    /// number of workers on the other side of the intake channel.
    pub fn new(files: &'a [PathBuf], schema: &'a Schema, readers: usize, consumers: usize) -> Self {
        Self {
            files,
            schema,
            cursor: AtomicUsize::new(0),
            abort: AtomicBool::new(false),
            gate: EndGate::new(readers),
            consumers,
        }
    }

    pub fn run(&self, reader: usize, intake: StageSender<Batch>) -> ReaderStats {
        let start = Instant::now();
        let mut stats = ReaderStats { reader, ..Default::default() };
        debug!(reader, "reader starting");

        while !self.abort.load(Ordering::Acquire) {
            let idx = self.cursor.fetch_add(1, Ordering::Relaxed);
            let Some(path) = self.files.get(idx) else { break };
            match load_batch(path, self.schema) {
                Ok(batch) => {
                    stats.files += 1;
                    stats.records += batch.len() as u64;
                    stats.bytes += batch.bytes;
                    if intake.send(StreamItem::Payload(batch)).is_err() {
                        // Every worker is gone; downstream already owns the outcome.
                        self.abort.store(true, Ordering::Release);
                        break;
                    }
                }
                Err(e) => {
                    warn!(reader, path = %path.display(), kind = e.kind(), "load failed: {}", e);
                    self.gate.fail(e);
                    self.abort.store(true, Ordering::Release);
                    break;
                }
            }
        }

        if let Some(closer) = self.gate.arrive() {
            let sent = send_closers(&intake, &closer, self.consumers);
            debug!(reader, failed = closer.is_failure(), markers = sent, "intake closed");
        }
        stats.wall_ms = start.elapsed().as_millis() as u64;
        debug!(reader, files = stats.files, records = stats.records, wall_ms = stats.wall_ms, "reader done");
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::stage_channel;
    use crate::error::PipelineError;
    use std::fs;
    use std::thread;
    use tempfile::TempDir;

    fn write_files(dir: &TempDir, contents: &[&str]) -> Vec<PathBuf> {
        contents
            .iter()
            .enumerate()
            .map(|(i, body)| {
                let p = dir.path().join(format!("f{i:03}.csv"));
                fs::write(&p, body).unwrap();
                p
            })
            .collect()
    }

    #[test]
    fn test_readers_send_every_batch_then_one_marker_per_worker() {
        let dir = TempDir::new().unwrap();
        let body = "city_code,temperature\nLAX,1\nJFK,2\n";
        let files = write_files(&dir, &[body; 5]);
        let schema = Schema::default();
        let stage = ReaderStage::new(&files, &schema, 3, 2);
        let (tx, rx) = stage_channel(16);

        let stats: Vec<ReaderStats> = thread::scope(|s| {
            let handles: Vec<_> = (0..3)
                .map(|r| {
                    let tx = tx.clone();
                    let stage = &stage;
                    s.spawn(move || stage.run(r, tx))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        drop(tx);

        let items: Vec<_> = rx.iter().collect();
        let batches = items.iter().filter(|i| matches!(i, StreamItem::Payload(_))).count();
        let eos = items.iter().filter(|i| matches!(i, StreamItem::EndOfStream)).count();
        assert_eq!((batches, eos, items.len()), (5, 2, 7));
        assert!(matches!(items.last(), Some(StreamItem::EndOfStream)));
        assert_eq!(stats.iter().map(|s| s.files).sum::<u64>(), 5);
        assert_eq!(stats.iter().map(|s| s.records).sum::<u64>(), 10);
        assert_eq!(stats.iter().map(|s| s.bytes).sum::<u64>(), 5 * body.len() as u64);
    }

    #[test]
    fn test_parse_failure_closes_with_failure_markers() {
        let dir = TempDir::new().unwrap();
        let files = write_files(&dir, &["city_code,temperature\nLAX,1\n", "city_code,temperature\nLAX,oops\n"]);
        let schema = Schema::default();
        let stage = ReaderStage::new(&files, &schema, 1, 3);
        let (tx, rx) = stage_channel(16);
        stage.run(0, tx);

        let items: Vec<_> = rx.iter().collect();
        let failures = items.iter().filter(|i| matches!(i, StreamItem::Failure(PipelineError::Parse { .. }))).count();
        assert_eq!(failures, 3);
        assert!(!items.iter().any(|i| matches!(i, StreamItem::EndOfStream)));
        // Only the fully parsed first file made it through.
        assert_eq!(items.iter().filter(|i| matches!(i, StreamItem::Payload(_))).count(), 1);
    }

    #[test]
    fn test_no_files_only_markers() {
        let schema = Schema::default();
        let stage = ReaderStage::new(&[], &schema, 2, 2);
        let (tx, rx) = stage_channel(4);
        thread::scope(|s| {
            for r in 0..2 {
                let tx = tx.clone();
                let stage = &stage;
                s.spawn(move || stage.run(r, tx));
            }
        });
        drop(tx);
        let items: Vec<_> = rx.iter().collect();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| matches!(i, StreamItem::EndOfStream)));
    }

    #[test]
    fn test_stops_when_workers_are_gone() {
        let dir = TempDir::new().unwrap();
        let files = write_files(&dir, &["city_code,temperature\nLAX,1\n"; 4]);
        let schema = Schema::default();
        let stage = ReaderStage::new(&files, &schema, 1, 1);
        let (tx, rx) = stage_channel(1);
        drop(rx);
        let stats = stage.run(0, tx);
        assert_eq!(stats.files, 1);
    }
}
