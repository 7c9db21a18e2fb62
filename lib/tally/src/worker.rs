//! Partial-aggregation stage.
//!
//! Workers share the intake channel. Each one receives exactly one closing
//! marker from the readers and then arrives at the worker [`EndGate`]; the
//! last worker to arrive forwards the single closing marker the reducer sees.

use crate::api::{Batch, PartialAggregate};
use crate::channel::{Closer, EndGate, StageReceiver, StageSender, StreamItem};
use crate::error::PipelineError;
use crate::stats::WorkerStats;
use std::time::Instant;
use tracing::{debug, error};

pub struct WorkerStage {
    gate: EndGate,
}

impl WorkerStage {
    pub fn new(workers: usize) -> Self { Self { gate: EndGate::new(workers) } }

    pub fn run(&self, worker: usize, intake: StageReceiver<Batch>, reduction: StageSender<PartialAggregate>) -> WorkerStats {
        let start = Instant::now();
        let mut stats = WorkerStats { worker, ..Default::default() };
        debug!(worker, "worker starting");

        loop {
            match intake.recv() {
                Ok(StreamItem::Payload(batch)) => {
                    stats.batches += 1;
                    stats.records += batch.len() as u64;
                    let partial = PartialAggregate::from_batch(&batch);
                    drop(batch);
                    if reduction.send(StreamItem::Payload(partial)).is_err() {
                        // Reducer is gone; it already returned the outcome.
                        debug!(worker, "reduction channel closed, stopping");
                        break;
                    }
                }
                Ok(StreamItem::EndOfStream) => break,
                Ok(StreamItem::Failure(e)) => {
                    self.gate.fail(e);
                    break;
                }
                Err(_) => {
                    let e = PipelineError::protocol("intake channel closed without an end-of-stream marker");
                    error!(worker, "{}", e);
                    self.gate.fail(e);
                    break;
                }
            }
        }

        if let Some(closer) = self.gate.arrive() {
            let closer = match (closer, intake.try_recv()) {
                (Closer::EndOfStream, Ok(leftover)) => {
                    let what = match leftover {
                        StreamItem::Payload(_) => "a batch",
                        StreamItem::EndOfStream => "an extra end-of-stream marker",
                        StreamItem::Failure(_) => "an extra failure marker",
                    };
                    let e = PipelineError::protocol(format!("intake still held {what} after every worker closed"));
                    error!(worker, "{}", e);
                    Closer::Failure(e)
                }
                (closer, _) => closer,
            };
            debug!(worker, failed = closer.is_failure(), "forwarding closing marker to reducer");
            let _ = reduction.send(closer.into_item());
        }
        stats.wall_ms = start.elapsed().as_millis() as u64;
        debug!(worker, batches = stats.batches, wall_ms = stats.wall_ms, "worker done");
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{KeySummary, Record};
    use crate::channel::stage_channel;
    use std::thread;

    fn batch(key: &str, values: &[f64]) -> Batch {
        Batch::new("mem.csv", values.iter().map(|&v| Record::new(key, v)).collect())
    }

    fn run_workers(workers: usize, items: Vec<StreamItem<Batch>>) -> Vec<StreamItem<PartialAggregate>> {
        let (in_tx, in_rx) = stage_channel(items.len().max(1));
        for item in items { in_tx.send(item).unwrap(); }
        drop(in_tx);
        let (out_tx, out_rx) = stage_channel(64);
        let stage = WorkerStage::new(workers);
        thread::scope(|s| {
            for w in 0..workers {
                let (in_rx, out_tx, stage) = (in_rx.clone(), out_tx.clone(), &stage);
                s.spawn(move || stage.run(w, in_rx, out_tx));
            }
        });
        drop(out_tx);
        out_rx.iter().collect()
    }

    #[test]
    fn test_single_worker_aggregates_each_batch() {
        let out = run_workers(1, vec![
            StreamItem::Payload(batch("LAX", &[10.0, 20.0])),
            StreamItem::Payload(batch("JFK", &[5.0])),
            StreamItem::EndOfStream,
        ]);
        assert_eq!(out.len(), 3);
        match &out[0] {
            StreamItem::Payload(p) => assert_eq!(p.get("LAX"), Some(KeySummary { sum: 30.0, count: 2 })),
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(matches!(out[2], StreamItem::EndOfStream));
    }

    #[test]
    fn test_many_workers_forward_exactly_one_marker() {
        let mut items: Vec<_> = (0..20).map(|i| StreamItem::Payload(batch("ORD", &[i as f64]))).collect();
        items.extend((0..4).map(|_| StreamItem::EndOfStream));
        let out = run_workers(4, items);
        let partials = out.iter().filter(|i| matches!(i, StreamItem::Payload(_))).count();
        let markers = out.iter().filter(|i| !matches!(i, StreamItem::Payload(_))).count();
        assert_eq!((partials, markers), (20, 1));
        assert!(matches!(out.last(), Some(StreamItem::EndOfStream)));
    }

    #[test]
    fn test_failure_is_forwarded_once() {
        let err = PipelineError::parse("bad.csv", 2, "invalid number");
        let out = run_workers(3, (0..3).map(|_| StreamItem::Failure(err.clone())).collect());
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], StreamItem::Failure(PipelineError::Parse { line: 2, .. })));
    }

    #[test]
    fn test_missing_marker_is_a_protocol_violation() {
        let out = run_workers(2, vec![StreamItem::Payload(batch("LAX", &[1.0])), StreamItem::EndOfStream]);
        assert!(matches!(out.last(), Some(StreamItem::Failure(PipelineError::ProtocolViolation(_)))));
    }

    #[test]
    fn test_extra_marker_is_a_protocol_violation() {
        let out = run_workers(1, vec![StreamItem::EndOfStream, StreamItem::EndOfStream]);
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], StreamItem::Failure(PipelineError::ProtocolViolation(_))));
    }
}
