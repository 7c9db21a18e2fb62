use crate::api::{FinalAverage, PartialAggregate};
use crate::channel::{StageReceiver, StreamItem};
use crate::error::{PipelineError, Result};
use crate::stats::ReducerStats;
use std::time::Instant;
use tracing::{debug, error};

/// Final-reduction stage: merges every partial into a private table and
/// derives the averages once the stream ends cleanly.
///
/// On a `Failure` marker, or if the channel disconnects without any marker,
/// the table is discarded and an error is returned instead.
pub fn run_reducer(reduction: StageReceiver<PartialAggregate>) -> Result<(FinalAverage, ReducerStats)> {
    let start = Instant::now();
    let mut stats = ReducerStats::default();
    let mut table = PartialAggregate::new();

    loop {
        match reduction.recv() {
            Ok(StreamItem::Payload(partial)) => {
                stats.partials += 1;
                table.merge(partial);
            }
            Ok(StreamItem::EndOfStream) => break,
            Ok(StreamItem::Failure(e)) => {
                debug!(partials = stats.partials, kind = e.kind(), "reducer discarding partial table");
                return Err(e);
            }
            Err(_) => {
                let e = PipelineError::protocol("reduction channel closed without an end-of-stream marker");
                error!(partials = stats.partials, "{}", e);
                return Err(e);
            }
        }
    }

    stats.keys = table.len() as u64;
    stats.observations = table.observations();
    let averages = table.finalize();

    // Every worker has exited once the marker is sent; anything still
    // arriving means someone closed the stream twice.
    if let Ok(item) = reduction.recv() {
        let what = match item {
            StreamItem::Payload(_) => "a partial aggregate",
            StreamItem::EndOfStream => "a second end-of-stream marker",
            StreamItem::Failure(_) => "a failure marker",
        };
        let e = PipelineError::protocol(format!("reducer received {what} after end-of-stream"));
        error!("{}", e);
        return Err(e);
    }

    stats.wall_ms = start.elapsed().as_millis() as u64;
    debug!(partials = stats.partials, keys = stats.keys, wall_ms = stats.wall_ms, "reducer done");
    Ok((averages, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::stage_channel;

    fn partial(rows: &[(&str, f64)]) -> PartialAggregate {
        let mut p = PartialAggregate::new();
        for &(k, v) in rows { p.observe(k, v); }
        p
    }

    fn reduce(items: Vec<StreamItem<PartialAggregate>>) -> Result<(FinalAverage, ReducerStats)> {
        let (tx, rx) = stage_channel(items.len().max(1));
        for item in items { tx.send(item).unwrap(); }
        drop(tx);
        run_reducer(rx)
    }

    #[test]
    fn test_merges_and_sorts() {
        let (averages, stats) = reduce(vec![
            StreamItem::Payload(partial(&[("LAX", 10.0), ("LAX", 20.0)])),
            StreamItem::Payload(partial(&[("LAX", 30.0), ("JFK", 5.0)])),
            StreamItem::EndOfStream,
        ])
        .unwrap();
        assert_eq!(averages.get("LAX"), Some(20.0));
        assert_eq!(averages.get("JFK"), Some(5.0));
        assert_eq!(averages.rows()[0].key, "JFK");
        assert_eq!((stats.partials, stats.keys, stats.observations), (2, 2, 4));
    }

    #[test]
    fn test_end_of_stream_only_is_empty_result() {
        let (averages, _) = reduce(vec![StreamItem::EndOfStream]).unwrap();
        assert!(averages.is_empty());
    }

    #[test]
    fn test_failure_discards_table() {
        let err = reduce(vec![
            StreamItem::Payload(partial(&[("LAX", 1.0)])),
            StreamItem::Failure(PipelineError::parse("x.csv", 4, "bad")),
        ])
        .unwrap_err();
        assert!(matches!(err, PipelineError::Parse { line: 4, .. }));
    }

    #[test]
    fn test_disconnect_without_marker() {
        let err = reduce(vec![StreamItem::Payload(partial(&[("LAX", 1.0)]))]).unwrap_err();
        assert_eq!(err.kind(), "protocol-violation");
    }

    #[test]
    fn test_second_marker_is_rejected() {
        let err = reduce(vec![StreamItem::EndOfStream, StreamItem::EndOfStream]).unwrap_err();
        assert!(matches!(err, PipelineError::ProtocolViolation(ref m) if m.contains("second end-of-stream")));
    }
}
