//! Stage-to-stage handoff and the end-of-stream protocol.
//!
//! Stages talk over bounded crossbeam channels of [`StreamItem`]. A stream
//! ends with exactly one closing marker per consumer: [`StreamItem::EndOfStream`]
//! when every producer finished cleanly, [`StreamItem::Failure`] otherwise.
//!
//! Producers that share a channel share an [`EndGate`]. Each producer arrives
//! at the gate once when it exits; the last one to arrive is elected to send
//! the closing markers, so the number of markers never depends on how many
//! payload items were sent or on which producer finished first.

use crate::error::PipelineError;
use crossbeam_channel as channel;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub type StageSender<T> = channel::Sender<StreamItem<T>>;
pub type StageReceiver<T> = channel::Receiver<StreamItem<T>>;

#[derive(Debug)]
pub enum StreamItem<T> {
    Payload(T),
    EndOfStream,
    Failure(PipelineError),
}

/// Bounded channel between two stages. Senders block when it is full.
pub fn stage_channel<T>(capacity: usize) -> (StageSender<T>, StageReceiver<T>) {
    channel::bounded(capacity)
}

/// The marker that ends one consumer's stream.
#[derive(Debug, Clone)]
pub enum Closer {
    EndOfStream,
    Failure(PipelineError),
}

impl Closer {
    pub fn into_item<T>(self) -> StreamItem<T> {
        match self {
            Closer::EndOfStream => StreamItem::EndOfStream,
            Closer::Failure(e) => StreamItem::Failure(e),
        }
    }

    pub fn is_failure(&self) -> bool { matches!(self, Closer::Failure(_)) }
}

/// Sends `copies` closing markers, one per downstream consumer. Stops early
/// if every receiver is gone; returns how many were delivered.
pub fn send_closers<T>(tx: &StageSender<T>, closer: &Closer, copies: usize) -> usize {
    let mut sent = 0;
    for _ in 0..copies {
        if tx.send(closer.clone().into_item()).is_err() { break; }
        sent += 1;
    }
    sent
}

/// Countdown shared by one producer group.
pub struct EndGate {
    remaining: AtomicUsize,
    failure: Mutex<Option<PipelineError>>,
}

impl EndGate {
    pub fn new(producers: usize) -> Self {
        Self { remaining: AtomicUsize::new(producers), failure: Mutex::new(None) }
    }

    /// Records a failure for the group. Only the first one is kept; returns
    /// true if this call recorded it.
    pub fn fail(&self, err: PipelineError) -> bool {
        let mut slot = self.failure.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_some() { return false; }
        *slot = Some(err);
        true
    }

    pub fn is_failed(&self) -> bool {
        self.failure.lock().unwrap_or_else(|p| p.into_inner()).is_some()
    }

    /// Marks one producer as finished. Returns the group's closer to the last
    /// producer to arrive and `None` to every other one.
    ///
    /// Arriving more times than there are producers is a protocol violation
    /// and yields a failure closer.
    pub fn arrive(&self) -> Option<Closer> {
        let prev = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match prev {
            Ok(1) => {
                let slot = self.failure.lock().unwrap_or_else(|p| p.into_inner());
                Some(match slot.as_ref() {
                    Some(err) => Closer::Failure(err.clone()),
                    None => Closer::EndOfStream,
                })
            }
            Ok(_) => None,
            Err(_) => Some(Closer::Failure(PipelineError::protocol("producer arrived at a closed end gate"))),
        }
    }

    pub fn remaining(&self) -> usize { self.remaining.load(Ordering::Acquire) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_last_arrival_is_elected_once() {
        let gate = EndGate::new(8);
        let elected = AtomicUsize::new(0);
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    if let Some(closer) = gate.arrive() {
                        assert!(!closer.is_failure());
                        elected.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });
        assert_eq!(elected.load(Ordering::SeqCst), 1);
        assert_eq!(gate.remaining(), 0);
    }

    #[test]
    fn test_first_failure_wins() {
        let gate = EndGate::new(2);
        assert!(gate.fail(PipelineError::protocol("first")));
        assert!(!gate.fail(PipelineError::protocol("second")));
        assert!(gate.arrive().is_none());
        match gate.arrive() {
            Some(Closer::Failure(PipelineError::ProtocolViolation(msg))) => assert_eq!(msg, "first"),
            other => panic!("unexpected closer: {other:?}"),
        }
    }

    #[test]
    fn test_extra_arrival_is_a_violation() {
        let gate = EndGate::new(1);
        assert!(matches!(gate.arrive(), Some(Closer::EndOfStream)));
        assert!(matches!(gate.arrive(), Some(Closer::Failure(PipelineError::ProtocolViolation(_)))));
    }

    #[test]
    fn test_send_closers_one_per_consumer() {
        let (tx, rx) = stage_channel::<u32>(4);
        assert_eq!(send_closers(&tx, &Closer::EndOfStream, 3), 3);
        drop(tx);
        let items: Vec<_> = rx.iter().collect();
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|i| matches!(i, StreamItem::EndOfStream)));
    }

    #[test]
    fn test_send_closers_stops_without_receivers() {
        let (tx, rx) = stage_channel::<u32>(1);
        drop(rx);
        assert_eq!(send_closers(&tx, &Closer::EndOfStream, 3), 0);
    }
}
