//! Reorders out-of-order completions back into commit order.
//!
//! Insertion, draining of the consecutive run, counter updates and hand-off to
//! the writer queue all happen inside one critical section. Two outcomes can
//! therefore never be forwarded out of order, and the counters always match
//! what has been emitted.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use super::sink::WriterMessage;
use super::AnalysisOutcome;
use crate::obs::{emit_commit_stage, Stage};
use crate::summary::SummaryAggregator;

struct Inner {
    pending: BTreeMap<usize, AnalysisOutcome>,
    next: usize,
    closed: bool,
    aggregator: SummaryAggregator,
    tx: UnboundedSender<WriterMessage>,
}

pub(crate) struct OrderingBuffer {
    total: usize,
    inner: Mutex<Inner>,
}

impl OrderingBuffer {
    pub(crate) fn new(total: usize, tx: UnboundedSender<WriterMessage>) -> Self {
        Self {
            total,
            inner: Mutex::new(Inner {
                pending: BTreeMap::new(),
                next: 0,
                closed: false,
                aggregator: SummaryAggregator::default(),
                tx,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accept a terminal outcome. Late, duplicate or out-of-range outcomes
    /// are dropped and `false` is returned.
    pub(crate) fn submit(&self, outcome: AnalysisOutcome) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let index = outcome.index;
        if inner.closed
            || index < inner.next
            || index >= self.total
            || inner.pending.contains_key(&index)
        {
            debug!(index = index, "dropping late or duplicate outcome");
            return false;
        }
        inner.pending.insert(index, outcome);

        while let Some(ready) = inner.pending.remove(&inner.next) {
            inner.aggregator.record(&ready.result);
            emit_commit_stage(ready.index, &ready.short_id, Stage::Finalized);
            if inner.tx.send(WriterMessage::Outcome(ready)).is_err() {
                warn!(event = "sink.closed", "result writer is gone; outcome dropped");
            }
            inner.next += 1;
        }
        true
    }

    /// Number of outcomes forwarded so far.
    pub(crate) fn emitted(&self) -> usize {
        self.lock().next
    }

    /// Indices that have not been submitted yet.
    pub(crate) fn missing(&self) -> Vec<usize> {
        let inner = self.lock();
        (inner.next..self.total)
            .filter(|i| !inner.pending.contains_key(i))
            .collect()
    }

    /// Refuse further submissions and return the final counters.
    pub(crate) fn close(&self) -> SummaryAggregator {
        let mut inner = self.lock();
        inner.closed = true;
        if !inner.pending.is_empty() {
            warn!(
                held = inner.pending.len(),
                "closing ordering buffer with outcomes still held back"
            );
        }
        inner.aggregator.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::OutcomeResult;
    use tokio::sync::mpsc;

    fn outcome(index: usize) -> AnalysisOutcome {
        AnalysisOutcome {
            index,
            commit_id: format!("{index:040}"),
            short_id: format!("{index:08}"),
            message: String::new(),
            result: OutcomeResult::Skipped,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<WriterMessage>) -> Vec<usize> {
        let mut seen = Vec::new();
        while let Ok(WriterMessage::Outcome(o)) = rx.try_recv() {
            seen.push(o.index);
        }
        seen
    }

    #[test]
    fn test_reverse_submission_emits_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let buffer = OrderingBuffer::new(4, tx);

        for i in [3, 2, 1] {
            assert!(buffer.submit(outcome(i)));
        }
        assert!(drain(&mut rx).is_empty());
        assert_eq!(buffer.emitted(), 0);

        assert!(buffer.submit(outcome(0)));
        assert_eq!(drain(&mut rx), vec![0, 1, 2, 3]);
        assert_eq!(buffer.close().total(), 4);
    }

    #[test]
    fn test_duplicates_and_late_outcomes_dropped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let buffer = OrderingBuffer::new(3, tx);

        assert!(buffer.submit(outcome(0)));
        assert!(!buffer.submit(outcome(0)));
        assert!(buffer.submit(outcome(2)));
        assert!(!buffer.submit(outcome(2)));
        assert!(!buffer.submit(outcome(7)));
        assert_eq!(buffer.missing(), vec![1]);

        let agg = buffer.close();
        assert!(!buffer.submit(outcome(1)));
        assert_eq!(agg.total(), 1);
        assert_eq!(drain(&mut rx), vec![0]);
    }
}
