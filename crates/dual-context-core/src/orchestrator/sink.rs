//! Result sinks and the single writer that owns one.

use std::io;

use std::thread;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use super::AnalysisOutcome;
use crate::summary::RunSummary;

/// Destination for finalized outcomes.
///
/// Calls arrive in commit order from a single writer thread, so
/// implementations need no locking of their own.
pub trait ResultSink: Send {
    fn accept(&mut self, outcome: &AnalysisOutcome) -> io::Result<()>;

    /// Called once, after the last outcome.
    fn finish(&mut self, _summary: &RunSummary) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) enum WriterMessage {
    Outcome(AnalysisOutcome),
    Summary(RunSummary),
}

/// Owns the sink on a dedicated OS thread and drains one queue into it.
///
/// Not on the runtime's blocking pool: a paused clock must keep advancing
/// while the writer waits.
pub(crate) struct SinkWriter {
    tx: mpsc::UnboundedSender<WriterMessage>,
    done: oneshot::Receiver<usize>,
}

impl SinkWriter {
    pub(crate) fn spawn(mut sink: Box<dyn ResultSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (done_tx, done) = oneshot::channel();
        let spawned = thread::Builder::new()
            .name("result-writer".into())
            .spawn(move || {
                let mut failures = 0usize;
                while let Some(message) = rx.blocking_recv() {
                    let (result, last) = match &message {
                        WriterMessage::Outcome(outcome) => (sink.accept(outcome), false),
                        WriterMessage::Summary(summary) => (sink.finish(summary), true),
                    };
                    if let Err(e) = result {
                        failures += 1;
                        warn!(event = "sink.write_failed", error = %e);
                    }
                    if last {
                        break;
                    }
                }
                let _ = done_tx.send(failures);
            });
        if let Err(e) = spawned {
            // done_tx went down with the closure; finish() reports one failure.
            warn!(event = "sink.spawn_failed", error = %e);
        }
        Self { tx, done }
    }

    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<WriterMessage> {
        self.tx.clone()
    }

    /// Deliver the summary and wait for the writer to drain.
    /// Returns the number of failed sink writes.
    pub(crate) async fn finish(self, summary: RunSummary) -> usize {
        if self.tx.send(WriterMessage::Summary(summary)).is_err() {
            warn!(event = "sink.closed", "result writer stopped before the summary");
        }
        drop(self.tx);
        match self.done.await {
            Ok(failures) => failures,
            Err(_) => {
                warn!(event = "sink.panicked", "result writer exited without reporting");
                1
            }
        }
    }
}
