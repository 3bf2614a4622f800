//! In-memory test doubles for the reasoning boundary and the result sink.
//!
//! `ScriptedReasoningClient` answers by substring match on the prompt, which
//! lets a test decide each commit's fate from the text of its diff.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::{AnalysisOutcome, ResultSink};
use crate::reasoning::{ReasoningClient, ReasoningError, ReasoningRequest};
use crate::summary::RunSummary;

/// One scripted response.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Error(ReasoningError),
    /// Never answers; resolves to `Cancelled` once the token fires.
    Hang,
}

impl ScriptedReply {
    /// A well-formed verdict wrapped in a little prose.
    pub fn verdict(tier: &str, reasoning: &str) -> Self {
        Self::Text(format!(
            "Analysis complete.\n{{\"probability\": \"{tier}\", \"reasoning\": \"{reasoning}\"}}"
        ))
    }
}

// ---------------------------------------------------------------------------
// ScriptedReasoningClient
// ---------------------------------------------------------------------------

struct Rule {
    needle: String,
    delay: Option<Duration>,
    /// The last reply repeats once the queue is down to one entry.
    replies: VecDeque<ScriptedReply>,
    calls: usize,
}

/// [`ReasoningClient`] that replays scripted answers.
pub struct ScriptedReasoningClient {
    model: String,
    rules: Mutex<Vec<Rule>>,
    fallback: Option<ScriptedReply>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedReasoningClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            rules: Mutex::new(Vec::new()),
            fallback: None,
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Answer prompts containing `needle` with `replies`, in order.
    pub fn on(self, needle: impl Into<String>, replies: Vec<ScriptedReply>) -> Self {
        self.push_rule(needle.into(), None, replies)
    }

    pub fn on_delayed(
        self,
        needle: impl Into<String>,
        delay: Duration,
        replies: Vec<ScriptedReply>,
    ) -> Self {
        self.push_rule(needle.into(), Some(delay), replies)
    }

    /// Used when no rule matches.
    pub fn with_fallback(mut self, reply: ScriptedReply) -> Self {
        self.fallback = Some(reply);
        self
    }

    /// Delay applied to every call without a rule-specific delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push_rule(self, needle: String, delay: Option<Duration>, replies: Vec<ScriptedReply>) -> Self {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Rule {
                needle,
                delay,
                replies: replies.into(),
                calls: 0,
            });
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls answered by the rule registered for `needle`.
    pub fn calls_for(&self, needle: &str) -> usize {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.needle == needle)
            .map_or(0, |r| r.calls)
    }

    /// Highest number of concurrent calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, prompt: &str) -> (Option<Duration>, Option<ScriptedReply>) {
        let mut rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        match rules.iter_mut().find(|r| prompt.contains(&r.needle)) {
            Some(rule) => {
                rule.calls += 1;
                let reply = if rule.replies.len() > 1 {
                    rule.replies.pop_front()
                } else {
                    rule.replies.front().cloned()
                };
                (rule.delay.or(self.delay), reply)
            }
            None => (self.delay, self.fallback.clone()),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReasoningClient for ScriptedReasoningClient {
    async fn complete(
        &self,
        request: &ReasoningRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ReasoningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let (delay, reply) = self.next_reply(&request.prompt);
        if let Some(delay) = delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ReasoningError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        match reply {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Error(err)) => Err(err),
            Some(ScriptedReply::Hang) => {
                cancel.cancelled().await;
                Err(ReasoningError::Cancelled)
            }
            None => Err(ReasoningError::Other("no scripted reply for prompt".into())),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// [`ResultSink`] that records everything it receives.
///
/// Clones share storage, so keep one handle and box the other.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    outcomes: Arc<Mutex<Vec<AnalysisOutcome>>>,
    summary: Arc<Mutex<Option<RunSummary>>>,
}

impl MemorySink {
    pub fn outcomes(&self) -> Vec<AnalysisOutcome> {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn summary(&self) -> Option<RunSummary> {
        self.summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ResultSink for MemorySink {
    fn accept(&mut self, outcome: &AnalysisOutcome) -> io::Result<()> {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(outcome.clone());
        Ok(())
    }

    fn finish(&mut self, summary: &RunSummary) -> io::Result<()> {
        *self.summary.lock().unwrap_or_else(PoisonError::into_inner) = Some(summary.clone());
        Ok(())
    }
}
