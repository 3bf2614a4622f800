//! Two-phase analysis of a commit range.
//!
//! Phase 1 extracts diff contexts strictly sequentially on the caller's
//! thread, because repository handles are not safe to share. Phase 2 fans the
//! owned contexts out to a bounded pool of reasoning workers. Completions are
//! put back into commit order by the ordering buffer and handed to a single
//! writer that owns the [`ResultSink`].
//!
//! Every commit that enters Phase 2 produces exactly one terminal
//! [`AnalysisOutcome`], including after cancellation.

mod ordering;
pub mod sink;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn, Instrument};

pub use sink::ResultSink;

use crate::commit::{Commit, CommitSelector};
use crate::config::MAX_WORKERS;
use crate::diff::{DiffContext, DiffExtractor};
use crate::error::{AnalysisError, OutcomeError, Result};
use crate::obs::{
    emit_commit_retry, emit_commit_stage, emit_run_cancelled, emit_run_finished,
    emit_run_started, new_run_id, RunSpan, Stage,
};
use crate::prompt::PromptBuilder;
use crate::reasoning::{ReasoningClient, ReasoningError, ReasoningRequest};
use crate::repo::RepositoryReader;
use crate::retry::{execute_with_retry, RetryPolicy};
use crate::summary::RunSummary;
use crate::verdict::{parse_verdict, AnalysisVerdict, Tier};

use ordering::OrderingBuffer;
use sink::SinkWriter;

/// Terminal result for one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum OutcomeResult {
    Verdict(AnalysisVerdict),
    Skipped,
    Failed(OutcomeError),
}

/// What the sink receives for each commit, in commit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisOutcome {
    /// Position in the selected commit list.
    pub index: usize,
    pub commit_id: String,
    pub short_id: String,
    /// First line of the commit message, length-capped.
    pub message: String,
    pub result: OutcomeResult,
}

impl AnalysisOutcome {
    pub fn new(index: usize, commit: &Commit, message_max_len: usize, result: OutcomeResult) -> Self {
        Self {
            index,
            commit_id: commit.id.clone(),
            short_id: commit.short_id().to_string(),
            message: commit.summary(message_max_len),
            result,
        }
    }

    pub fn tier(&self) -> Option<Tier> {
        match &self.result {
            OutcomeResult::Verdict(v) => Some(v.tier),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.result, OutcomeResult::Skipped)
    }

    pub fn error(&self) -> Option<&OutcomeError> {
        match &self.result {
            OutcomeResult::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Phase 1 result for one commit.
#[derive(Debug)]
pub struct ExtractionSlot {
    pub commit: Commit,
    pub result: Result<DiffContext>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Concurrent reasoning calls, clamped to `1..=MAX_WORKERS`.
    pub workers: usize,
    /// Upper bound on a single reasoning call.
    pub call_timeout: Duration,
    /// Deadline for the whole of Phase 2.
    pub run_timeout: Option<Duration>,
    /// Time in-flight workers get after cancellation.
    pub shutdown_grace: Duration,
    pub retry: RetryPolicy,
    pub message_max_len: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: crate::config::DEFAULT_WORKERS,
            call_timeout: Duration::from_secs(300),
            run_timeout: None,
            shutdown_grace: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            message_max_len: 80,
        }
    }
}

/// Everything a Phase 2 task needs. Contains no repository state.
struct Worker {
    client: Arc<dyn ReasoningClient>,
    prompt: Arc<PromptBuilder>,
    retry: RetryPolicy,
    call_timeout: Duration,
    run_deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl Worker {
    /// Time allowed for the next attempt, `None` once the run deadline passed.
    fn attempt_budget(&self) -> Option<Duration> {
        match self.run_deadline {
            None => Some(self.call_timeout),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                (!remaining.is_zero()).then(|| remaining.min(self.call_timeout))
            }
        }
    }

    async fn attempt(
        &self,
        request: &ReasoningRequest,
        commit: &str,
        attempt: u32,
    ) -> Result<AnalysisVerdict> {
        if attempt > 0 {
            emit_commit_retry(commit, attempt);
        }
        let budget = self.attempt_budget().ok_or(AnalysisError::Cancelled)?;
        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(AnalysisError::Cancelled),
            r = tokio::time::timeout(budget, self.client.complete(request, &self.cancel)) => r,
        };
        let text = match response {
            Ok(reply) => reply?,
            Err(_elapsed) => return Err(ReasoningError::Timeout.into()),
        };
        Ok(parse_verdict(&text)?)
    }

    async fn analyze(&self, ctx: &DiffContext) -> Result<AnalysisVerdict> {
        let request = self.prompt.build(ctx);
        let commit = ctx.commit.short_id();
        execute_with_retry(&self.retry, &self.cancel, |attempt| {
            self.attempt(&request, commit, attempt)
        })
        .await
        .map_err(AnalysisError::from)
    }
}

/// Drives selection, extraction and bounded-parallel analysis.
pub struct TwoPhaseOrchestrator {
    client: Arc<dyn ReasoningClient>,
    prompt: Arc<PromptBuilder>,
    extractor: DiffExtractor,
    config: OrchestratorConfig,
}

impl TwoPhaseOrchestrator {
    pub fn new(
        client: Arc<dyn ReasoningClient>,
        prompt: PromptBuilder,
        extractor: DiffExtractor,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            client,
            prompt: Arc::new(prompt),
            extractor,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn worker_count(&self) -> usize {
        self.config.workers.clamp(1, MAX_WORKERS)
    }

    fn outcome(&self, index: usize, commit: &Commit, result: OutcomeResult) -> AnalysisOutcome {
        AnalysisOutcome::new(index, commit, self.config.message_max_len, result)
    }

    /// Select commits, extract their contexts, analyse them and report.
    ///
    /// Only failures before extraction starts are returned as `Err`; every
    /// per-commit failure becomes an outcome.
    pub async fn run(
        &self,
        repo: &dyn RepositoryReader,
        selector: &CommitSelector,
        branch: Option<&str>,
        sink: Box<dyn ResultSink>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let run_id = new_run_id();
        let slots = {
            let _span = RunSpan::enter(&run_id);
            let selection = selector.select(repo, branch)?;
            emit_run_started(
                &run_id,
                selection.commits.len(),
                self.worker_count(),
                self.client.model_name(),
            );
            for (index, commit) in selection.commits.iter().enumerate() {
                emit_commit_stage(index, commit.short_id(), Stage::Selected);
            }
            self.extract_all(repo, &selection.commits, &selection.tip, cancel)
        };

        let summary = self
            .analyze(slots, sink, cancel)
            .instrument(RunSpan::span(&run_id))
            .await;
        emit_run_finished(&run_id, &summary);
        Ok(summary)
    }

    /// Phase 1: extract every commit in order, on the calling thread.
    ///
    /// After cancellation the remaining commits are not extracted; their
    /// slots carry [`AnalysisError::Cancelled`].
    pub fn extract_all(
        &self,
        repo: &dyn RepositoryReader,
        commits: &[Commit],
        tip: &Commit,
        cancel: &CancellationToken,
    ) -> Vec<ExtractionSlot> {
        commits
            .iter()
            .enumerate()
            .map(|(index, commit)| {
                emit_commit_stage(index, commit.short_id(), Stage::ExtractionPending);
                let result = if cancel.is_cancelled() {
                    Err(AnalysisError::Cancelled)
                } else {
                    self.extractor.extract(repo, commit, tip)
                };
                match &result {
                    Ok(_) => emit_commit_stage(index, commit.short_id(), Stage::ExtractionDone),
                    Err(e) => {
                        warn!(commit = %commit.short_id(), error = %e, "extraction failed");
                        emit_commit_stage(index, commit.short_id(), Stage::ExtractionFailed);
                    }
                }
                ExtractionSlot {
                    commit: commit.clone(),
                    result,
                }
            })
            .collect()
    }

    /// Phase 2: analyse extracted contexts with bounded concurrency.
    #[instrument(skip_all, fields(commits = slots.len()))]
    pub async fn analyze(
        &self,
        slots: Vec<ExtractionSlot>,
        sink: Box<dyn ResultSink>,
        cancel: &CancellationToken,
    ) -> RunSummary {
        let started = Instant::now();
        let total = slots.len();
        let writer = SinkWriter::spawn(sink);
        let buffer = Arc::new(OrderingBuffer::new(total, writer.sender()));
        let commits: Vec<Commit> = slots.iter().map(|s| s.commit.clone()).collect();
        let semaphore = Arc::new(Semaphore::new(self.worker_count()));
        let run_deadline = self.config.run_timeout.map(|t| started + t);
        let max_len = self.config.message_max_len;

        let mut tasks = Vec::new();
        for (index, slot) in slots.into_iter().enumerate() {
            let ctx = match slot.result {
                Err(e) => {
                    let result = OutcomeResult::Failed(e.to_outcome_error());
                    buffer.submit(self.outcome(index, &slot.commit, result));
                    continue;
                }
                Ok(ctx) if ctx.skipped => {
                    buffer.submit(self.outcome(index, &slot.commit, OutcomeResult::Skipped));
                    continue;
                }
                Ok(ctx) => ctx,
            };

            emit_commit_stage(index, ctx.commit.short_id(), Stage::AnalysisPending);
            let worker = Worker {
                client: Arc::clone(&self.client),
                prompt: Arc::clone(&self.prompt),
                retry: self.config.retry,
                call_timeout: self.config.call_timeout,
                run_deadline,
                cancel: cancel.clone(),
            };
            let buffer = Arc::clone(&buffer);
            let semaphore = Arc::clone(&semaphore);

            tasks.push(tokio::spawn(async move {
                let permit = tokio::select! {
                    permit = semaphore.acquire_owned() => permit.ok(),
                    _ = worker.cancel.cancelled() => None,
                };
                let verdict = match permit {
                    Some(_permit) if !worker.cancel.is_cancelled() => worker.analyze(&ctx).await,
                    _ => Err(AnalysisError::Cancelled),
                };

                let short_id = ctx.commit.short_id();
                let result = match verdict {
                    Ok(v) => {
                        emit_commit_stage(index, short_id, Stage::AnalysisDone);
                        OutcomeResult::Verdict(v)
                    }
                    Err(e) => {
                        warn!(commit = %short_id, error = %e, "analysis failed");
                        emit_commit_stage(index, short_id, Stage::AnalysisFailed);
                        OutcomeResult::Failed(e.to_outcome_error())
                    }
                };
                buffer.submit(AnalysisOutcome::new(index, &ctx.commit, max_len, result));
            }));
        }

        let aborts: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();
        let mut all = Box::pin(join_all(tasks));
        tokio::select! {
            _ = &mut all => {}
            _ = cancel.cancelled() => {
                emit_run_cancelled(total.saturating_sub(buffer.emitted()));
                if tokio::time::timeout(self.config.shutdown_grace, &mut all).await.is_err() {
                    warn!(
                        grace_ms = self.config.shutdown_grace.as_millis() as u64,
                        "workers still running after grace period; aborting"
                    );
                    for abort in &aborts {
                        abort.abort();
                    }
                }
            }
        }

        for index in buffer.missing() {
            let result = OutcomeResult::Failed(AnalysisError::Cancelled.to_outcome_error());
            buffer.submit(self.outcome(index, &commits[index], result));
        }

        let aggregator = buffer.close();
        let summary = aggregator.finish(started.elapsed(), self.client.model_name());
        let failures = writer.finish(summary.clone()).await;
        if failures > 0 {
            warn!(failures = failures, "some results could not be written");
        }
        summary
    }
}
