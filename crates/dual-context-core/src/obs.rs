//! Structured lifecycle events for an analysis run.
//!
//! All events carry an `event` field so log pipelines can filter on it:
//! `run.started`, `commit.stage`, `commit.retry`, `run.cancelled` and
//! `run.finished`.

use tracing::{debug, info, warn};

use crate::summary::RunSummary;

/// Lifecycle position of a single commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Selected,
    ExtractionPending,
    ExtractionDone,
    ExtractionFailed,
    AnalysisPending,
    AnalysisDone,
    AnalysisFailed,
    Finalized,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Selected => "selected",
            Stage::ExtractionPending => "extraction_pending",
            Stage::ExtractionDone => "extraction_done",
            Stage::ExtractionFailed => "extraction_failed",
            Stage::AnalysisPending => "analysis_pending",
            Stage::AnalysisDone => "analysis_done",
            Stage::AnalysisFailed => "analysis_failed",
            Stage::Finalized => "finalized",
        }
    }
}

/// RAII guard that enters a run-scoped span.
///
/// ```ignore
/// let _span = RunSpan::enter(&run_id);
/// // every event below is tagged with run_id
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        Self {
            _span: Self::span(run_id).entered(),
        }
    }

    /// The span itself, for instrumenting futures that cross await points.
    pub fn span(run_id: &str) -> tracing::Span {
        tracing::info_span!("dual_context.run", run_id = %run_id)
    }
}

/// Fresh identifier for a run.
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn emit_run_started(run_id: &str, commits: usize, workers: usize, model: &str) {
    info!(
        event = "run.started",
        run_id = %run_id,
        commits = commits,
        workers = workers,
        model = %model,
    );
}

pub fn emit_commit_stage(index: usize, commit: &str, stage: Stage) {
    debug!(
        event = "commit.stage",
        index = index,
        commit = %commit,
        stage = stage.as_str(),
    );
}

pub fn emit_commit_retry(commit: &str, attempt: u32) {
    warn!(event = "commit.retry", commit = %commit, attempt = attempt);
}

/// Emit event: cancellation observed, with how many commits were still open.
pub fn emit_run_cancelled(outstanding: usize) {
    warn!(event = "run.cancelled", outstanding = outstanding);
}

pub fn emit_run_finished(run_id: &str, summary: &RunSummary) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        total = summary.total,
        high = summary.high,
        medium = summary.medium,
        low = summary.low,
        skipped = summary.skipped,
        errors = summary.errors,
        elapsed_ms = summary.elapsed.as_millis() as u64,
    );
}
