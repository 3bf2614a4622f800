//! git-dual-context core library
//!
//! Ranks recent commits by how likely each one is to have introduced a
//! reported defect. Every commit is shown to a reasoning backend twice: as its
//! own change against its parent, and as the later evolution of the same files
//! up to the branch tip.

pub mod commit;
pub mod config;
pub mod diff;
pub mod error;
pub mod fakes;
pub mod obs;
pub mod orchestrator;
pub mod prompt;
pub mod reasoning;
pub mod repo;
pub mod retry;
pub mod summary;
pub mod telemetry;
pub mod validate;
pub mod verdict;

pub use commit::{truncate_message, Commit, CommitSelector, Selection};
pub use config::{AnalysisConfig, ConfigError, ConfigOverrides, OutputFormat};
pub use diff::{DiffContext, DiffExtractor, IgnorePolicy, IgnoreRules};
pub use error::{AnalysisError, OutcomeError, OutcomeErrorKind, Result};
pub use orchestrator::{
    AnalysisOutcome, ExtractionSlot, OrchestratorConfig, OutcomeResult, ResultSink,
    TwoPhaseOrchestrator,
};
pub use prompt::PromptBuilder;
pub use reasoning::{ReasoningClient, ReasoningError, ReasoningRequest};
pub use repo::{Checkout, GitRepository, RepoError, RepositoryReader};
pub use validate::RepoSource;
pub use retry::{execute_with_retry, RetryError, RetryPolicy, Retryable};
pub use summary::{RunSummary, SummaryAggregator};
pub use telemetry::init_tracing;
pub use verdict::{parse_verdict, AnalysisVerdict, ParseError, Tier};
