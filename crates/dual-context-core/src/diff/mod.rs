//! Dual-context diff extraction.
//!
//! For every commit two views are rendered:
//!
//! - the **standard diff** (parent → commit), i.e. what the commit changed;
//! - the **full diff** (commit → branch tip), restricted to the files the
//!   commit touched, i.e. what happened to that change afterwards.
//!
//! Binary files and paths matched by the [`IgnorePolicy`] are dropped before
//! either view is rendered. A commit whose filtered file set is empty is
//! marked as skipped and never reaches the reasoning backend.

pub mod ignore;
pub mod truncate;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use ignore::{IgnorePolicy, IgnoreRules};
pub use truncate::{truncate_diff, DEFAULT_MAX_DIFF_BYTES, TRUNCATION_MARKER};

use crate::commit::Commit;
use crate::error::{AnalysisError, Result};
use crate::repo::{FilePatch, RepositoryReader};

/// Substituted for an empty full diff.
pub const NO_FURTHER_CHANGES: &str = "No further changes to these files since this commit.";

/// Both diff views for one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffContext {
    pub commit: Commit,
    pub standard_diff: String,
    pub full_diff: String,
    /// Paths that survived filtering, in diff order.
    pub touched_files: Vec<String>,
    pub skipped: bool,
}

impl DiffContext {
    fn skipped(commit: Commit) -> Self {
        Self {
            commit,
            standard_diff: String::new(),
            full_diff: String::new(),
            touched_files: Vec::new(),
            skipped: true,
        }
    }
}

/// Renders the two diff views for a commit.
#[derive(Debug, Clone)]
pub struct DiffExtractor {
    policy: IgnorePolicy,
    max_diff_bytes: usize,
}

impl Default for DiffExtractor {
    fn default() -> Self {
        Self::new(IgnorePolicy::default(), DEFAULT_MAX_DIFF_BYTES)
    }
}

impl DiffExtractor {
    /// Extractor that drops paths matched by `policy` and caps each diff
    /// at `max_diff_bytes`.
    pub fn new(policy: IgnorePolicy, max_diff_bytes: usize) -> Self {
        Self {
            policy,
            max_diff_bytes,
        }
    }

    /// The ignore policy applied to touched files.
    pub fn policy(&self) -> &IgnorePolicy {
        &self.policy
    }

    fn keep(&self, patch: &FilePatch) -> bool {
        !patch.binary && !self.policy.is_ignored(&patch.path)
    }

    /// Extract both views of `commit` relative to `tip`.
    pub fn extract(
        &self,
        repo: &dyn RepositoryReader,
        commit: &Commit,
        tip: &Commit,
    ) -> Result<DiffContext> {
        let standard = repo
            .tree_diff(commit.first_parent(), &commit.id)
            .map_err(|e| AnalysisError::extraction(commit.short_id(), e))?;

        let kept: Vec<&FilePatch> = standard.iter().filter(|p| self.keep(p)).collect();
        if kept.is_empty() {
            debug!(commit = %commit.short_id(), "no relevant files after filtering");
            return Ok(DiffContext::skipped(commit.clone()));
        }

        let touched_files: Vec<String> = kept.iter().map(|p| p.path.clone()).collect();
        let standard_diff = render(&kept, None);

        let touched: BTreeSet<&str> = touched_files.iter().map(String::as_str).collect();
        let evolution = repo
            .tree_diff(Some(&commit.id), &tip.id)
            .map_err(|e| AnalysisError::extraction(commit.short_id(), e))?;
        let scoped: Vec<&FilePatch> = evolution
            .iter()
            .filter(|p| !p.binary && touched.contains(p.path.as_str()) && p.has_changes())
            .collect();
        let full_diff = if scoped.is_empty() {
            NO_FURTHER_CHANGES.to_string()
        } else {
            render(&scoped, Some("(evolution to tip)"))
        };

        Ok(DiffContext {
            commit: commit.clone(),
            standard_diff: truncate_diff(&standard_diff, self.max_diff_bytes),
            full_diff: truncate_diff(&full_diff, self.max_diff_bytes),
            touched_files,
            skipped: false,
        })
    }
}

/// Render patches as `--- path` headers followed by prefixed lines.
pub fn render(patches: &[&FilePatch], header_suffix: Option<&str>) -> String {
    let mut out = String::new();
    for patch in patches {
        out.push_str("--- ");
        out.push_str(&patch.path);
        if let Some(suffix) = header_suffix {
            out.push(' ');
            out.push_str(suffix);
        }
        out.push('\n');
        for line in patch.hunks.iter().flat_map(|h| h.lines.iter()) {
            out.push(line.op.prefix());
            out.push_str(&line.content);
            out.push('\n');
        }
    }
    out
}
