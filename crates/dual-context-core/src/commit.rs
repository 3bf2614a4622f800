//! Commit model and selection of the commits under investigation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MAX_COMMITS;
use crate::error::{AnalysisError, Result};
use crate::repo::RepositoryReader;

/// Number of hex characters shown for a commit.
pub const SHORT_ID_LEN: usize = 8;

/// Commits analysed when no count is given.
pub const DEFAULT_COMMIT_COUNT: usize = 5;

/// A single commit as read from the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Full hex object id.
    pub id: String,
    pub parents: Vec<String>,
    pub message: String,
    pub author: String,
    pub time: DateTime<Utc>,
}

impl Commit {
    pub fn short_id(&self) -> &str {
        self.id.get(..SHORT_ID_LEN).unwrap_or(&self.id)
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// Direct parent, `None` for a root commit.
    pub fn first_parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }

    /// First line of the message, capped at `max_len` characters.
    pub fn summary(&self, max_len: usize) -> String {
        truncate_message(&self.message, max_len)
    }
}

/// Keep the first line of `message` and cap it at `max_len` characters,
/// ending with `...` when cut.
pub fn truncate_message(message: &str, max_len: usize) -> String {
    let first_line = message.lines().next().unwrap_or_default().trim_end();
    if first_line.chars().count() <= max_len {
        return first_line.to_string();
    }
    if max_len <= 3 {
        return first_line.chars().take(max_len).collect();
    }
    let mut cut: String = first_line.chars().take(max_len - 3).collect();
    cut.push_str("...");
    cut
}

/// The tip the run is anchored to plus the commits to analyse, newest first.
#[derive(Debug, Clone)]
pub struct Selection {
    pub tip: Commit,
    pub commits: Vec<Commit>,
}

/// Walks history from a branch tip and picks the commits to analyse.
#[derive(Debug, Clone, Copy)]
pub struct CommitSelector {
    pub limit: usize,
    pub skip_merges: bool,
}

impl Default for CommitSelector {
    fn default() -> Self {
        Self {
            limit: DEFAULT_COMMIT_COUNT,
            skip_merges: true,
        }
    }
}

impl CommitSelector {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Resolve `branch` (or `HEAD`) and collect up to `limit` commits.
    ///
    /// Any repository failure here aborts the run.
    pub fn select(&self, repo: &dyn RepositoryReader, branch: Option<&str>) -> Result<Selection> {
        let tip = repo
            .resolve(branch)
            .map_err(|e| AnalysisError::Selection(e.to_string()))?;

        let mut commits = Vec::with_capacity(self.limit.min(MAX_COMMITS));
        if self.limit == 0 {
            return Ok(Selection { tip, commits });
        }

        let walk = repo
            .walk(&tip.id)
            .map_err(|e| AnalysisError::Selection(e.to_string()))?;
        for entry in walk {
            let commit = entry.map_err(|e| AnalysisError::Selection(e.to_string()))?;
            if self.skip_merges && commit.is_merge() {
                debug!(commit = %commit.short_id(), "skipping merge commit");
                continue;
            }
            commits.push(commit);
            if commits.len() >= self.limit {
                break;
            }
        }

        Ok(Selection { tip, commits })
    }
}
