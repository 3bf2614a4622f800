//! Read-only repository access.
//!
//! [`RepositoryReader`] is the only way the engine touches version control.
//! It is used from a single thread during extraction and is intentionally not
//! bound by `Sync`. [`GitRepository`] implements it on top of `git2`.

use std::path::Path;

use chrono::{TimeZone, Utc};
use git2::{DiffOptions, Oid, Patch, Repository, Sort};
use tempfile::TempDir;
use tracing::info;

use crate::commit::Commit;
use crate::validate::RepoSource;

/// Errors raised by a repository backend.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("reference not found: {0}")]
    RefNotFound(String),

    #[error("invalid object id: {0}")]
    InvalidId(String),

    #[error("failed to prepare clone directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Kind of a rendered diff line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOp {
    Context,
    Add,
    Delete,
}

impl LineOp {
    pub fn prefix(&self) -> char {
        match self {
            LineOp::Context => ' ',
            LineOp::Add => '+',
            LineOp::Delete => '-',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub op: LineOp,
    /// Line text without its trailing newline.
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hunk {
    pub lines: Vec<DiffLine>,
}

/// Changes to one file between two trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    pub path: String,
    pub binary: bool,
    pub hunks: Vec<Hunk>,
}

impl FilePatch {
    pub fn has_changes(&self) -> bool {
        self.hunks.iter().any(|h| !h.lines.is_empty())
    }
}

/// Iterator over commits in reverse chronological order.
pub type CommitWalk<'a> = Box<dyn Iterator<Item = Result<Commit, RepoError>> + 'a>;

/// Repository operations needed for selection and extraction.
pub trait RepositoryReader {
    /// Resolve a local branch name, or `HEAD` when `branch` is `None`.
    fn resolve(&self, branch: Option<&str>) -> Result<Commit, RepoError>;

    /// Walk history starting at (and including) commit `from`.
    fn walk(&self, from: &str) -> Result<CommitWalk<'_>, RepoError>;

    /// Diff the trees of two commits. `old = None` means the empty tree.
    fn tree_diff(&self, old: Option<&str>, new: &str) -> Result<Vec<FilePatch>, RepoError>;
}

/// [`RepositoryReader`] backed by a libgit2 handle.
pub struct GitRepository {
    repo: Repository,
}

impl GitRepository {
    /// Open the repository containing `path`, searching parent directories.
    pub fn open(path: &Path) -> Result<Self, RepoError> {
        let repo = Repository::discover(path)?;
        Ok(Self { repo })
    }

    /// Clone `url` into the empty directory `into` and open the result.
    pub fn clone_remote(url: &str, into: &Path) -> Result<Self, RepoError> {
        let repo = Repository::clone(url, into)?;
        Ok(Self { repo })
    }

    pub fn from_repository(repo: Repository) -> Self {
        Self { repo }
    }

    fn find_commit(&self, id: &str) -> Result<git2::Commit<'_>, RepoError> {
        let oid = Oid::from_str(id).map_err(|_| RepoError::InvalidId(id.to_string()))?;
        Ok(self.repo.find_commit(oid)?)
    }
}

/// An opened repository plus the temporary clone backing it, if any.
///
/// A remote clone is deleted when the checkout is dropped, so keep it alive
/// for the whole run.
pub struct Checkout {
    repo: GitRepository,
    clone_dir: Option<TempDir>,
}

impl Checkout {
    pub fn open(source: &RepoSource) -> Result<Self, RepoError> {
        match source {
            RepoSource::Local(path) => Ok(Self {
                repo: GitRepository::open(path)?,
                clone_dir: None,
            }),
            RepoSource::Remote(url) => {
                let dir = tempfile::Builder::new()
                    .prefix("git-dual-context-")
                    .tempdir()?;
                info!(event = "repo.cloning", url = %url, dir = %dir.path().display());
                let repo = GitRepository::clone_remote(url, dir.path())?;
                Ok(Self {
                    repo,
                    clone_dir: Some(dir),
                })
            }
        }
    }

    pub fn repository(&self) -> &GitRepository {
        &self.repo
    }

    /// Directory of the temporary clone, `None` for a local checkout.
    pub fn clone_dir(&self) -> Option<&Path> {
        self.clone_dir.as_ref().map(TempDir::path)
    }
}

fn to_commit(commit: &git2::Commit<'_>) -> Commit {
    let time = Utc
        .timestamp_opt(commit.time().seconds(), 0)
        .single()
        .unwrap_or_default();
    Commit {
        id: commit.id().to_string(),
        parents: commit.parent_ids().map(|p| p.to_string()).collect(),
        message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
        author: commit.author().name().unwrap_or("unknown").to_string(),
        time,
    }
}

fn line_op(origin: char) -> Option<LineOp> {
    match origin {
        ' ' => Some(LineOp::Context),
        '+' => Some(LineOp::Add),
        '-' => Some(LineOp::Delete),
        // '=', '>' and '<' mark end-of-file newline changes
        _ => None,
    }
}

fn file_patch(diff: &git2::Diff<'_>, idx: usize) -> Result<Option<FilePatch>, RepoError> {
    let Some(delta) = diff.get_delta(idx) else {
        return Ok(None);
    };
    let path = match delta.new_file().path().or_else(|| delta.old_file().path()) {
        Some(p) => p.to_string_lossy().into_owned(),
        None => return Ok(None),
    };

    let patch = Patch::from_diff(diff, idx)?;
    let patch = match patch {
        Some(p) if !p.delta().flags().is_binary() => p,
        _ => {
            return Ok(Some(FilePatch {
                path,
                binary: true,
                hunks: Vec::new(),
            }))
        }
    };

    let mut hunks = Vec::with_capacity(patch.num_hunks());
    for h in 0..patch.num_hunks() {
        let mut hunk = Hunk::default();
        for l in 0..patch.num_lines_in_hunk(h)? {
            let line = patch.line_in_hunk(h, l)?;
            let Some(op) = line_op(line.origin()) else {
                continue;
            };
            let content = String::from_utf8_lossy(line.content());
            hunk.lines.push(DiffLine {
                op,
                content: content.trim_end_matches(|c| c == '\n' || c == '\r').to_string(),
            });
        }
        hunks.push(hunk);
    }

    Ok(Some(FilePatch {
        path,
        binary: false,
        hunks,
    }))
}

impl RepositoryReader for GitRepository {
    fn resolve(&self, branch: Option<&str>) -> Result<Commit, RepoError> {
        let reference = match branch {
            Some(name) => self
                .repo
                .find_reference(&format!("refs/heads/{name}"))
                .map_err(|_| RepoError::RefNotFound(name.to_string()))?,
            None => self
                .repo
                .head()
                .map_err(|_| RepoError::RefNotFound("HEAD".to_string()))?,
        };
        let commit = reference.peel_to_commit()?;
        Ok(to_commit(&commit))
    }

    fn walk(&self, from: &str) -> Result<CommitWalk<'_>, RepoError> {
        let start = Oid::from_str(from).map_err(|_| RepoError::InvalidId(from.to_string()))?;
        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TIME)?;
        revwalk.push(start)?;

        let repo = &self.repo;
        Ok(Box::new(revwalk.map(move |oid| {
            let commit = repo.find_commit(oid?)?;
            Ok(to_commit(&commit))
        })))
    }

    fn tree_diff(&self, old: Option<&str>, new: &str) -> Result<Vec<FilePatch>, RepoError> {
        let new_tree = self.find_commit(new)?.tree()?;
        let old_tree = match old {
            Some(id) => Some(self.find_commit(id)?.tree()?),
            None => None,
        };

        let mut opts = DiffOptions::new();
        opts.context_lines(3);
        let diff = self
            .repo
            .diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), Some(&mut opts))?;

        let mut patches = Vec::new();
        for idx in 0..diff.deltas().len() {
            if let Some(patch) = file_patch(&diff, idx)? {
                patches.push(patch);
            }
        }
        Ok(patches)
    }
}
