//! Input validation for user-supplied values.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::config::{ConfigError, MAX_COMMITS, MAX_WORKERS};

const FORBIDDEN_ROOTS: &[&str] = &["/etc", "/sys", "/proc", "/dev"];

fn branch_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9/_.-]+$").ok())
        .as_ref()
}

/// The bug description must contain something besides whitespace.
pub fn validate_bug_description(text: &str) -> Result<(), ConfigError> {
    if text.trim().is_empty() {
        return Err(ConfigError::invalid(
            "bug description",
            "must not be empty",
        ));
    }
    Ok(())
}

/// Accept only plain ref names: `[A-Za-z0-9/_.-]`, no `..`, no leading
/// `-`, no leading or trailing `/`.
pub fn validate_branch_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| Err(ConfigError::invalid("branch", format!("{name:?} {reason}")));
    if name.is_empty() {
        return invalid("is empty");
    }
    if !branch_pattern().is_some_and(|re| re.is_match(name)) {
        return invalid("contains characters outside [A-Za-z0-9/_.-]");
    }
    if name.contains("..") {
        return invalid("contains '..'");
    }
    if name.starts_with('-') {
        return invalid("starts with '-'");
    }
    if name.starts_with('/') || name.ends_with('/') {
        return invalid("starts or ends with '/'");
    }
    Ok(())
}

/// Where the repository under analysis comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoSource {
    /// An absolute path to a local checkout.
    Local(PathBuf),
    /// A URL that is cloned into a temporary directory for the run.
    Remote(String),
}

fn looks_remote(path: &str) -> bool {
    ["http://", "https://", "ssh://", "git://", "git@"]
        .iter()
        .any(|p| path.starts_with(p))
}

/// Classify `--repo` as a remote URL or a local path and validate it.
pub fn parse_repo_source(path: &str) -> Result<RepoSource, ConfigError> {
    let path = path.trim();
    if !looks_remote(path) {
        return validate_repo_path(path).map(RepoSource::Local);
    }
    if path.chars().any(char::is_whitespace) {
        return Err(ConfigError::invalid(
            "repository URL",
            "must not contain whitespace",
        ));
    }
    if path.starts_with('-') {
        return Err(ConfigError::invalid("repository URL", "starts with '-'"));
    }
    Ok(RepoSource::Remote(path.to_string()))
}

/// Check a local repository path and return it made absolute.
pub fn validate_repo_path(path: &str) -> Result<PathBuf, ConfigError> {
    if path.trim().is_empty() {
        return Err(ConfigError::invalid("repository path", "must not be empty"));
    }
    if looks_remote(path) {
        return Err(ConfigError::invalid(
            "repository path",
            "is a remote URL, not a local path",
        ));
    }

    let candidate = Path::new(path);
    if candidate.components().any(|c| c == Component::ParentDir) {
        return Err(ConfigError::invalid(
            "repository path",
            "must not contain '..'",
        ));
    }

    let absolute = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| ConfigError::invalid("repository path", e.to_string()))?
            .join(candidate)
    };
    if FORBIDDEN_ROOTS.iter().any(|root| absolute.starts_with(root)) {
        return Err(ConfigError::invalid(
            "repository path",
            format!("{} is a system directory", absolute.display()),
        ));
    }
    Ok(absolute)
}

/// Commit count must be in `1..=MAX_COMMITS`.
pub fn validate_commit_count(n: usize) -> Result<(), ConfigError> {
    if n == 0 || n > MAX_COMMITS {
        return Err(ConfigError::invalid(
            "commit count",
            format!("{n} is outside 1..={MAX_COMMITS}"),
        ));
    }
    Ok(())
}

/// Worker count must be in `1..=MAX_WORKERS`.
pub fn validate_worker_count(n: usize) -> Result<(), ConfigError> {
    if n == 0 || n > MAX_WORKERS {
        return Err(ConfigError::invalid(
            "worker count",
            format!("{n} is outside 1..={MAX_WORKERS}"),
        ));
    }
    Ok(())
}
