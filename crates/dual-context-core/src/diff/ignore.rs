//! Paths that carry no diagnostic signal: lock files, tests, vendored code,
//! build output and CI configuration.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Serializable ignore rules, overridable from the `[analysis.ignore]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreRules {
    /// Exact file names (lock and checksum files).
    pub lock_files: Vec<String>,
    /// File name suffixes that mark test files.
    pub test_suffixes: Vec<String>,
    /// Directory names matched against any path component.
    pub directories: Vec<String>,
    /// Path prefixes, or exact paths, of CI configuration.
    pub ci_paths: Vec<String>,
    /// Additional glob patterns.
    pub globs: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self {
            lock_files: strings(&[
                "go.sum",
                "package-lock.json",
                "yarn.lock",
                "Gemfile.lock",
                "poetry.lock",
                "pnpm-lock.yaml",
                "Cargo.lock",
                "composer.lock",
                "Pipfile.lock",
                "shrinkwrap.yaml",
            ]),
            test_suffixes: strings(&[
                "_test.go",
                ".test.js",
                ".test.ts",
                ".spec.js",
                ".spec.ts",
                "_test.py",
                "_spec.rb",
            ]),
            directories: strings(&[
                "vendor",
                "node_modules",
                "dist",
                "build",
                "out",
                ".idea",
                ".vscode",
                ".git",
                "__pycache__",
                ".pytest_cache",
                ".tox",
            ]),
            ci_paths: strings(&[
                ".github/",
                ".gitlab/",
                ".circleci/",
                ".gitlab-ci.yml",
                ".travis.yml",
            ]),
            globs: strings(&["**/test_*.py"]),
        }
    }
}

/// Compiled form of [`IgnoreRules`].
#[derive(Debug, Clone)]
pub struct IgnorePolicy {
    rules: IgnoreRules,
    globs: GlobSet,
}

impl Default for IgnorePolicy {
    fn default() -> Self {
        // The built-in patterns always compile.
        Self::new(IgnoreRules::default()).unwrap_or_else(|_| Self {
            rules: IgnoreRules::default(),
            globs: GlobSet::empty(),
        })
    }
}

impl IgnorePolicy {
    /// Compile `rules`. An invalid glob is a configuration error.
    pub fn new(rules: IgnoreRules) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &rules.globs {
            let glob = Glob::new(pattern).map_err(|e| ConfigError::Invalid {
                field: "analysis.ignore.globs".to_string(),
                reason: format!("{pattern}: {e}"),
            })?;
            builder.add(glob);
        }
        let globs = builder.build().map_err(|e| ConfigError::Invalid {
            field: "analysis.ignore.globs".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { rules, globs })
    }

    /// A policy that keeps every path.
    pub fn none() -> Self {
        Self {
            rules: IgnoreRules {
                lock_files: Vec::new(),
                test_suffixes: Vec::new(),
                directories: Vec::new(),
                ci_paths: Vec::new(),
                globs: Vec::new(),
            },
            globs: GlobSet::empty(),
        }
    }

    /// The rules this policy was compiled from.
    pub fn rules(&self) -> &IgnoreRules {
        &self.rules
    }

    /// Whether `path` (repository-relative, either separator) is noise.
    ///
    /// Lock files and test suffixes match the file name. Directories match
    /// any parent segment. CI entries ending in `/` match as prefixes, others
    /// exactly. Globs match the whole path.
    pub fn is_ignored(&self, path: &str) -> bool {
        let path = path.replace('\\', "/");
        let file_name = path.rsplit('/').next().unwrap_or(path.as_str());

        if self.rules.lock_files.iter().any(|f| f == file_name) {
            return true;
        }
        if self.rules.test_suffixes.iter().any(|s| file_name.ends_with(s.as_str())) {
            return true;
        }

        let mut components = path.split('/');
        // the last component is the file itself
        components.next_back();
        if components.any(|c| self.rules.directories.iter().any(|d| d == c)) {
            return true;
        }

        let in_ci = self.rules.ci_paths.iter().any(|p| {
            if p.ends_with('/') {
                path.starts_with(p.as_str())
            } else {
                path == *p
            }
        });
        if in_ci {
            return true;
        }

        self.globs.is_match(&path)
    }
}
