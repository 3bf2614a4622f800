//! Layered configuration: defaults, optional TOML file, environment, flags.
//!
//! The file is looked up in the working directory first, then in the user
//! config directory, then in the home directory. A missing file means
//! defaults. Values are validated before anything reaches the engine.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diff::{DiffExtractor, IgnorePolicy, IgnoreRules, DEFAULT_MAX_DIFF_BYTES};
use crate::orchestrator::OrchestratorConfig;
use crate::prompt::PromptBuilder;
use crate::retry::RetryPolicy;

/// Project-local config file name.
pub const CONFIG_FILE_NAME: &str = ".git-dual-context.toml";

/// Upper bound on commits analysed in one run.
pub const MAX_COMMITS: usize = 1000;

/// Upper bound on concurrent reasoning calls.
pub const MAX_WORKERS: usize = 50;

pub const DEFAULT_WORKERS: usize = 3;
pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_PROVIDER: &str = "gemini";

const SUPPORTED_PROVIDERS: &[&str] = &["gemini"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Reasoning backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    /// Per-call timeout.
    pub timeout_secs: u64,
    /// Prefer the `GEMINI_API_KEY` environment variable.
    pub api_key: Option<String>,
    /// Replaces the built-in prompt.
    pub prompt_template: Option<PathBuf>,
    /// Cut the prompt's commit message to its first line at this length.
    /// Unset sends the full message.
    pub prompt_message_max_length: Option<usize>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            timeout_secs: 300,
            api_key: None,
            prompt_template: None,
            prompt_message_max_length: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub default_commits: usize,
    pub max_diff_bytes: usize,
    pub skip_merge_commits: bool,
    pub commit_message_max_length: usize,
    pub ignore: IgnoreRules,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            default_commits: crate::commit::DEFAULT_COMMIT_COUNT,
            max_diff_bytes: DEFAULT_MAX_DIFF_BYTES,
            skip_merge_commits: true,
            commit_message_max_length: 80,
            ignore: IgnoreRules::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub workers: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Deadline for the whole run; unset means no deadline.
    pub run_timeout_secs: Option<u64>,
    /// How long in-flight calls may finish after cancellation.
    pub shutdown_grace_ms: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
            run_timeout_secs: None,
            shutdown_grace_ms: 5_000,
        }
    }
}

/// Result rendering format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Text => "text",
            Self::Markdown => "markdown",
        })
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(ConfigError::invalid(
                "output.format",
                format!("unknown format {other:?} (expected json, text or markdown)"),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub verbose: bool,
}

/// Complete tool configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub llm: LlmConfig,
    pub analysis: AnalysisSettings,
    pub performance: PerformanceConfig,
    pub output: OutputConfig,
}

/// Values that take precedence over the file, typically from flags or env.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
    pub commits: Option<usize>,
    pub workers: Option<usize>,
    pub format: Option<OutputFormat>,
    pub verbose: Option<bool>,
}

/// First existing config file among the standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    let mut candidates = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("git-dual-context").join("config.toml"));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(CONFIG_FILE_NAME));
    }
    candidates.into_iter().find(|p| p.is_file())
}

impl AnalysisConfig {
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            source: e,
        })
    }

    /// Read and parse the TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Load `explicit` if given, else the first discovered file, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => find_config_file(),
        };
        match path {
            Some(p) => Ok((Self::load(&p)?, Some(p))),
            None => Ok((Self::default(), None)),
        }
    }

    /// Apply every override that is set.
    pub fn merge_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(model) = &overrides.model {
            self.llm.model = model.clone();
        }
        if let Some(key) = &overrides.api_key {
            self.llm.api_key = Some(key.clone());
        }
        if let Some(secs) = overrides.timeout_secs {
            self.llm.timeout_secs = secs;
        }
        if let Some(n) = overrides.commits {
            self.analysis.default_commits = n;
        }
        if let Some(n) = overrides.workers {
            self.performance.workers = n;
        }
        if let Some(format) = overrides.format {
            self.output.format = format;
        }
        if let Some(verbose) = overrides.verbose {
            self.output.verbose = verbose;
        }
    }

    /// Reject values the engine cannot run with, naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let provider = self.llm.provider.trim();
        if provider.is_empty() {
            return Err(ConfigError::invalid("llm.provider", "must not be empty"));
        }
        if !SUPPORTED_PROVIDERS.contains(&provider) {
            return Err(ConfigError::invalid(
                "llm.provider",
                format!("unsupported provider {provider:?}"),
            ));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::invalid("llm.model", "must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.llm.temperature) {
            return Err(ConfigError::invalid(
                "llm.temperature",
                format!("{} is outside 0.0..=1.0", self.llm.temperature),
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::invalid("llm.timeout_secs", "must be positive"));
        }
        crate::validate::validate_commit_count(self.analysis.default_commits)?;
        if self.analysis.max_diff_bytes == 0 {
            return Err(ConfigError::invalid(
                "analysis.max_diff_bytes",
                "must be positive",
            ));
        }
        crate::validate::validate_worker_count(self.performance.workers)?;
        if self.performance.retry_base_delay_ms > self.performance.retry_max_delay_ms {
            return Err(ConfigError::invalid(
                "performance.retry_base_delay_ms",
                "must not exceed retry_max_delay_ms",
            ));
        }
        if self.performance.run_timeout_secs == Some(0) {
            return Err(ConfigError::invalid(
                "performance.run_timeout_secs",
                "must be positive when set",
            ));
        }
        Ok(())
    }

    /// Backoff settings from `[performance]`.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.performance.max_retries,
            base_delay: Duration::from_millis(self.performance.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.performance.retry_max_delay_ms),
        }
    }

    /// Worker, timeout and retry settings for [`crate::TwoPhaseOrchestrator`].
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            workers: self.performance.workers,
            call_timeout: Duration::from_secs(self.llm.timeout_secs),
            run_timeout: self.performance.run_timeout_secs.map(Duration::from_secs),
            shutdown_grace: Duration::from_millis(self.performance.shutdown_grace_ms),
            retry: self.retry_policy(),
            message_max_len: self.analysis.commit_message_max_length,
        }
    }

    /// Prompt builder for `bug_description`, with the configured template
    /// and prompt message limit applied.
    pub fn prompt_builder(&self, bug_description: &str) -> Result<PromptBuilder, ConfigError> {
        let mut builder = PromptBuilder::new(bug_description);
        if let Some(max_len) = self.llm.prompt_message_max_length {
            builder = builder.with_message_max_len(max_len);
        }
        if let Some(template) = &self.llm.prompt_template {
            builder = builder.with_template_file(template)?;
        }
        Ok(builder)
    }

    pub fn diff_extractor(&self) -> Result<DiffExtractor, ConfigError> {
        let policy = IgnorePolicy::new(self.analysis.ignore.clone())?;
        Ok(DiffExtractor::new(policy, self.analysis.max_diff_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AnalysisConfig::default();
        assert_eq!(cfg.llm.provider, "gemini");
        assert_eq!(cfg.llm.timeout_secs, 300);
        assert_eq!(cfg.analysis.default_commits, 5);
        assert_eq!(cfg.analysis.max_diff_bytes, 50_000);
        assert!(cfg.analysis.skip_merge_commits);
        assert_eq!(cfg.performance.workers, 3);
        assert_eq!(cfg.performance.shutdown_grace_ms, 5_000);
        assert_eq!(cfg.output.format, OutputFormat::Json);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = AnalysisConfig::from_toml_str(
            r#"
[llm]
model = "gemini-2.5-flash"

[performance]
workers = 8

[analysis.ignore]
globs = ["**/*.pb.go"]
"#,
            Path::new("inline.toml"),
        )
        .unwrap();
        assert_eq!(cfg.llm.model, "gemini-2.5-flash");
        assert_eq!(cfg.llm.provider, "gemini");
        assert_eq!(cfg.performance.workers, 8);
        assert_eq!(cfg.performance.max_retries, 3);
        assert_eq!(cfg.analysis.ignore.globs, vec!["**/*.pb.go".to_string()]);
        assert!(cfg.analysis.ignore.lock_files.contains(&"Cargo.lock".to_string()));
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = AnalysisConfig::from_toml_str("[llm\nmodel=", Path::new("broken.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[output]\nformat = \"markdown\"\n").unwrap();
        let (cfg, found) = AnalysisConfig::discover(Some(&path)).unwrap();
        assert_eq!(cfg.output.format, OutputFormat::Markdown);
        assert_eq!(found.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_overrides_apply_only_set_values() {
        let mut cfg = AnalysisConfig::default();
        cfg.merge_overrides(&ConfigOverrides {
            model: Some("m2".into()),
            workers: Some(7),
            ..ConfigOverrides::default()
        });
        assert_eq!(cfg.llm.model, "m2");
        assert_eq!(cfg.performance.workers, 7);
        assert_eq!(cfg.analysis.default_commits, 5);
    }

    #[test]
    fn test_validation_failures() {
        let mut cfg = AnalysisConfig::default();
        cfg.llm.temperature = 1.5;
        assert!(cfg.validate().unwrap_err().to_string().contains("llm.temperature"));

        let mut cfg = AnalysisConfig::default();
        cfg.llm.provider = "openai".into();
        assert!(cfg.validate().is_err());

        let mut cfg = AnalysisConfig::default();
        cfg.performance.workers = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AnalysisConfig::default();
        cfg.performance.workers = MAX_WORKERS + 1;
        assert!(cfg.validate().is_err());

        let mut cfg = AnalysisConfig::default();
        cfg.analysis.default_commits = MAX_COMMITS + 1;
        assert!(cfg.validate().is_err());

        let mut cfg = AnalysisConfig::default();
        cfg.analysis.max_diff_bytes = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_derived_settings() {
        let cfg = AnalysisConfig::default();
        let retry = cfg.retry_policy();
        assert_eq!(retry.base_delay, Duration::from_secs(1));
        assert_eq!(retry.max_delay, Duration::from_secs(30));
        let orch = cfg.orchestrator_config();
        assert_eq!(orch.workers, 3);
        assert_eq!(orch.call_timeout, Duration::from_secs(300));
        assert_eq!(orch.shutdown_grace, Duration::from_secs(5));
        assert!(cfg.diff_extractor().is_ok());
    }

    fn context_with_message(message: &str) -> crate::diff::DiffContext {
        crate::diff::DiffContext {
            commit: crate::commit::Commit {
                id: "0123456789abcdef0123456789abcdef01234567".into(),
                parents: vec![],
                message: message.into(),
                author: "dev".into(),
                time: chrono::Utc::now(),
            },
            standard_diff: "+a\n".into(),
            full_diff: String::new(),
            touched_files: vec!["a.rs".into()],
            skipped: false,
        }
    }

    #[test]
    fn test_prompt_carries_full_commit_message_by_default() {
        let message = "Tighten parser bounds so that the tokenizer rejects overlong literals\n\nThe body explains the off-by-one in detail.";
        let cfg = AnalysisConfig::default();
        let req = cfg
            .prompt_builder("panic")
            .unwrap()
            .build(&context_with_message(message));
        assert!(req.prompt.contains("The body explains the off-by-one in detail."));
        assert!(req.prompt.contains("rejects overlong literals"));
    }

    #[test]
    fn test_prompt_message_limit_is_opt_in() {
        let cfg = AnalysisConfig::from_toml_str(
            "[llm]\nprompt_message_max_length = 12\n",
            Path::new("inline.toml"),
        )
        .unwrap();
        let req = cfg
            .prompt_builder("panic")
            .unwrap()
            .with_template("{commit_message}")
            .build(&context_with_message("a very long subject line\n\nbody"));
        assert_eq!(req.prompt, "a very lo...");
    }
}
