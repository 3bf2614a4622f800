//! git-dual-context - find the commit that introduced a bug
//!
//! Every recent commit is shown to a reasoning model twice: as the change it
//! made against its parent, and as what later happened to the same files up
//! to the branch tip. Results stream out in commit order as JSON lines, text
//! or a markdown report.

mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::parser::ValueSource;
use clap::{CommandFactory, FromArgMatches, Parser};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use dual_context_core::validate::{parse_repo_source, validate_branch_name, validate_bug_description};
use dual_context_core::{
    init_tracing, AnalysisConfig, Checkout, CommitSelector, ConfigOverrides, OutputFormat,
    RepoSource, TwoPhaseOrchestrator,
};
use dual_context_gemini::{GeminiClient, GeminiConfig};

use output::{make_sink, open_output};

#[derive(Parser, Debug)]
#[command(name = "git-dual-context")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Rank recent commits by how likely they are to have caused a bug", long_about = None)]
struct Cli {
    /// Path to the git repository, or a remote URL to clone
    #[arg(long, default_value = ".")]
    repo: String,

    /// Branch to analyse (default: HEAD)
    #[arg(long)]
    branch: Option<String>,

    /// Description of the bug or the error message observed
    #[arg(short = 'e', long = "error")]
    error: String,

    /// Number of commits to analyse
    #[arg(short = 'n', long = "commits")]
    commits: Option<usize>,

    /// Concurrent reasoning calls
    #[arg(short = 'j', long = "workers")]
    workers: Option<usize>,

    /// Model name
    #[arg(long, env = "GEMINI_MODEL")]
    model: Option<String>,

    /// Per-call timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Output format: json, text or markdown
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Write results to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file (default: search standard locations)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines on stderr
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            timeout_secs: self.timeout,
            commits: self.commits,
            workers: self.workers,
            format: self.format,
            verbose: self.verbose.then_some(true),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Cli::command().get_matches();
    let api_key_on_command_line = matches.value_source("api_key") == Some(ValueSource::CommandLine);
    let cli = Cli::from_arg_matches(&matches)?;

    let (mut config, config_path) =
        AnalysisConfig::discover(cli.config.as_deref()).context("Failed to load config")?;
    config.merge_overrides(&cli.overrides());

    let level = if config.output.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json_logs, level);

    if let Some(path) = &config_path {
        info!(path = %path.display(), "loaded config file");
    }
    if api_key_on_command_line {
        warn!("--api-key is visible in the process list; prefer GEMINI_API_KEY");
    }

    config.validate().context("Invalid configuration")?;
    validate_bug_description(&cli.error).context("Invalid error description")?;
    if let Some(branch) = &cli.branch {
        validate_branch_name(branch).context("Invalid branch name")?;
    }
    let source = parse_repo_source(&cli.repo).context("Invalid repository path")?;

    // The checkout owns any temporary clone; it must outlive the run.
    let checkout = open_checkout(source).await?;

    let client = GeminiClient::new(GeminiConfig::from_analysis_config(&config)?)
        .context("Failed to create Gemini client")?;

    let prompt = config
        .prompt_builder(&cli.error)
        .context("Failed to load prompt template")?;

    let orchestrator = TwoPhaseOrchestrator::new(
        Arc::new(client),
        prompt,
        config.diff_extractor()?,
        config.orchestrator_config(),
    );
    let selector = CommitSelector {
        limit: config.analysis.default_commits,
        skip_merges: config.analysis.skip_merge_commits,
    };

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling outstanding analysis");
            trigger.cancel();
        }
    });

    let out = open_output(cli.output.as_deref()).context("Failed to open output")?;
    let summary = orchestrator
        .run(
            checkout.repository(),
            &selector,
            cli.branch.as_deref(),
            make_sink(config.output.format, out),
            &cancel,
        )
        .await?;

    if cancel.is_cancelled() {
        bail!(
            "analysis interrupted; {} of {} commits reported as errors",
            summary.errors,
            summary.total
        );
    }
    Ok(())
}

async fn open_checkout(source: RepoSource) -> Result<Checkout> {
    let (verb, described) = match &source {
        RepoSource::Local(path) => ("open", path.display().to_string()),
        RepoSource::Remote(url) => {
            info!(url = %url, "cloning remote repository into a temporary directory");
            ("clone", url.clone())
        }
    };
    tokio::task::spawn_blocking(move || Checkout::open(&source))
        .await
        .context("repository loader panicked")?
        .with_context(|| format!("Failed to {verb} git repository at {described}"))
}
