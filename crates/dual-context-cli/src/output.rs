//! Result renderers, one [`ResultSink`] per output format.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use dual_context_core::{AnalysisOutcome, OutcomeResult, OutputFormat, ResultSink, RunSummary, Tier};

pub type Output = Box<dyn Write + Send>;

/// Open `path` for writing, or stdout when no path is given.
pub fn open_output(path: Option<&Path>) -> io::Result<Output> {
    match path {
        Some(p) => Ok(Box::new(BufWriter::new(File::create(p)?))),
        None => Ok(Box::new(io::stdout())),
    }
}

pub fn make_sink(format: OutputFormat, out: Output) -> Box<dyn ResultSink> {
    match format {
        OutputFormat::Json => Box::new(JsonLinesSink::new(out)),
        OutputFormat::Text => Box::new(TextSink::new(out)),
        OutputFormat::Markdown => Box::new(MarkdownSink::new(out)),
    }
}

// ---------------------------------------------------------------------------
// JSON lines
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Record<'a> {
    Result {
        hash: &'a str,
        message: &'a str,
        probability: Tier,
        reasoning: &'a str,
    },
    Log {
        level: &'static str,
        msg: String,
        timestamp: String,
    },
    Summary {
        total: usize,
        high: usize,
        medium: usize,
        low: usize,
        skipped: usize,
        errors: usize,
        duration_ms: u64,
        model: &'a str,
    },
}

fn log_record(level: &'static str, msg: String) -> Record<'static> {
    Record::Log {
        level,
        msg,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

/// One JSON object per line, flushed as soon as it is written.
pub struct JsonLinesSink {
    out: Output,
}

impl JsonLinesSink {
    pub fn new(out: Output) -> Self {
        Self { out }
    }

    fn write(&mut self, record: &Record<'_>) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}

impl ResultSink for JsonLinesSink {
    fn accept(&mut self, outcome: &AnalysisOutcome) -> io::Result<()> {
        match &outcome.result {
            OutcomeResult::Verdict(v) => self.write(&Record::Result {
                hash: &outcome.short_id,
                message: &outcome.message,
                probability: v.tier,
                reasoning: &v.rationale,
            }),
            OutcomeResult::Skipped => self.write(&log_record(
                "INFO",
                format!(
                    "Commit: {} | [Skipped - No relevant code changes]",
                    outcome.short_id
                ),
            )),
            OutcomeResult::Failed(e) => self.write(&log_record(
                "ERROR",
                format!("Failed to analyze commit {}: {}", outcome.commit_id, e),
            )),
        }
    }

    fn finish(&mut self, summary: &RunSummary) -> io::Result<()> {
        self.write(&Record::Summary {
            total: summary.total,
            high: summary.high,
            medium: summary.medium,
            low: summary.low,
            skipped: summary.skipped,
            errors: summary.errors,
            duration_ms: summary.elapsed.as_millis() as u64,
            model: &summary.model,
        })
    }
}

// ---------------------------------------------------------------------------
// Plain text
// ---------------------------------------------------------------------------

/// Human-readable streaming output.
pub struct TextSink {
    out: Output,
}

impl TextSink {
    pub fn new(out: Output) -> Self {
        Self { out }
    }
}

impl ResultSink for TextSink {
    fn accept(&mut self, outcome: &AnalysisOutcome) -> io::Result<()> {
        match &outcome.result {
            OutcomeResult::Verdict(v) => {
                writeln!(
                    self.out,
                    "[{:<6}] {}  {}",
                    v.tier.as_str(),
                    outcome.short_id,
                    outcome.message
                )?;
                if !v.rationale.is_empty() {
                    writeln!(self.out, "         {}", v.rationale)?;
                }
            }
            OutcomeResult::Skipped => writeln!(
                self.out,
                "[SKIP  ] {}  {}  (no relevant code changes)",
                outcome.short_id, outcome.message
            )?,
            OutcomeResult::Failed(e) => writeln!(
                self.out,
                "[ERROR ] {}  {}  ({})",
                outcome.short_id, outcome.message, e
            )?,
        }
        self.out.flush()
    }

    fn finish(&mut self, summary: &RunSummary) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(
            self.out,
            "{} commits: {} high, {} medium, {} low, {} skipped, {} errors ({} ms, {})",
            summary.total,
            summary.high,
            summary.medium,
            summary.low,
            summary.skipped,
            summary.errors,
            summary.elapsed.as_millis(),
            summary.model
        )?;
        self.out.flush()
    }
}

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

/// Buffers verdicts and renders a report grouped by tier at the end.
pub struct MarkdownSink {
    out: Output,
    outcomes: Vec<AnalysisOutcome>,
}

impl MarkdownSink {
    pub fn new(out: Output) -> Self {
        Self {
            out,
            outcomes: Vec::new(),
        }
    }
}

impl ResultSink for MarkdownSink {
    fn accept(&mut self, outcome: &AnalysisOutcome) -> io::Result<()> {
        self.outcomes.push(outcome.clone());
        Ok(())
    }

    fn finish(&mut self, summary: &RunSummary) -> io::Result<()> {
        let report = render_markdown(&self.outcomes, summary);
        self.out.write_all(report.as_bytes())?;
        self.out.flush()
    }
}

pub fn render_markdown(outcomes: &[AnalysisOutcome], summary: &RunSummary) -> String {
    let mut md = String::from("## Root Cause Analysis Results\n\n");

    let verdicts: Vec<_> = outcomes
        .iter()
        .filter_map(|o| match &o.result {
            OutcomeResult::Verdict(v) => Some((o, v)),
            _ => None,
        })
        .collect();

    if verdicts.is_empty() {
        md.push_str("No commits with relevant code changes found.\n\n");
    }
    for tier in [Tier::High, Tier::Medium, Tier::Low] {
        for (outcome, verdict) in verdicts.iter().filter(|(_, v)| v.tier == tier) {
            md.push_str(&format!("### [{}] Commit {}\n", tier, outcome.short_id));
            md.push_str(&format!("**Message:** {}\n\n", outcome.message));
            md.push_str(&format!("**Analysis:** {}\n\n", verdict.rationale));
            md.push_str("---\n\n");
        }
    }

    let failed: Vec<_> = outcomes.iter().filter_map(|o| o.error().map(|e| (o, e))).collect();
    if !failed.is_empty() {
        md.push_str("## Errors\n\n");
        for (outcome, error) in failed {
            md.push_str(&format!("- `{}`: {}\n", outcome.short_id, error));
        }
        md.push('\n');
    }

    md.push_str("## Summary\n\n");
    md.push_str(&format!("- **Total commits analyzed:** {}\n", summary.total));
    md.push_str(&format!("- **Model:** {}\n", summary.model));
    md.push_str(&format!("- **Duration:** {} ms\n", summary.elapsed.as_millis()));
    md.push_str(&format!("- **High probability:** {}\n", summary.high));
    md.push_str(&format!("- **Medium probability:** {}\n", summary.medium));
    md.push_str(&format!("- **Low probability:** {}\n", summary.low));
    md.push_str(&format!("- **Skipped (no code changes):** {}\n", summary.skipped));
    md.push_str(&format!("- **Errors:** {}\n", summary.errors));
    md
}
