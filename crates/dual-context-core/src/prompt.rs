//! Prompt assembly.
//!
//! A template carries `{bug_description}`, `{commit_hash}`,
//! `{commit_message}`, `{standard_diff}` and `{full_diff}` placeholders.
//! Each is substituted in a single pass, so diff text that happens to contain
//! a placeholder string is never expanded again.

use std::path::Path;

use crate::config::ConfigError;
use crate::diff::DiffContext;
use crate::reasoning::ReasoningRequest;

const PLACEHOLDERS: &[&str] = &[
    "bug_description",
    "commit_hash",
    "commit_message",
    "standard_diff",
    "full_diff",
];

/// Default instructions: skeptical, multi-step, ending in a JSON verdict.
pub const DEFAULT_TEMPLATE: &str = r#"You are a skeptical senior engineer doing root-cause analysis.
Assume this commit is innocent until the diffs prove otherwise.

BUG DESCRIPTION:
{bug_description}

COMMIT UNDER REVIEW:
Hash: {commit_hash}
Message: {commit_message}

1. STANDARD DIFF (what this commit changed relative to its parent):
{standard_diff}

2. FULL DIFF (how the same files changed between this commit and the branch tip):
{full_diff}

Work through these steps and show your reasoning for each.

VALUE TRACING (applies to every step): pick out any concrete values or state
names in the bug description, such as "-2" or "disconnected", and trace where
in these diffs they could be produced, let through or changed.

STEP 0 - Hypothesis: from the bug description alone, list two or three kinds
of change that could cause it.

STEP 1 - Immediate change: does the standard diff contain such a change? Point
at concrete lines. Look for removed guards and for paths that now let a bad
value reach a check. Renames, formatting and comments are not evidence.

STEP 2 - Evolution: using the full diff, decide whether the suspicious lines
still exist at the tip, were reverted, or were rewritten. A change that has
been removed since cannot explain a bug that is present now.

STEP 3 - Classification:
- HIGH: the commit introduces logic that directly explains the bug and that
  logic is still present at the tip.
- MEDIUM: the commit touches the affected area and plausibly contributes, but
  the link is indirect or partially superseded.
- LOW: the commit is unrelated, cosmetic, or its relevant changes were undone.

Answer in this layout:

Hypothesis: <likely causes from the description>
Reasoning: <value tracing and steps 1 and 2>
Classification: <HIGH|MEDIUM|LOW>

Finish with exactly one JSON object on its own, with no text after it:
{"probability": "HIGH|MEDIUM|LOW", "reasoning": "<two or three sentences>"}
"#;

/// Builds [`ReasoningRequest`]s for a fixed bug description.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    bug_description: String,
    template: String,
    message_max_len: usize,
}

impl PromptBuilder {
    pub fn new(bug_description: impl Into<String>) -> Self {
        Self {
            bug_description: bug_description.into(),
            template: DEFAULT_TEMPLATE.to_string(),
            message_max_len: usize::MAX,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Load a template from `path`.
    pub fn with_template_file(self, path: &Path) -> Result<Self, ConfigError> {
        let template = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(self.with_template(template))
    }

    /// Cap the commit message shown in the prompt.
    pub fn with_message_max_len(mut self, max_len: usize) -> Self {
        self.message_max_len = max_len;
        self
    }

    pub fn bug_description(&self) -> &str {
        &self.bug_description
    }

    pub fn build(&self, ctx: &DiffContext) -> ReasoningRequest {
        let message = if self.message_max_len == usize::MAX {
            ctx.commit.message.trim().to_string()
        } else {
            ctx.commit.summary(self.message_max_len)
        };
        let prompt = render_template(&self.template, |name| match name {
            "bug_description" => Some(self.bug_description.as_str().into()),
            "commit_hash" => Some(ctx.commit.id.as_str().into()),
            "commit_message" => Some(message.as_str().into()),
            "standard_diff" => Some(ctx.standard_diff.as_str().into()),
            "full_diff" => Some(ctx.full_diff.as_str().into()),
            _ => None,
        });
        ReasoningRequest::new(prompt)
    }
}

fn render_template<'a, F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<std::borrow::Cow<'a, str>>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let name_end = after.find('}');
        let value = name_end
            .map(|end| &after[..end])
            .filter(|name| PLACEHOLDERS.contains(name))
            .and_then(&lookup);
        match (value, name_end) {
            (Some(value), Some(end)) => {
                out.push_str(&value);
                rest = &after[end + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
