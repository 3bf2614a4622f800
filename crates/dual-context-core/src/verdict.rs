//! Recovery of a structured verdict from free-form reasoning output.
//!
//! Backends wrap the JSON verdict in prose, markdown fences or echoed code.
//! Two strategies run in order:
//!
//! 1. Brace matching: start at the last `}` and walk candidate `{` positions
//!    backward, accepting the first span that mentions `"probability"` and
//!    decodes as a JSON object.
//! 2. Regex fallback: scan every single-level `{...}` span that mentions the
//!    field and keep the last one that decodes.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

const TIER_FIELD: &str = "probability";
const RATIONALE_FIELD: &str = "reasoning";

/// Likelihood that a commit introduced the defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl Tier {
    /// Case-insensitive; unknown labels are treated as [`Tier::Low`].
    pub fn normalize(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Self::High,
            "MEDIUM" | "MED" => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Tier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Self::normalize(&label))
    }
}

/// Classification plus the backend's explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisVerdict {
    pub tier: Tier,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("no verdict object with a \"probability\" field found in response")]
    NoVerdict,

    #[error("verdict field \"probability\" is not a string")]
    InvalidTier,
}

/// Extract a verdict from raw response text.
pub fn parse_verdict(text: &str) -> Result<AnalysisVerdict, ParseError> {
    let object = match_braces(text)
        .or_else(|| match_regex(text))
        .ok_or(ParseError::NoVerdict)?;
    verdict_from_object(&object)
}

fn verdict_from_object(object: &Map<String, Value>) -> Result<AnalysisVerdict, ParseError> {
    let tier = match object.get(TIER_FIELD) {
        Some(Value::String(label)) => Tier::normalize(label),
        Some(Value::Null) | None => Tier::Low,
        Some(_) => return Err(ParseError::InvalidTier),
    };
    let rationale = object
        .get(RATIONALE_FIELD)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(AnalysisVerdict { tier, rationale })
}

fn decode_candidate(candidate: &str) -> Option<Map<String, Value>> {
    if !candidate.contains("\"probability\"") {
        return None;
    }
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn match_braces(text: &str) -> Option<Map<String, Value>> {
    let end = text.rfind('}')?;
    let head = &text[..end];
    let mut cursor = head.len();
    while let Some(start) = head[..cursor].rfind('{') {
        if let Some(map) = decode_candidate(&text[start..=end]) {
            return Some(map);
        }
        cursor = start;
    }
    None
}

fn flat_object_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"\{[^{}]*"probability"[^{}]*\}"#).ok())
        .as_ref()
}

fn match_regex(text: &str) -> Option<Map<String, Value>> {
    flat_object_pattern()?
        .find_iter(text)
        .filter_map(|m| decode_candidate(m.as_str()))
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let v = parse_verdict(r#"{"probability": "HIGH", "reasoning": "nil deref"}"#).unwrap();
        assert_eq!(v.tier, Tier::High);
        assert_eq!(v.rationale, "nil deref");
    }

    #[test]
    fn test_surrounded_by_prose_and_fence() {
        let text = "Here is my analysis.\n```json\n{\n  \"probability\": \"medium\",\n  \"reasoning\": \"touches the parser\"\n}\n```\nHope that helps.";
        let v = parse_verdict(text).unwrap();
        assert_eq!(v.tier, Tier::Medium);
        assert_eq!(v.rationale, "touches the parser");
    }

    #[test]
    fn test_unrelated_braces_before_and_after() {
        let text = r#"The code does `fn f() { let x = {1}; }` and
{"probability": "LOW", "reasoning": "only docs"}
trailing map literal: {a: b}"#;
        let v = parse_verdict(text).unwrap();
        assert_eq!(v.tier, Tier::Low);
        assert_eq!(v.rationale, "only docs");
    }

    #[test]
    fn test_nested_object_value() {
        let text = r#"result: {"probability": "HIGH", "reasoning": "x", "meta": {"lines": 3}}"#;
        let v = parse_verdict(text).unwrap();
        assert_eq!(v.tier, Tier::High);
    }

    #[test]
    fn test_last_verdict_wins() {
        let text = r#"{"probability": "LOW", "reasoning": "draft"} revised: {"probability": "HIGH", "reasoning": "final"}"#;
        let v = parse_verdict(text).unwrap();
        assert_eq!(v.tier, Tier::High);
        assert_eq!(v.rationale, "final");
    }

    #[test]
    fn test_regex_fallback_when_trailing_brace_is_junk() {
        // The last `}` closes an unbalanced fragment, so brace matching from it
        // never yields valid JSON; the flat-object scan still finds the verdict.
        let text = r#"{"probability": "MED", "reasoning": "maybe"} and then }"#;
        let v = parse_verdict(text).unwrap();
        assert_eq!(v.tier, Tier::Medium);
    }

    #[test]
    fn test_unknown_tier_becomes_low() {
        let v = parse_verdict(r#"{"probability": "CERTAIN", "reasoning": "?"}"#).unwrap();
        assert_eq!(v.tier, Tier::Low);
    }

    #[test]
    fn test_missing_rationale_is_empty() {
        let v = parse_verdict(r#"{"probability": "high"}"#).unwrap();
        assert_eq!(v.tier, Tier::High);
        assert!(v.rationale.is_empty());
    }

    #[test]
    fn test_no_verdict() {
        assert_eq!(parse_verdict("I cannot decide."), Err(ParseError::NoVerdict));
        assert_eq!(
            parse_verdict(r#"{"verdict": "HIGH"}"#),
            Err(ParseError::NoVerdict)
        );
        assert_eq!(parse_verdict(""), Err(ParseError::NoVerdict));
    }

    #[test]
    fn test_non_string_tier_rejected() {
        assert_eq!(
            parse_verdict(r#"{"probability": 0.9, "reasoning": "x"}"#),
            Err(ParseError::InvalidTier)
        );
    }

    #[test]
    fn test_tier_serde() {
        assert_eq!(serde_json::to_string(&Tier::Medium).unwrap(), "\"MEDIUM\"");
        let t: Tier = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(t, Tier::High);
        let t: Tier = serde_json::from_str("\"bogus\"").unwrap();
        assert_eq!(t, Tier::Low);
    }
}
