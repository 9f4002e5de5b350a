use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::types::EnhancedSummary;
use super::EnhanceError;

type JsonObject = Map<String, Value>;

/// First `{` through last `}`, across newlines.
static BRACE_SPAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Recover a structured summary from free-form model output.
///
/// Strategies, first success wins:
/// 1. whole text as a JSON object
/// 2. first `{` through last `}`
/// 3. first brace-delimited span matched across lines
/// 4. the original text wrapped as `{"text": ...}`
pub fn parse_model_output(text: &str) -> Result<EnhancedSummary, EnhanceError> {
    if text.is_empty() {
        return Err(EnhanceError::EmptyResponse);
    }

    let parsed = parse_object(text)
        .or_else(|| outermost_braces(text).and_then(parse_object))
        .or_else(|| brace_span(text).and_then(parse_object));

    match parsed {
        Some(map) => Ok(EnhancedSummary::Structured(map)),
        None => {
            tracing::debug!(
                chars = text.chars().count(),
                "Falling back to raw text; no JSON object recovered"
            );
            Ok(EnhancedSummary::Raw {
                text: text.to_string(),
            })
        }
    }
}

fn parse_object(candidate: &str) -> Option<JsonObject> {
    serde_json::from_str(candidate).ok()
}

fn outermost_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn brace_span(text: &str) -> Option<&str> {
    BRACE_SPAN.find(text).map(|m| m.as_str())
}
