use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::EnhanceError;
use crate::report::InputReport;

/// Enhanced summary: parsed sections, a raw-text fallback, or the failure.
///
/// Serializes untagged, so callers see either the parsed object itself,
/// `{"text": ...}` or `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EnhancedSummary {
    Structured(serde_json::Map<String, serde_json::Value>),
    Raw { text: String },
    Failed { error: String },
}

impl EnhancedSummary {
    pub fn as_structured(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        match self {
            Self::Structured(map) => Some(map),
            _ => None,
        }
    }
}

/// Result handed back to callers for one enhancement.
///
/// `error` is set if and only if every attempt failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportBundle {
    pub report_tree: InputReport,
    pub enhanced_summary: EnhancedSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReportBundle {
    pub fn enhanced(report: InputReport, summary: EnhancedSummary, raw_output: String) -> Self {
        Self {
            report_tree: report,
            enhanced_summary: summary,
            raw_output: Some(raw_output),
            error: None,
        }
    }

    pub fn failed(report: InputReport, error: String) -> Self {
        Self {
            report_tree: report,
            enhanced_summary: EnhancedSummary::Failed {
                error: error.clone(),
            },
            raw_output: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Text-generation backend (allows mocking).
pub trait GenerationClient: Send + Sync {
    /// One non-streaming generation call.
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, EnhanceError>> + Send;
}

/// Suspends the current task between retry attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

impl<T: GenerationClient> GenerationClient for Arc<T> {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, EnhanceError>> + Send {
        (**self).generate(prompt)
    }
}

impl<T: Sleeper> Sleeper for Arc<T> {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        (**self).sleep(duration)
    }
}

/// Production sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
