//! Structural reports handed to the enhancer, and the request that produced them.
//!
//! The analyzer that walks a repository lives outside this crate; it is
//! reached through the `ReportSource` capability.

use serde::{Deserialize, Serialize};

use crate::cache::CacheKey;
use crate::config::RequestDefaults;

/// Marker appended to a rendering cut by `truncated_full`.
const TRUNCATION_MARKER: &str = "\n\n... (truncated due to length)";

// ═══════════════════════════════════════════════════════════
// InputReport
// ═══════════════════════════════════════════════════════════

/// Caller-supplied structural summary of a codebase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputReport {
    pub heading: String,
    pub tree: String,
    pub details: String,
}

impl InputReport {
    pub fn new(heading: &str, tree: &str, details: &str) -> Self {
        Self {
            heading: heading.to_string(),
            tree: tree.to_string(),
            details: details.to_string(),
        }
    }

    /// Placeholder used when the analyzer found nothing to report.
    pub fn no_data() -> Self {
        Self::new(
            "No Data",
            "No directory structure available",
            "No code details available",
        )
    }

    /// Single Markdown rendering of all three sections.
    pub fn full(&self) -> String {
        format!(
            "{}\n\n## Tree Structure:\n{}\n\n## Detailed Description:\n{}",
            self.heading, self.tree, self.details
        )
    }

    /// `full()` cut to at most `limit` characters, with a trailing marker when cut.
    pub fn truncated_full(&self, limit: usize) -> (String, bool) {
        let full = self.full();
        match full.char_indices().nth(limit) {
            None => (full, false),
            Some((byte_idx, _)) => {
                tracing::warn!(
                    original_chars = full.chars().count(),
                    limit,
                    "Report rendering truncated"
                );
                (format!("{}{TRUNCATION_MARKER}", &full[..byte_idx]), true)
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// AnalysisRequest
// ═══════════════════════════════════════════════════════════

/// One request to analyze (and enhance) a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// GitHub URL or local path to the repository.
    pub repo_url: String,
    pub branch: String,
    /// Maximum number of files the analyzer may process.
    pub max_files: usize,
    pub ignore_tests: bool,
    /// Serve from (and write to) the result cache.
    pub use_cache: bool,
}

impl AnalysisRequest {
    pub fn new(repo_url: &str) -> Self {
        Self::with_defaults(repo_url, &RequestDefaults::default())
    }

    pub fn with_defaults(repo_url: &str, defaults: &RequestDefaults) -> Self {
        Self {
            repo_url: repo_url.to_string(),
            branch: defaults.branch.clone(),
            max_files: defaults.max_files,
            ignore_tests: defaults.ignore_tests,
            use_cache: true,
        }
    }

    /// Cache identity. Requests that include tests get an extra segment so they
    /// never collide with the default (tests ignored) variant.
    pub fn cache_key(&self) -> CacheKey {
        let key = CacheKey::new(&self.repo_url, &self.branch, self.max_files);
        if self.ignore_tests {
            key
        } else {
            key.with_segment("with-tests")
        }
    }
}

// ═══════════════════════════════════════════════════════════
// ReportSource
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum ReportSourceError {
    #[error("Repository '{0}' could not be acquired: {1}")]
    Acquisition(String, String),

    #[error("Analysis failed: {0}")]
    Analysis(String),
}

/// Produces the structural report for a request (clone + analyze + format).
///
/// Implementations may block; the orchestrator runs them off the async runtime.
pub trait ReportSource: Send + Sync {
    fn analyze(&self, request: &AnalysisRequest) -> Result<InputReport, ReportSourceError>;
}
