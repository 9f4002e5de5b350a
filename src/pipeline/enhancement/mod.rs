pub mod types;
pub mod prompt;
pub mod parser;
pub mod ollama;
pub mod enhancer;
pub mod orchestrator;

pub use types::*;
pub use prompt::*;
pub use parser::*;
pub use ollama::*;
pub use enhancer::*;
pub use orchestrator::*;

use std::time::Duration;

use thiserror::Error;

/// Failures of a single enhancement attempt.
///
/// Everything except `EmptyResponse` is a transport failure; both kinds are
/// retried by the enhancer and never escape the orchestrator.
#[derive(Error, Debug)]
pub enum EnhanceError {
    #[error("Ollama is not running at {0}")]
    OllamaConnection(String),

    #[error("Ollama API error {status}: {body}")]
    OllamaError { status: u16, body: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Empty model response")]
    EmptyResponse,
}

impl EnhanceError {
    /// Network, status, timeout or body-decoding failure of the remote call.
    pub fn is_transport(&self) -> bool {
        !matches!(self, Self::EmptyResponse)
    }
}
