use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::GenerationClient;
use super::EnhanceError;
use crate::config::{EnhancerConfig, DEFAULT_MODEL, DEFAULT_OLLAMA_HOST};

/// Ollama HTTP client for non-streaming generation.
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
    max_response_chars: Option<usize>,
}

impl OllamaClient {
    /// Create a client for `model` at `base_url` with a per-request timeout.
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, EnhanceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EnhanceError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout,
            max_response_chars: None,
        })
    }

    /// Client configured from the enhancer settings.
    pub fn from_config(config: &EnhancerConfig) -> Result<Self, EnhanceError> {
        Ok(Self::new(&config.host, &config.model, config.timeout)?
            .with_max_response_chars(config.max_response_chars))
    }

    /// Default Ollama instance at localhost:11434 with 5-minute timeout.
    pub fn default_local() -> Result<Self, EnhanceError> {
        Self::new(DEFAULT_OLLAMA_HOST, DEFAULT_MODEL, Duration::from_secs(300))
    }

    /// Cut responses longer than `max` characters. `None` disables the cut.
    pub fn with_max_response_chars(mut self, max: Option<usize>) -> Self {
        self.max_response_chars = max;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn map_send_error(&self, e: reqwest::Error) -> EnhanceError {
        if e.is_timeout() {
            EnhanceError::Timeout(self.timeout)
        } else if e.is_connect() {
            EnhanceError::OllamaConnection(self.base_url.clone())
        } else {
            EnhanceError::HttpClient(e.to_string())
        }
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

impl GenerationClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, EnhanceError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(EnhanceError::OllamaError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaGenerateResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                EnhanceError::Timeout(self.timeout)
            } else {
                EnhanceError::ResponseParsing(e.to_string())
            }
        })?;

        Ok(truncate_chars(parsed.response, self.max_response_chars))
    }
}

/// Keep at most `max` characters of `output`.
fn truncate_chars(output: String, max: Option<usize>) -> String {
    let Some(max) = max else {
        return output;
    };
    match output.char_indices().nth(max) {
        None => output,
        Some((byte_idx, _)) => {
            tracing::warn!(
                original_chars = output.chars().count(),
                max_chars = max,
                "Truncating AI response"
            );
            let mut output = output;
            output.truncate(byte_idx);
            output
        }
    }
}
