use super::parser::parse_model_output;
use super::prompt::build_enhancement_prompt;
use super::types::{EnhancedSummary, GenerationClient, ReportBundle, Sleeper, TokioSleeper};
use super::EnhanceError;
use crate::config::EnhancerConfig;
use crate::report::InputReport;

/// Runs prompt → remote call → output recovery, retrying transient failures
/// with exponential backoff.
pub struct ResilientEnhancer<C, S = TokioSleeper> {
    client: C,
    sleeper: S,
    config: EnhancerConfig,
}

impl<C: GenerationClient> ResilientEnhancer<C> {
    pub fn new(client: C, config: EnhancerConfig) -> Self {
        Self::with_sleeper(client, TokioSleeper, config)
    }
}

impl<C: GenerationClient, S: Sleeper> ResilientEnhancer<C, S> {
    pub fn with_sleeper(client: C, sleeper: S, config: EnhancerConfig) -> Self {
        Self {
            client,
            sleeper,
            config,
        }
    }

    pub fn config(&self) -> &EnhancerConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Enhance `report`. Never fails: exhausted retries come back as a bundle
    /// carrying the last error.
    #[tracing::instrument(skip_all, fields(model = %self.config.model))]
    pub async fn enhance(&self, report: InputReport) -> ReportBundle {
        let prompt = build_enhancement_prompt(&report);
        let max_attempts = self.config.max_attempts();
        let mut last_error: Option<EnhanceError> = None;

        for attempt in 1..=max_attempts {
            match self.attempt(&prompt).await {
                Ok((summary, raw)) => {
                    tracing::debug!(attempt, "Enhancement succeeded");
                    return ReportBundle::enhanced(report, summary, raw);
                }
                Err(e) => {
                    if attempt < max_attempts {
                        let delay = self.config.backoff_delay(attempt);
                        tracing::warn!(
                            attempt,
                            max_attempts,
                            error = %e,
                            delay_secs = delay.as_secs_f64(),
                            "Enhancement attempt failed, retrying"
                        );
                        self.sleeper.sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        tracing::error!(error = %message, max_attempts, "Enhancement failed after retries");
        ReportBundle::failed(report, message)
    }

    async fn attempt(&self, prompt: &str) -> Result<(EnhancedSummary, String), EnhanceError> {
        let raw = self.client.generate(prompt).await?;
        let summary = parse_model_output(&raw)?;
        Ok((summary, raw))
    }
}
