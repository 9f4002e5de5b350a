//! Runtime configuration for the enhancement pipeline and the analysis cache.
//!
//! Every value has a built-in default; `from_env()` overrides them from the
//! process environment. Parsing goes through a lookup function so tests can
//! supply variables without mutating global state.

use std::time::Duration;

use serde::Serialize;

/// Application-level constants
pub const APP_NAME: &str = "cca";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_MODEL: &str = "deepseek-coder:6.7b";
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Settings for the remote generation call and its retry loop.
#[derive(Debug, Clone, Serialize)]
pub struct EnhancerConfig {
    /// Model identifier sent with every generate request.
    pub model: String,
    /// Base URL of the Ollama instance, without trailing slash.
    pub host: String,
    /// Upper bound for a single HTTP request.
    pub timeout: Duration,
    /// Extra attempts after the first one.
    pub retries: u32,
    /// Delay before retry `n` is `backoff_multiplier^n` seconds.
    pub backoff_multiplier: f64,
    /// Responses longer than this (in characters) are cut. `None` = unlimited.
    pub max_response_chars: Option<usize>,
}

impl Default for EnhancerConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            host: DEFAULT_OLLAMA_HOST.to_string(),
            timeout: Duration::from_secs(300),
            retries: 2,
            backoff_multiplier: 1.5,
            max_response_chars: Some(200_000),
        }
    }
}

impl EnhancerConfig {
    /// Delay to wait before retrying after failed attempt `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        Duration::try_from_secs_f64(self.backoff_multiplier.powi(exponent))
            .unwrap_or(Duration::MAX)
    }

    /// Total attempts the enhancer makes (first call + retries).
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Bounds for the analysis result cache.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_entries: 500,
        }
    }
}

/// Defaults applied to analysis requests that do not set them explicitly.
#[derive(Debug, Clone, Serialize)]
pub struct RequestDefaults {
    pub branch: String,
    pub max_files: usize,
    pub ignore_tests: bool,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            branch: "main".to_string(),
            max_files: 1000,
            ignore_tests: true,
        }
    }
}

/// Complete configuration surface.
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub enhancer: EnhancerConfig,
    pub cache: CacheConfig,
    pub requests: RequestDefaults,
    /// Fallback tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            enhancer: EnhancerConfig::default(),
            cache: CacheConfig::default(),
            requests: RequestDefaults::default(),
            log_level: "info".to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Environment loading
// ═══════════════════════════════════════════════════════════

impl AppConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(model) = lookup("CCA_MODEL") {
            config.enhancer.model = model;
        }
        if let Some(host) = lookup("OLLAMA_HOST") {
            config.enhancer.host = host.trim_end_matches('/').to_string();
        }
        if let Some(secs) = parse_var::<f64>(&lookup, "CCA_ENHANCER_TIMEOUT")? {
            config.enhancer.timeout = Duration::try_from_secs_f64(secs)
                .ok()
                .filter(|timeout| !timeout.is_zero())
                .ok_or_else(|| ConfigError::Invalid {
                    var: "CCA_ENHANCER_TIMEOUT",
                    value: secs.to_string(),
                })?;
        }
        if let Some(retries) = parse_var(&lookup, "CCA_ENHANCER_RETRIES")? {
            config.enhancer.retries = retries;
        }
        if let Some(multiplier) = parse_var::<f64>(&lookup, "CCA_RETRY_BACKOFF")? {
            if !multiplier.is_finite() || multiplier < 0.0 {
                return Err(ConfigError::Invalid {
                    var: "CCA_RETRY_BACKOFF",
                    value: multiplier.to_string(),
                });
            }
            config.enhancer.backoff_multiplier = multiplier;
        }
        if let Some(max_chars) = parse_var::<usize>(&lookup, "CCA_MAX_RESPONSE_CHARS")? {
            config.enhancer.max_response_chars = (max_chars > 0).then_some(max_chars);
        }

        if let Some(ttl) = parse_var(&lookup, "CACHE_TTL")? {
            config.cache.ttl = Duration::from_secs(ttl);
        }
        if let Some(max_entries) = parse_var::<usize>(&lookup, "MAX_CACHE_SIZE")? {
            if max_entries == 0 {
                return Err(ConfigError::Zero("MAX_CACHE_SIZE"));
            }
            config.cache.max_entries = max_entries;
        }

        if let Some(branch) = lookup("CCA_BRANCH") {
            config.requests.branch = branch;
        }
        if let Some(max_files) = parse_var(&lookup, "CCA_MAX_FILES")? {
            config.requests.max_files = max_files;
        }
        if let Some(flag) = lookup("CCA_IGNORE_TESTS") {
            config.requests.ignore_tests = flag.trim().eq_ignore_ascii_case("true");
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level.to_lowercase();
        }

        Ok(config)
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}
