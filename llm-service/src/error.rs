//! Unified error handling for `llm-service`.
//!
//! A single top-level [`LlmError`] covers the whole crate; configuration
//! problems live in the nested [`ConfigError`]. Small helpers for reading
//! environment variables return the unified [`Result`] alias.

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Unified result alias for the entire crate.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Top-level error for the `llm-service` crate.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum LlmError {
    /// Configuration/validation errors (startup/readiness).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Underlying HTTP transport error.
    #[error("[LLM Service] transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-successful HTTP status from upstream.
    #[error("[LLM Service] HTTP {status} from {url}: {snippet}")]
    HttpStatus {
        /// Numeric HTTP status code.
        status: StatusCode,
        /// Request URL.
        url: String,
        /// Short snippet of the response body (trimmed).
        snippet: String,
    },

    /// Response payload could not be decoded as expected.
    #[error("[LLM Service] decode error: {0}")]
    Decode(String),

    /// Operation exceeded the configured timeout.
    #[error("[LLM Service] operation timed out after {0:?}")]
    Timeout(Duration),
}

impl LlmError {
    /// True when the failure is a connectivity/timeout class of error,
    /// i.e. the backend is unreachable rather than misconfigured.
    pub fn is_unavailable(&self) -> bool {
        match self {
            LlmError::Transport(e) => e.is_timeout() || e.is_connect(),
            LlmError::Timeout(_) => true,
            LlmError::HttpStatus { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}

/// Error enum for environment/config-driven setup.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing or empty.
    #[error("[LLM Service] missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// A number failed to parse (ports, limits, timeouts).
    #[error("[LLM Service] invalid number in {var}: {reason}")]
    InvalidNumber {
        /// Variable name (e.g. `LLM_TIMEOUT_SECS`).
        var: &'static str,
        /// Human-readable reason (e.g. `expected u64`).
        reason: &'static str,
    },

    /// Provider mismatch: a client was built with the wrong backend kind.
    #[error("[LLM Service] invalid provider: expected {expected}")]
    InvalidProvider {
        /// The provider the client requires.
        expected: &'static str,
    },

    /// Endpoint was empty or missing an http/https scheme.
    #[error("[LLM Service] invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// API key required but absent (OpenAI).
    #[error("[LLM Service] missing API key for provider")]
    MissingApiKey,

    /// Model name was empty.
    #[error("[LLM Service] model name must not be empty")]
    EmptyModel,
}

/// Trims a response body down to a loggable one-line snippet.
pub fn make_snippet(body: &str) -> String {
    body.chars().take(240).collect::<String>().replace('\n', " ")
}

/// Fetches a required, non-empty environment variable.
///
/// # Errors
/// [`ConfigError::MissingVar`] if the variable is absent or empty.
pub fn must_env(name: &'static str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(name).into()),
    }
}

/// Parses an optional `u64` from env (`Ok(None)` if unset/empty).
///
/// # Errors
/// [`ConfigError::InvalidNumber`] if the variable is set but not a valid `u64`.
pub fn env_opt_u64(name: &'static str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v.parse::<u64>().map(Some).map_err(|_| {
            LlmError::from(ConfigError::InvalidNumber {
                var: name,
                reason: "expected u64",
            })
        }),
        _ => Ok(None),
    }
}

/// Validates that an HTTP endpoint starts with `http://` or `https://`.
///
/// # Errors
/// [`ConfigError::InvalidEndpoint`] otherwise.
pub fn validate_http_endpoint(value: &str) -> Result<()> {
    let v = value.trim();
    if !v.is_empty() && (v.starts_with("http://") || v.starts_with("https://")) {
        Ok(())
    } else {
        Err(ConfigError::InvalidEndpoint(value.to_string()).into())
    }
}
