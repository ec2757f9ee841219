//! Provider kinds and per-model configuration.

use crate::error::{ConfigError, Result, validate_http_endpoint};

/// Backend used for LLM inference and embeddings.
///
/// Extending to further providers (Anthropic, Mistral API, ...) is a matter
/// of adding a variant and a client module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmProvider {
    /// Local Ollama runtime.
    Ollama,
    /// OpenAI REST API.
    OpenAi,
}

/// Configuration for one model invocation profile.
///
/// Contains both general and provider-specific parameters; the same struct
/// is used for generation and embedding profiles.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmModelConfig {
    /// The LLM provider/backend.
    pub provider: LlmProvider,
    /// Model identifier (e.g. `"gpt-4o-mini"`, `"qwen3:14b"`).
    pub model: String,
    /// Inference endpoint base URL.
    pub endpoint: String,
    /// Optional API key for authentication.
    pub api_key: Option<String>,
    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
}

impl LlmModelConfig {
    /// Validates the fields a client constructor relies on.
    ///
    /// # Errors
    /// Returns [`ConfigError`] variants for an empty model, a malformed
    /// endpoint, or a missing OpenAI key.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel.into());
        }
        validate_http_endpoint(&self.endpoint)?;
        if self.provider == LlmProvider::OpenAi && self.api_key.is_none() {
            return Err(ConfigError::MissingApiKey.into());
        }
        Ok(())
    }
}
