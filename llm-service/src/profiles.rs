//! Shared LLM service with three active profiles: `fast`, `slow`, and
//! `embedding`.
//!
//! - Lives in the same Tokio runtime as the application.
//! - Construct once, wrap in `Arc`, pass clones to dependents.
//! - Caches underlying HTTP clients per config (endpoint+model+key+timeout).
//! - `fast` serves re-ranking and draft grading, `slow` serves answer and
//!   draft synthesis (falls back to `fast` when not provided), `embedding`
//!   serves the vector store.

use std::{
    collections::HashMap,
    hash::{Hash, Hasher},
    sync::Arc,
};

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::health::{HealthService, HealthStatus};
use crate::ollama::OllamaService;
use crate::openai::OpenAiService;
use crate::provider::{LlmModelConfig, LlmProvider};

/// Shared service that manages the fast/slow/embedding profiles.
pub struct LlmServiceProfiles {
    fast: LlmModelConfig,
    slow: LlmModelConfig,
    embedding: LlmModelConfig,

    ollama: RwLock<HashMap<ClientKey, Arc<OllamaService>>>,
    openai: RwLock<HashMap<ClientKey, Arc<OpenAiService>>>,

    health: HealthService,
}

impl LlmServiceProfiles {
    /// Creates a new service with three profiles.
    ///
    /// - `fast`: required fast profile.
    /// - `slow_opt`: optional quality profile; `None` falls back to `fast`.
    /// - `embedding`: required embedding profile.
    /// - `health_timeout_secs`: optional timeout for the health checker.
    ///
    /// All configs are validated eagerly so later client construction cannot
    /// fail on bad configuration.
    ///
    /// # Errors
    /// Returns [`crate::error::LlmError`] for invalid configs or if the health client
    /// cannot be built.
    pub fn new(
        fast: LlmModelConfig,
        slow_opt: Option<LlmModelConfig>,
        embedding: LlmModelConfig,
        health_timeout_secs: Option<u64>,
    ) -> Result<Self> {
        let slow = slow_opt.unwrap_or_else(|| fast.clone());
        fast.validate()?;
        slow.validate()?;
        embedding.validate()?;

        Ok(Self {
            fast,
            slow,
            embedding,
            ollama: RwLock::new(HashMap::new()),
            openai: RwLock::new(HashMap::new()),
            health: HealthService::new(health_timeout_secs)?,
        })
    }

    /// Generates text using the **fast** profile.
    ///
    /// # Errors
    /// Returns [`crate::error::LlmError`] if generation fails.
    pub async fn generate_fast(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        self.generate_with(&self.fast, prompt, system).await
    }

    /// Generates text using the **slow** profile (quality synthesis).
    pub async fn generate_slow(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        self.generate_with(&self.slow, prompt, system).await
    }

    /// Computes one embedding using the **embedding** profile.
    ///
    /// # Errors
    /// Returns [`crate::error::LlmError`] if the backend call fails; embeddings have no
    /// degraded mode.
    pub async fn embed(&self, input: &str) -> Result<Vec<f32>> {
        match self.embedding.provider {
            LlmProvider::Ollama => {
                let cli = self.get_or_init_ollama(&self.embedding).await?;
                cli.embeddings(input).await
            }
            LlmProvider::OpenAi => {
                let cli = self.get_or_init_openai(&self.embedding).await?;
                cli.embeddings(input).await
            }
        }
    }

    /// Computes embeddings for a batch of texts.
    ///
    /// The whole batch fails on the first backend error: callers must never
    /// receive a partially embedded batch.
    ///
    /// # Errors
    /// Returns the first [`crate::error::LlmError`] encountered.
    pub async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!(count = inputs.len(), "embedding batch");
        let mut out = Vec::with_capacity(inputs.len());
        for input in inputs {
            out.push(self.embed(input).await?);
        }
        Ok(out)
    }

    /// Availability probe for the generation path.
    ///
    /// True when the fast profile passes its health probe. Callers use this
    /// to decide between model-backed and deterministic processing instead
    /// of sprinkling connectivity checks.
    pub async fn is_available(&self) -> bool {
        self.health.check(&self.fast).await.ok
    }

    /// Availability probe for the embedding profile.
    pub async fn embedding_available(&self) -> bool {
        self.health.check(&self.embedding).await.ok
    }

    /// Returns a health snapshot for all distinct profiles.
    ///
    /// Profiles sharing a config are checked once.
    pub async fn health_all(&self) -> Vec<HealthStatus> {
        let mut list = Vec::<LlmModelConfig>::with_capacity(3);
        list.push(self.fast.clone());
        if self.slow != self.fast {
            list.push(self.slow.clone());
        }
        if self.embedding != self.fast && self.embedding != self.slow {
            list.push(self.embedding.clone());
        }
        self.health.check_many(&list).await
    }

    /// Returns references to the current profiles `(fast, slow, embedding)`.
    pub fn profiles(&self) -> (&LlmModelConfig, &LlmModelConfig, &LlmModelConfig) {
        (&self.fast, &self.slow, &self.embedding)
    }

    /* --------------------- Internals --------------------- */

    async fn generate_with(
        &self,
        cfg: &LlmModelConfig,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<String> {
        match cfg.provider {
            LlmProvider::Ollama => {
                let cli = self.get_or_init_ollama(cfg).await?;
                cli.generate(prompt, system).await
            }
            LlmProvider::OpenAi => {
                let cli = self.get_or_init_openai(cfg).await?;
                cli.generate(prompt, system).await
            }
        }
    }

    async fn get_or_init_ollama(&self, cfg: &LlmModelConfig) -> Result<Arc<OllamaService>> {
        let key = ClientKey::from(cfg);
        if let Some(cli) = self.ollama.read().await.get(&key).cloned() {
            return Ok(cli);
        }
        let built = Arc::new(OllamaService::new(cfg.clone())?);
        let mut w = self.ollama.write().await;
        Ok(w.entry(key).or_insert(built).clone())
    }

    async fn get_or_init_openai(&self, cfg: &LlmModelConfig) -> Result<Arc<OpenAiService>> {
        let key = ClientKey::from(cfg);
        if let Some(cli) = self.openai.read().await.get(&key).cloned() {
            return Ok(cli);
        }
        let built = Arc::new(OpenAiService::new(cfg.clone())?);
        let mut w = self.openai.write().await;
        Ok(w.entry(key).or_insert(built).clone())
    }
}

/// Internal cache key identifying unique client configs.
#[derive(Clone, PartialEq, Eq)]
struct ClientKey {
    provider: LlmProvider,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Option<u64>,
}

impl From<&LlmModelConfig> for ClientKey {
    fn from(cfg: &LlmModelConfig) -> Self {
        Self {
            provider: cfg.provider,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
            timeout: cfg.timeout_secs,
        }
    }
}

impl Hash for ClientKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.provider.hash(state);
        self.endpoint.hash(state);
        self.model.hash(state);
        self.api_key.hash(state);
        self.timeout.hash(state);
    }
}
