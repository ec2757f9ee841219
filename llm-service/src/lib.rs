//! Shared LLM service for the rate-ai pipeline.
//!
//! One crate owns every outbound model call the pipeline makes:
//! - text generation for re-ranking, answer synthesis, and draft grading,
//! - embeddings for the vector store,
//! - health probes so callers can branch on availability instead of
//!   scattering connectivity checks.
//!
//! Construct [`profiles::LlmServiceProfiles`] once, wrap it in `Arc`, and
//! hand clones to dependents. Every request carries an explicit timeout.

pub mod error;
pub mod health;
pub mod ollama;
pub mod openai;
pub mod profiles;
pub mod provider;
pub mod telemetry;

pub use error::{ConfigError, LlmError};
pub use health::{HealthService, HealthStatus};
pub use profiles::LlmServiceProfiles;
pub use provider::{LlmModelConfig, LlmProvider};
