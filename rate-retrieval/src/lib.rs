//! Freight rate retrieval and response drafting.
//!
//! Built on the in-process vector store and the shared LLM service:
//! - `search`: recall with an expanded query, tenant-scoped filtering,
//!   model-assisted re-ranking with a deterministic similarity fallback,
//!   and a grounded answer.
//! - `draft_response`: the same retrieval stages plus structured precision
//!   extraction, dual confidence/quality scoring, and confidence-gated
//!   draft-email generation.
//!
//! Model backends are optional at runtime: every model-dependent stage has
//! a deterministic degradation, and only embedding failures are fatal.

mod errors;
mod filters;
mod llm_json;
mod rerank;
mod scoring;
mod search;
mod state;
mod synthesis;
mod types;

pub mod precision;

pub use errors::{Result, RetrievalError};
pub use filters::TENANT_KEY;
pub use precision::{MemoryRateStore, QueryTokens, RateAttributeStore, parse_query_tokens};
pub use rerank::FALLBACK_RATIONALE;
pub use scoring::{ConfidenceBreakdown, ScoringConfig, heuristic_quality, retrieval_confidence};
pub use search::{PipelineConfig, RetrievalPipeline};
pub use state::{PhaseTracker, PipelinePhase};
pub use synthesis::MANUAL_REVIEW_ANSWER;
pub use types::{
    DraftEmail, DraftOutcome, PreciseRate, RankedResult, SearchFilters, SearchResponse,
};
