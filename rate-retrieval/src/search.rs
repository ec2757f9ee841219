//! Retrieval orchestrator: recall, tenant filter, re-rank, precision
//! extraction, scoring, synthesis.

use std::sync::Arc;

use llm_service::LlmServiceProfiles;
use tracing::{debug, info, instrument, warn};
use vector_store::VectorStore;

use crate::errors::{Result, RetrievalError};
use crate::filters::{
    Candidate, attribute_matches, expanded_query, matching_lines, tenant_matches,
};
use crate::precision::{RateAttributeStore, parse_query_tokens};
use crate::rerank::{RerankOutcome, rerank};
use crate::scoring::{ConfidenceBreakdown, ScoringConfig, answer_quality, retrieval_confidence};
use crate::state::{PhaseTracker, PipelinePhase};
use crate::synthesis::{answer, draft_email};
use crate::types::{
    DraftOutcome, PreciseRate, RankedResult, SearchFilters, SearchResponse,
};

/// Pipeline tunables.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Collection holding the rate documents.
    pub collection: String,
    /// Candidates fetched in the recall stage (must exceed `default_k`).
    pub recall_size: usize,
    /// Results returned when the caller does not specify k.
    pub default_k: usize,
    pub scoring: ScoringConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            collection: "rate_sheets".to_string(),
            recall_size: 20,
            default_k: 3,
            scoring: ScoringConfig::default(),
        }
    }
}

/// The retrieval and drafting pipeline.
///
/// Construct once and share via `Arc`; all operations take `&self`.
pub struct RetrievalPipeline {
    store: Arc<VectorStore>,
    svc: Arc<LlmServiceProfiles>,
    rates: Arc<dyn RateAttributeStore>,
    cfg: PipelineConfig,
}

/// Everything the shared stages produce, consumed by both entry points.
struct StageOutput {
    results: Vec<RankedResult>,
    precise: Vec<PreciseRate>,
    confidence: ConfidenceBreakdown,
    total_found: usize,
    model_available: bool,
    tracker: PhaseTracker,
}

impl RetrievalPipeline {
    /// Wires the pipeline over its collaborators.
    pub fn new(
        store: Arc<VectorStore>,
        svc: Arc<LlmServiceProfiles>,
        rates: Arc<dyn RateAttributeStore>,
        cfg: PipelineConfig,
    ) -> Self {
        Self {
            store,
            svc,
            rates,
            cfg,
        }
    }

    /// Two-stage search: recall, tenant + attribute filter, re-rank,
    /// grounded answer.
    ///
    /// # Errors
    /// `Validation` for bad input; store errors (including fatal embedding
    /// failures) propagate. Re-rank and synthesis failures never surface.
    #[instrument(skip_all, fields(tenant = tenant_id, k))]
    pub async fn search(
        &self,
        tenant_id: &str,
        query: &str,
        filters: &SearchFilters,
        k: usize,
    ) -> Result<SearchResponse> {
        validate_request(tenant_id, query)?;
        if k == 0 {
            return Err(RetrievalError::Validation("k must be positive".into()));
        }

        let out = self.run_stages(tenant_id, query, filters, &[], k).await?;

        let model = out.model_available.then_some(&self.svc);
        let answer = answer(model, query, &out.results).await;

        info!(
            returned = out.results.len(),
            found = out.total_found,
            "search complete"
        );
        Ok(SearchResponse {
            answer,
            total_returned: out.results.len(),
            total_found: out.total_found,
            results: out.results,
        })
    }

    /// Confidence-gated draft generation.
    ///
    /// The hard-reject gate returns `skipped = true` with a reason; the
    /// soft-warn gate appends a disclaimer to the draft's note. Both are
    /// normal outcomes.
    ///
    /// # Errors
    /// Same contract as [`RetrievalPipeline::search`].
    #[instrument(skip_all, fields(tenant = tenant_id))]
    pub async fn draft_response(
        &self,
        tenant_id: &str,
        query: &str,
        context_hints: &[String],
    ) -> Result<DraftOutcome> {
        validate_request(tenant_id, query)?;

        let filters = SearchFilters::default();
        let mut out = self
            .run_stages(tenant_id, query, &filters, context_hints, self.cfg.default_k)
            .await?;

        if out.confidence.hard_reject(&self.cfg.scoring) {
            out.tracker.advance(PipelinePhase::RejectedLowConfidence);
            let reason = format!(
                "not enough information: retrieval confidence {:.2} below {:.2} with no exact \
                 rate records",
                out.confidence.base, self.cfg.scoring.hard_reject_floor
            );
            info!(%reason, "draft skipped");
            return Ok(DraftOutcome {
                draft: None,
                confidence_score: out.confidence.final_score,
                answer_quality_score: 0.0,
                precise_match_count: 0,
                skipped: true,
                skip_reason: Some(reason),
            });
        }

        let model = out.model_available.then_some(&self.svc);
        let answer_text = answer(model, query, &out.results).await;
        let mut draft = draft_email(model, query, &answer_text, &out.precise).await;
        let quality = answer_quality(model, query, &draft.body, &out.precise).await;

        if out.confidence.soft_warn(&self.cfg.scoring) {
            if !draft.confidence_note.is_empty() {
                draft.confidence_note.push(' ');
            }
            draft.confidence_note.push_str(
                "Low retrieval confidence: verify all figures against the source rate sheets \
                 before sending.",
            );
        }

        out.tracker.advance(PipelinePhase::Drafted);
        info!(
            confidence = out.confidence.final_score,
            quality,
            precise = out.precise.len(),
            "draft generated"
        );
        Ok(DraftOutcome {
            draft: Some(draft),
            confidence_score: out.confidence.final_score,
            answer_quality_score: quality,
            precise_match_count: out.precise.len(),
            skipped: false,
            skip_reason: None,
        })
    }

    /// Stages 1 through the scorer, shared by both entry points.
    async fn run_stages(
        &self,
        tenant_id: &str,
        query: &str,
        filters: &SearchFilters,
        context_hints: &[String],
        k: usize,
    ) -> Result<StageOutput> {
        let mut tracker = PhaseTracker::start();

        // Stage 1: recall with the expanded query.
        let recall_query = expanded_query(query, filters, context_hints);
        let hits = self
            .store
            .query(&self.cfg.collection, &[recall_query], self.cfg.recall_size)
            .await?;
        tracker.advance(PipelinePhase::VectorSearched);

        // Stage 1.5: tenant scope, then exact attribute filters.
        let mut candidates = Vec::new();
        if let Some(hits) = hits.into_iter().next() {
            for i in 0..hits.ids.len() {
                let metadata = &hits.metadatas[i];
                if !tenant_matches(metadata, tenant_id) {
                    continue;
                }
                if !attribute_matches(filters, metadata, &hits.documents[i]) {
                    continue;
                }
                candidates.push(Candidate {
                    id: hits.ids[i].clone(),
                    document: hits.documents[i].clone(),
                    metadata: metadata.clone(),
                    similarity: 1.0 - hits.distances[i],
                    matching_lines: matching_lines(&hits.documents[i], query),
                });
            }
        }
        let total_found = candidates.len();
        tracker.advance(PipelinePhase::TenantFiltered);
        debug!(total_found, "candidates after filtering");

        // Stage 2: re-rank (model or deterministic, never an error).
        let model_available = self.svc.is_available().await;
        let svc = model_available.then_some(&self.svc);
        let outcome = rerank(svc, query, candidates, k).await;
        if let RerankOutcome::Fallback { reason, .. } = &outcome {
            debug!(%reason, "similarity-order fallback used");
        }
        let results = outcome.into_results();
        tracker.advance(PipelinePhase::Reranked);

        // Precision extraction: grounding signal only, zero results is fine
        // and a lookup failure downgrades rather than fails the request.
        let tokens = parse_query_tokens(query);
        let ids: Vec<String> = results.iter().map(|r| r.id.clone()).collect();
        let precise = match self.rates.find_rates(&ids, &tokens).await {
            Ok(found) => found,
            Err(err) => {
                warn!(error = %err, "precision lookup failed, continuing without exact records");
                Vec::new()
            }
        };
        tracker.advance(PipelinePhase::PrecisionExtracted);

        let similarities: Vec<f32> = results.iter().map(|r| r.similarity).collect();
        let confidence =
            retrieval_confidence(&similarities, &precise, &tokens, &self.cfg.scoring);
        tracker.advance(PipelinePhase::Scored);

        Ok(StageOutput {
            results,
            precise,
            confidence,
            total_found,
            model_available,
            tracker,
        })
    }
}

fn validate_request(tenant_id: &str, query: &str) -> Result<()> {
    if tenant_id.trim().is_empty() {
        return Err(RetrievalError::Validation("tenant id must not be empty".into()));
    }
    if query.trim().is_empty() {
        return Err(RetrievalError::Validation("query must not be empty".into()));
    }
    Ok(())
}
