//! Candidate re-ranking: model-assisted with a deterministic fallback.
//!
//! The re-ranker never errors to the caller. Backend failure, timeout,
//! malformed output, out-of-range indices, or a candidate set already
//! within k all land on the similarity-ordered fallback, and every result
//! carries a non-empty rationale either way.

use std::collections::HashMap;
use std::sync::Arc;

use llm_service::LlmServiceProfiles;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::filters::Candidate;
use crate::llm_json::parse_reply;
use crate::types::RankedResult;

/// Rationale attached to fallback-ordered results.
pub const FALLBACK_RATIONALE: &str = "ranked by similarity; model re-ranking unavailable";

/// Maximum characters of document content shown per candidate.
const EXCERPT_MAX_CHARS: usize = 600;

/// How the final ordering was produced.
#[derive(Clone, Debug)]
pub enum RerankOutcome {
    /// Model-ordered results plus the model's overall summary.
    Ranked {
        results: Vec<RankedResult>,
        summary: String,
    },
    /// Deterministic similarity ordering.
    Fallback {
        results: Vec<RankedResult>,
        reason: String,
    },
}

impl RerankOutcome {
    /// The ordered results regardless of path.
    pub fn results(&self) -> &[RankedResult] {
        match self {
            RerankOutcome::Ranked { results, .. } => results,
            RerankOutcome::Fallback { results, .. } => results,
        }
    }

    /// Consumes the outcome, returning the results.
    pub fn into_results(self) -> Vec<RankedResult> {
        match self {
            RerankOutcome::Ranked { results, .. } => results,
            RerankOutcome::Fallback { results, .. } => results,
        }
    }
}

#[derive(Deserialize)]
struct RerankReply {
    ranked_indices: Vec<usize>,
    #[serde(default)]
    individual_reasoning: HashMap<String, String>,
    #[serde(default)]
    overall_summary: String,
}

const RERANK_SYSTEM: &str = "You rank freight rate-sheet excerpts by relevance to a customer \
query. Respond with strict JSON only: {\"ranked_indices\": [..], \"individual_reasoning\": \
{\"<index>\": \"why\"}, \"overall_summary\": \"..\"}. Indices are zero-based positions in the \
candidate list. Return at most the requested number of indices, best first.";

/// Orders candidates and attaches rationales, returning at most `k`.
///
/// `svc = None` means the backend was probed unavailable and the model
/// call is skipped outright.
pub async fn rerank(
    svc: Option<&Arc<LlmServiceProfiles>>,
    query: &str,
    candidates: Vec<Candidate>,
    k: usize,
) -> RerankOutcome {
    if candidates.is_empty() {
        return RerankOutcome::Fallback {
            results: Vec::new(),
            reason: "no candidates to rank".into(),
        };
    }
    if candidates.len() <= k {
        debug!(count = candidates.len(), k, "candidate set within k, skipping model");
        return fallback(candidates, k, "candidate count within k".into());
    }
    let Some(svc) = svc else {
        return fallback(candidates, k, "model backend unavailable".into());
    };

    let prompt = build_prompt(query, &candidates, k);
    match svc.generate_fast(&prompt, Some(RERANK_SYSTEM)).await {
        Ok(reply) => match apply_reply(&reply, &candidates, k) {
            Some(outcome) => outcome,
            None => {
                warn!("re-rank reply malformed, falling back to similarity order");
                fallback(candidates, k, "model reply malformed".into())
            }
        },
        Err(err) => {
            warn!(error = %err, "re-rank call failed, falling back to similarity order");
            fallback(candidates, k, format!("model call failed: {err}"))
        }
    }
}

fn build_prompt(query: &str, candidates: &[Candidate], k: usize) -> String {
    let mut prompt = format!("Customer query:\n{query}\n\nCandidates ({}):\n", candidates.len());
    for (idx, c) in candidates.iter().enumerate() {
        let mut excerpt = c.document.clone();
        if excerpt.len() > EXCERPT_MAX_CHARS {
            excerpt.truncate(EXCERPT_MAX_CHARS);
        }
        prompt.push_str(&format!("[{idx}] similarity={:.3}\n{excerpt}\n", c.similarity));
        if !c.matching_lines.is_empty() {
            prompt.push_str("matching lines:\n");
            for line in &c.matching_lines {
                prompt.push_str(&format!("  - {line}\n"));
            }
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!("Select the top {k} candidates."));
    prompt
}

/// Validates a model reply against the candidate set. `None` means the
/// reply is unusable and the caller should fall back.
fn apply_reply(reply: &str, candidates: &[Candidate], k: usize) -> Option<RerankOutcome> {
    let parsed: RerankReply = parse_reply(reply)?;
    if parsed.ranked_indices.is_empty() {
        return None;
    }

    let mut seen = Vec::new();
    for idx in parsed.ranked_indices {
        if idx < candidates.len() && !seen.contains(&idx) {
            seen.push(idx);
        }
        if seen.len() == k {
            break;
        }
    }
    if seen.is_empty() {
        return None;
    }

    let results = seen
        .iter()
        .enumerate()
        .map(|(rank, &idx)| {
            let c = &candidates[idx];
            let rationale = parsed
                .individual_reasoning
                .get(&idx.to_string())
                .map(String::as_str)
                .filter(|r| !r.trim().is_empty())
                .unwrap_or("selected by model re-ranking")
                .to_string();
            RankedResult {
                id: c.id.clone(),
                document: c.document.clone(),
                metadata: c.metadata.clone(),
                similarity: c.similarity,
                rank: rank + 1,
                rationale,
            }
        })
        .collect();

    Some(RerankOutcome::Ranked {
        results,
        summary: parsed.overall_summary,
    })
}

fn fallback(mut candidates: Vec<Candidate>, k: usize, reason: String) -> RerankOutcome {
    // Recall order is already similarity-descending; sort defensively in
    // case a filter stage reordered.
    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(k);

    let results = candidates
        .into_iter()
        .enumerate()
        .map(|(rank, c)| RankedResult {
            id: c.id,
            document: c.document,
            metadata: c.metadata,
            similarity: c.similarity,
            rank: rank + 1,
            rationale: FALLBACK_RATIONALE.to_string(),
        })
        .collect();

    RerankOutcome::Fallback { results, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn candidate(id: &str, similarity: f32) -> Candidate {
        Candidate {
            id: id.to_string(),
            document: format!("doc {id}"),
            metadata: BTreeMap::new(),
            similarity,
            matching_lines: Vec::new(),
        }
    }

    #[tokio::test]
    async fn small_candidate_set_skips_model() {
        let cands = vec![candidate("a", 0.9), candidate("b", 0.7)];
        let outcome = rerank(None, "q", cands, 3).await;
        let RerankOutcome::Fallback { results, reason } = outcome else {
            panic!("expected fallback");
        };
        assert_eq!(reason, "candidate count within k");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert_eq!(results[0].rank, 1);
        assert!(!results[0].rationale.is_empty());
    }

    #[tokio::test]
    async fn unavailable_backend_falls_back_with_k_results() {
        let cands = vec![
            candidate("a", 0.5),
            candidate("b", 0.9),
            candidate("c", 0.7),
            candidate("d", 0.6),
        ];
        let outcome = rerank(None, "q", cands, 3).await;
        let results = outcome.into_results();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, "b");
        assert_eq!(results[1].id, "c");
        assert_eq!(results[2].id, "d");
        assert!(results.iter().all(|r| r.rationale == FALLBACK_RATIONALE));
    }

    #[test]
    fn reply_with_bad_indices_is_rejected() {
        let cands = vec![candidate("a", 0.9), candidate("b", 0.7)];
        assert!(apply_reply(r#"{"ranked_indices": [9, 12]}"#, &cands, 2).is_none());
        assert!(apply_reply(r#"{"ranked_indices": []}"#, &cands, 2).is_none());
        assert!(apply_reply("not json", &cands, 2).is_none());
    }

    #[test]
    fn reply_reasoning_maps_to_results() {
        let cands = vec![candidate("a", 0.9), candidate("b", 0.7), candidate("c", 0.5)];
        let reply = r#"{"ranked_indices": [2, 0], "individual_reasoning": {"2": "matches route", "0": "matches size"}, "overall_summary": "two good options"}"#;
        let outcome = apply_reply(reply, &cands, 2).unwrap();
        let RerankOutcome::Ranked { results, summary } = outcome else {
            panic!("expected ranked");
        };
        assert_eq!(summary, "two good options");
        assert_eq!(results[0].id, "c");
        assert_eq!(results[0].rationale, "matches route");
        assert_eq!(results[1].id, "a");
        assert_eq!(results[1].rank, 2);
    }

    #[test]
    fn reply_with_duplicates_dedupes() {
        let cands = vec![candidate("a", 0.9), candidate("b", 0.7), candidate("c", 0.5)];
        let reply = r#"{"ranked_indices": [1, 1, 0]}"#;
        let outcome = apply_reply(reply, &cands, 2).unwrap();
        let results = outcome.into_results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "b");
        assert_eq!(results[1].id, "a");
    }
}
