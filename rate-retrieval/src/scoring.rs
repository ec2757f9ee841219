//! Confidence and answer-quality scoring.
//!
//! Two independent scores gate drafting:
//! - **Retrieval confidence**: how certain the pipeline is that the right
//!   documents were found. Base is the mean similarity of the final
//!   candidates, boosted by exact structured matches, capped below 1.0.
//! - **Answer quality**: whether a synthesized draft addresses the query
//!   and cites correct figures. Model-graded when a backend is reachable,
//!   heuristic otherwise.
//!
//! Gates: hard reject (no draft) when base confidence is under the floor
//! with zero precise records; soft warn (disclaimer appended) when the
//! final confidence stays under the lower floor.

use std::sync::Arc;

use llm_service::LlmServiceProfiles;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::llm_json::parse_reply;
use crate::precision::QueryTokens;
use crate::types::PreciseRate;

/// Tunable scoring constants. The defaults carry the empirically chosen
/// production values.
#[derive(Clone, Debug)]
pub struct ScoringConfig {
    /// Weight of the structured-match boost.
    pub precision_boost_weight: f32,
    /// Upper bound on final confidence.
    pub confidence_cap: f32,
    /// Below this base, with zero precise records, drafting is rejected.
    pub hard_reject_floor: f32,
    /// Below this final confidence the draft gets a disclaimer.
    pub soft_warn_floor: f32,
    /// Precise-record count treated as full coverage.
    pub coverage_target: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            precision_boost_weight: 0.25,
            confidence_cap: 0.95,
            hard_reject_floor: 0.50,
            soft_warn_floor: 0.40,
            coverage_target: 5,
        }
    }
}

/// Full confidence computation for one request.
#[derive(Clone, Debug)]
pub struct ConfidenceBreakdown {
    pub base: f32,
    pub boost: f32,
    pub final_score: f32,
    pub precise_count: usize,
    pub exact_field_matches: usize,
}

impl ConfidenceBreakdown {
    /// True when the hard-reject gate fires: weak retrieval and no exact
    /// structured grounding at all.
    pub fn hard_reject(&self, cfg: &ScoringConfig) -> bool {
        self.base < cfg.hard_reject_floor && self.precise_count == 0
    }

    /// True when the draft should carry a low-confidence disclaimer.
    pub fn soft_warn(&self, cfg: &ScoringConfig) -> bool {
        self.final_score < cfg.soft_warn_floor
    }
}

/// Computes retrieval confidence from candidate similarities and precise
/// structured matches.
pub fn retrieval_confidence(
    similarities: &[f32],
    precise: &[PreciseRate],
    tokens: &QueryTokens,
    cfg: &ScoringConfig,
) -> ConfidenceBreakdown {
    let base = if similarities.is_empty() {
        0.0
    } else {
        let mean = similarities.iter().sum::<f32>() / similarities.len() as f32;
        mean.clamp(0.0, 1.0)
    };

    let precise_count = precise.len();
    let exact_field_matches = precise
        .iter()
        .filter(|r| exact_match(r, tokens))
        .count();

    let boost = if precise_count == 0 {
        0.0
    } else {
        let match_quality = exact_field_matches as f32 / precise_count as f32;
        let coverage = (precise_count as f32 / cfg.coverage_target as f32).min(1.0);
        cfg.precision_boost_weight * match_quality * coverage
    };

    let final_score = (base + boost).min(cfg.confidence_cap);
    debug!(base, boost, final_score, precise_count, "confidence computed");

    ConfidenceBreakdown {
        base,
        boost,
        final_score,
        precise_count,
        exact_field_matches,
    }
}

/// A precise record counts as an exact field match when it agrees with
/// every token category the query actually constrained.
fn exact_match(rate: &PreciseRate, tokens: &QueryTokens) -> bool {
    if tokens.is_empty() {
        return false;
    }
    if !tokens.container_types.is_empty()
        && !tokens
            .container_types
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&rate.container_type))
    {
        return false;
    }
    if !tokens.locations.is_empty() {
        let hit = tokens.locations.iter().all(|loc| {
            let loc = loc.to_lowercase();
            rate.origin_port.to_lowercase().contains(&loc)
                || rate.destination_port.to_lowercase().contains(&loc)
        });
        if !hit {
            return false;
        }
    }
    true
}

#[derive(Deserialize)]
struct GradeReply {
    completeness: f32,
    accuracy: f32,
    relevance: f32,
}

const GRADING_SYSTEM: &str = "You grade drafted freight-rate replies. Respond with strict JSON \
only: {\"completeness\": 0..1, \"accuracy\": 0..1, \"relevance\": 0..1}.";

/// Scores how well `answer` addresses `query`, in [0, 1].
///
/// Tries the fast model profile first; any backend or parse failure falls
/// through to [`heuristic_quality`]. Never errors.
pub async fn answer_quality(
    svc: Option<&Arc<LlmServiceProfiles>>,
    query: &str,
    answer: &str,
    precise: &[PreciseRate],
) -> f32 {
    if let Some(svc) = svc {
        let prompt = format!(
            "Customer query:\n{query}\n\nDrafted reply:\n{answer}\n\nGrade the reply."
        );
        match svc.generate_fast(&prompt, Some(GRADING_SYSTEM)).await {
            Ok(reply) => {
                if let Some(grade) = parse_reply::<GradeReply>(&reply) {
                    let avg = (grade.completeness + grade.accuracy + grade.relevance) / 3.0;
                    return avg.clamp(0.0, 1.0);
                }
                warn!("quality grade reply unparseable, using heuristic");
            }
            Err(err) => {
                warn!(error = %err, "quality grading unavailable, using heuristic");
            }
        }
    }
    heuristic_quality(query, answer, precise)
}

/// Deterministic quality heuristic:
/// keyword coverage + numeric citations + structural completeness, with
/// small bonuses for citing most precise values and comprehensive length.
pub fn heuristic_quality(query: &str, answer: &str, precise: &[PreciseRate]) -> f32 {
    let answer_lower = answer.to_lowercase();

    let keywords: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.len() >= 4)
        .map(str::to_string)
        .collect();
    let coverage = if keywords.is_empty() {
        0.5
    } else {
        keywords.iter().filter(|k| answer_lower.contains(*k)).count() as f32
            / keywords.len() as f32
    };

    let cited = precise
        .iter()
        .filter(|r| cites_rate(&answer_lower, r))
        .count();
    let numeric = if precise.is_empty() {
        0.5
    } else {
        cited as f32 / precise.len() as f32
    };

    // Structural completeness: multiple sentences and at least one figure.
    let sentences = answer.split(['.', '!', '?']).filter(|s| !s.trim().is_empty()).count();
    let has_digits = answer.chars().any(|c| c.is_ascii_digit());
    let structure = match (sentences >= 2, has_digits) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.5,
        (false, false) => 0.0,
    };

    let mut score = 0.4 * coverage + 0.3 * numeric + 0.3 * structure;
    if !precise.is_empty() && cited * 2 > precise.len() {
        score += 0.05;
    }
    if answer.len() > 400 {
        score += 0.03;
    }
    score.min(1.0)
}

fn cites_rate(answer_lower: &str, rate: &PreciseRate) -> bool {
    let plain = format!("{}", rate.base_rate);
    let no_decimals = format!("{:.0}", rate.base_rate);
    answer_lower.contains(&plain) || answer_lower.contains(&no_decimals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precision::parse_query_tokens;

    fn rate(container: &str, base: f64) -> PreciseRate {
        PreciseRate {
            document_id: "doc".into(),
            origin_port: "Shanghai".into(),
            destination_port: "Rotterdam".into(),
            container_type: container.into(),
            base_rate: base,
            currency: "USD".into(),
            weight_limit_kg: None,
            transit_days: None,
            valid_until: None,
        }
    }

    #[test]
    fn base_is_mean_similarity() {
        let b = retrieval_confidence(&[0.8, 0.6], &[], &QueryTokens::default(), &ScoringConfig::default());
        assert!((b.base - 0.7).abs() < 1e-6);
        assert_eq!(b.boost, 0.0);
        assert_eq!(b.final_score, b.base);
    }

    #[test]
    fn no_candidates_gives_zero_base() {
        let b = retrieval_confidence(&[], &[], &QueryTokens::default(), &ScoringConfig::default());
        assert_eq!(b.base, 0.0);
        assert!(b.hard_reject(&ScoringConfig::default()));
    }

    #[test]
    fn boost_caps_at_configured_maximum() {
        let cfg = ScoringConfig::default();
        let tokens = parse_query_tokens("20ft from Shanghai to Rotterdam");
        let precise: Vec<PreciseRate> = (0..6).map(|_| rate("20ft", 1500.0)).collect();
        let b = retrieval_confidence(&[0.9, 0.9], &precise, &tokens, &cfg);
        // base 0.9 + full boost 0.25 would exceed the cap.
        assert_eq!(b.final_score, cfg.confidence_cap);
        assert_eq!(b.exact_field_matches, 6);
    }

    #[test]
    fn hard_reject_needs_both_conditions() {
        let cfg = ScoringConfig::default();
        let weak_no_precise =
            retrieval_confidence(&[0.3], &[], &QueryTokens::default(), &cfg);
        assert!(weak_no_precise.hard_reject(&cfg));

        let weak_with_precise =
            retrieval_confidence(&[0.3], &[rate("20ft", 1500.0)], &QueryTokens::default(), &cfg);
        assert!(!weak_with_precise.hard_reject(&cfg));

        let strong = retrieval_confidence(&[0.8], &[], &QueryTokens::default(), &cfg);
        assert!(!strong.hard_reject(&cfg));
    }

    #[test]
    fn soft_warn_below_floor() {
        let cfg = ScoringConfig::default();
        let b = retrieval_confidence(&[0.2], &[rate("20ft", 1500.0)], &QueryTokens::default(), &cfg);
        assert!(!b.hard_reject(&cfg));
        assert!(b.soft_warn(&cfg));
    }

    #[test]
    fn heuristic_rewards_citations() {
        let precise = vec![rate("20ft", 1500.0), rate("40hc", 2100.0)];
        let cited = heuristic_quality(
            "rate for 20ft Shanghai Rotterdam",
            "The 20ft rate from Shanghai to Rotterdam is USD 1500. The 40hc option is USD 2100.",
            &precise,
        );
        let uncited = heuristic_quality(
            "rate for 20ft Shanghai Rotterdam",
            "We will get back to you.",
            &precise,
        );
        assert!(cited > uncited);
        assert!(cited <= 1.0);
    }

    #[tokio::test]
    async fn quality_without_backend_uses_heuristic() {
        let precise = vec![rate("20ft", 1500.0)];
        let q = answer_quality(None, "20ft rate Shanghai", "Rate is 1500 USD. Valid this month.", &precise).await;
        assert!(q > 0.0 && q <= 1.0);
    }
}
