//! Core data models for the retrieval and drafting pipeline.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Exact-match attribute filters supplied by the caller.
///
/// Every filled field is both applied as a post-recall predicate and
/// appended to the expanded recall query as an extra search term.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    pub carrier: Option<String>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub container_type: Option<String>,
}

impl SearchFilters {
    /// The filled filter values in declaration order.
    pub fn hint_terms(&self) -> Vec<&str> {
        [
            self.carrier.as_deref(),
            self.origin.as_deref(),
            self.destination.as_deref(),
            self.container_type.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// True when no filter field is set.
    pub fn is_empty(&self) -> bool {
        self.hint_terms().is_empty()
    }
}

/// One final ranked candidate. `rationale` is never empty: it carries the
/// model's reasoning or the deterministic-fallback explanation.
#[derive(Clone, Debug, Serialize)]
pub struct RankedResult {
    pub id: String,
    pub document: String,
    pub metadata: BTreeMap<String, String>,
    pub similarity: f32,
    /// 1-based rank position.
    pub rank: usize,
    pub rationale: String,
}

/// Response of the `search` operation.
#[derive(Clone, Debug, Serialize)]
pub struct SearchResponse {
    /// Grounded natural-language answer, or the manual-review fallback.
    pub answer: String,
    pub results: Vec<RankedResult>,
    /// Candidates that survived tenant and attribute filtering.
    pub total_found: usize,
    /// Results actually returned (≤ k).
    pub total_returned: usize,
}

/// A drafted customer reply.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DraftEmail {
    pub subject: String,
    pub body: String,
    /// Caveats for the human reviewer; the low-confidence disclaimer is
    /// appended here when the soft-warn gate fires.
    pub confidence_note: String,
}

/// Terminal outcome of `draft_response`.
///
/// `skipped = true` with a reason is the hard-reject path: a business
/// decision, never an error.
#[derive(Clone, Debug, Serialize)]
pub struct DraftOutcome {
    pub draft: Option<DraftEmail>,
    pub confidence_score: f32,
    pub answer_quality_score: f32,
    pub precise_match_count: usize,
    pub skipped: bool,
    pub skip_reason: Option<String>,
}

/// Exact structured attributes for one rate line, tied to a document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreciseRate {
    pub document_id: String,
    pub origin_port: String,
    pub destination_port: String,
    /// Normalized form, e.g. `"20ft"`, `"40hc"`.
    pub container_type: String,
    pub base_rate: f64,
    pub currency: String,
    pub weight_limit_kg: Option<f64>,
    pub transit_days: Option<u32>,
    pub valid_until: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precise_rate_round_trips_with_validity_date() {
        let rate = PreciseRate {
            document_id: "doc-a".into(),
            origin_port: "Shanghai".into(),
            destination_port: "Rotterdam".into(),
            container_type: "20ft".into(),
            base_rate: 1500.0,
            currency: "USD".into(),
            weight_limit_kg: Some(28_000.0),
            transit_days: Some(32),
            valid_until: NaiveDate::from_ymd_opt(2026, 3, 31),
        };

        let json = serde_json::to_string(&rate).unwrap();
        assert!(json.contains("\"2026-03-31\""));
        let back: PreciseRate = serde_json::from_str(&json).unwrap();
        assert_eq!(back.valid_until, rate.valid_until);
    }
}
