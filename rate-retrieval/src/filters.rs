//! Recall-query expansion, tenant scoping, attribute filtering, and
//! matching-line context extraction.
//!
//! The store has no native predicate filter, so filters are applied twice:
//! appended as extra terms to bias recall, then enforced exactly against
//! the recalled candidates.

use std::collections::BTreeMap;

use tracing::trace;

use crate::types::SearchFilters;

/// Metadata key carrying the owning tenant.
pub const TENANT_KEY: &str = "organization_id";

/// Maximum matching lines carried per candidate into the re-rank prompt.
const MATCH_LINES_PER_CANDIDATE: usize = 3;
/// Maximum length of one carried line.
const MATCH_LINE_MAX_CHARS: usize = 200;

/// One recalled candidate flowing through the filter and re-rank stages.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub id: String,
    pub document: String,
    pub metadata: BTreeMap<String, String>,
    pub similarity: f32,
    /// Document lines containing query terms, for the re-rank prompt.
    pub matching_lines: Vec<String>,
}

/// Builds the expanded recall query: free text plus filter hints and
/// caller-supplied context hints as extra terms.
pub fn expanded_query(query: &str, filters: &SearchFilters, context_hints: &[String]) -> String {
    let mut parts: Vec<&str> = vec![query.trim()];
    parts.extend(filters.hint_terms());
    parts.extend(context_hints.iter().map(String::as_str).filter(|h| !h.trim().is_empty()));
    parts.join(" ")
}

/// True when the candidate belongs to `tenant_id`.
///
/// A record without a tenant tag is never returned to anyone.
pub fn tenant_matches(metadata: &BTreeMap<String, String>, tenant_id: &str) -> bool {
    metadata.get(TENANT_KEY).is_some_and(|owner| owner == tenant_id)
}

/// Applies exact-match attribute filters: each filled field must appear in
/// the matching metadata key or in the document content, case-insensitive.
pub fn attribute_matches(
    filters: &SearchFilters,
    metadata: &BTreeMap<String, String>,
    document: &str,
) -> bool {
    let checks = [
        ("carrier", filters.carrier.as_deref()),
        ("origin", filters.origin.as_deref()),
        ("destination", filters.destination.as_deref()),
        ("container_type", filters.container_type.as_deref()),
    ];
    let doc_lower = document.to_lowercase();
    for (key, wanted) in checks {
        let Some(wanted) = wanted else { continue };
        let wanted_lower = wanted.to_lowercase();
        let meta_hit = metadata
            .get(key)
            .is_some_and(|v| v.to_lowercase() == wanted_lower);
        if !meta_hit && !doc_lower.contains(&wanted_lower) {
            trace!(key, wanted, "candidate dropped by attribute filter");
            return false;
        }
    }
    true
}

/// Extracts document lines containing any of the query terms, capped per
/// candidate. Terms shorter than three characters are skipped as noise.
pub fn matching_lines(document: &str, query: &str) -> Vec<String> {
    let terms: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .filter(|t| t.len() >= 3)
        .map(str::to_string)
        .collect();
    if terms.is_empty() {
        return Vec::new();
    }

    let mut lines = Vec::new();
    for line in document.lines() {
        let lower = line.to_lowercase();
        if terms.iter().any(|t| lower.contains(t)) {
            let mut kept = line.trim().to_string();
            if kept.len() > MATCH_LINE_MAX_CHARS {
                kept.truncate(MATCH_LINE_MAX_CHARS);
            }
            lines.push(kept);
            if lines.len() == MATCH_LINES_PER_CANDIDATE {
                break;
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn expanded_query_appends_hints() {
        let filters = SearchFilters {
            origin: Some("Shanghai".into()),
            container_type: Some("20ft".into()),
            ..Default::default()
        };
        let q = expanded_query("best rate", &filters, &["urgent".to_string()]);
        assert_eq!(q, "best rate Shanghai 20ft urgent");
    }

    #[test]
    fn tenant_gate_requires_exact_owner() {
        assert!(tenant_matches(&meta(&[(TENANT_KEY, "org-1")]), "org-1"));
        assert!(!tenant_matches(&meta(&[(TENANT_KEY, "org-2")]), "org-1"));
        assert!(!tenant_matches(&meta(&[]), "org-1"));
    }

    #[test]
    fn attribute_filter_checks_metadata_then_content() {
        let filters = SearchFilters {
            carrier: Some("Maersk".into()),
            ..Default::default()
        };
        assert!(attribute_matches(
            &filters,
            &meta(&[("carrier", "maersk")]),
            "irrelevant"
        ));
        assert!(attribute_matches(
            &filters,
            &meta(&[]),
            "quoted by MAERSK last week"
        ));
        assert!(!attribute_matches(&filters, &meta(&[]), "quoted by MSC"));
    }

    #[test]
    fn matching_lines_are_capped() {
        let doc = "rate 20ft line one\nrate 20ft line two\nrate 20ft line three\nrate 20ft line four";
        let lines = matching_lines(doc, "20ft rate");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "rate 20ft line one");
    }

    #[test]
    fn short_terms_are_ignored() {
        assert!(matching_lines("to of in", "to of").is_empty());
    }
}
