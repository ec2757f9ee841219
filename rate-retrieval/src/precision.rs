//! Structured precision extraction.
//!
//! Parses filter tokens out of the free-text query (container types,
//! numeric thresholds, locations, currency amounts) and looks up exact
//! attribute records tied to the shortlisted document ids. Zero tokens is
//! a valid parse and zero records never fails the pipeline: precise rates
//! are a grounding and confidence signal, never the retrieval path.

use std::sync::{OnceLock, PoisonError, RwLock};
use std::{future::Future, pin::Pin};

use regex::Regex;
use tracing::debug;

use crate::errors::Result;
use crate::types::PreciseRate;

/// Unit of a numeric threshold parsed from the query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThresholdUnit {
    /// Metric tons.
    Mt,
    Kg,
    Ft,
}

/// A numeric constraint such as `"25 MT"` or `"18000 kg"`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NumericThreshold {
    pub value: f64,
    pub unit: ThresholdUnit,
}

impl NumericThreshold {
    /// Value in kilograms for weight units, `None` for lengths.
    pub fn as_kg(&self) -> Option<f64> {
        match self.unit {
            ThresholdUnit::Mt => Some(self.value * 1000.0),
            ThresholdUnit::Kg => Some(self.value),
            ThresholdUnit::Ft => None,
        }
    }
}

/// A currency amount such as `"USD 1500"` or `"$1,500"`.
#[derive(Clone, Debug, PartialEq)]
pub struct CurrencyAmount {
    pub currency: String,
    pub amount: f64,
}

/// Filter tokens extracted from a query. Empty vectors mean the query
/// carried no parseable constraints, which is valid.
#[derive(Clone, Debug, Default)]
pub struct QueryTokens {
    /// Normalized forms: `"20ft"`, `"40ft"`, `"40hc"`, `"45hc"`.
    pub container_types: Vec<String>,
    pub locations: Vec<String>,
    pub thresholds: Vec<NumericThreshold>,
    pub currency_amounts: Vec<CurrencyAmount>,
}

impl QueryTokens {
    /// True when nothing was extracted.
    pub fn is_empty(&self) -> bool {
        self.container_types.is_empty()
            && self.locations.is_empty()
            && self.thresholds.is_empty()
            && self.currency_amounts.is_empty()
    }
}

struct Patterns {
    container: Regex,
    container_compact: Regex,
    threshold: Regex,
    currency_prefix: Regex,
    currency_suffix: Regex,
    route: Regex,
}

fn patterns() -> &'static Patterns {
    static CELL: OnceLock<Patterns> = OnceLock::new();
    CELL.get_or_init(|| Patterns {
        // "20 ft", "40'", "40 ft HC"
        container: Regex::new(r"(?i)\b(20|40|45)\s*(?:'|ft|foot|feet)\s*(hc|hq)?\b")
            .expect("valid regex"),
        // "40HC", "20GP", "40RF"
        container_compact: Regex::new(r"(?i)\b(20|40|45)(hc|hq|gp|dv|rf)\b")
            .expect("valid regex"),
        threshold: Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(mt|tons?|tonnes?|kgs?|ft)\b")
            .expect("valid regex"),
        currency_prefix: Regex::new(r"(?i)\b(usd|eur|gbp|inr)\s*(\d[\d,]*(?:\.\d+)?)")
            .expect("valid regex"),
        currency_suffix: Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*(usd|eur|gbp|inr)\b")
            .expect("valid regex"),
        route: Regex::new(r"(?i)\bfrom\s+([a-z][a-z ]{2,}?)\s+to\s+([a-z][a-z ]{2,}?)(?:[,.;?!]|$|\s+(?:for|with|under|by|at|in)\b)")
            .expect("valid regex"),
    })
}

/// Parses filter tokens from a query.
pub fn parse_query_tokens(query: &str) -> QueryTokens {
    let p = patterns();
    let mut tokens = QueryTokens::default();

    for cap in p.container.captures_iter(query) {
        let size = &cap[1];
        let suffix = cap.get(2).map(|m| m.as_str().to_lowercase());
        tokens.container_types.push(normalize_container(size, suffix.as_deref()));
    }
    for cap in p.container_compact.captures_iter(query) {
        let size = &cap[1];
        let suffix = cap[2].to_lowercase();
        tokens.container_types.push(normalize_container(size, Some(&suffix)));
    }
    let mut unique = Vec::with_capacity(tokens.container_types.len());
    for container in tokens.container_types.drain(..) {
        if !unique.contains(&container) {
            unique.push(container);
        }
    }
    tokens.container_types = unique;

    for cap in p.threshold.captures_iter(query) {
        let Ok(value) = cap[1].parse::<f64>() else { continue };
        let unit = match cap[2].to_lowercase().as_str() {
            "mt" | "ton" | "tons" | "tonne" | "tonnes" => ThresholdUnit::Mt,
            "kg" | "kgs" => ThresholdUnit::Kg,
            _ => ThresholdUnit::Ft,
        };
        // "20 ft" is a container, not a length threshold.
        if unit == ThresholdUnit::Ft && matches!(&cap[1], "20" | "40" | "45") {
            continue;
        }
        tokens.thresholds.push(NumericThreshold { value, unit });
    }

    for cap in p.currency_prefix.captures_iter(query) {
        if let Ok(amount) = cap[2].replace(',', "").parse::<f64>() {
            tokens.currency_amounts.push(CurrencyAmount {
                currency: cap[1].to_uppercase(),
                amount,
            });
        }
    }
    for cap in p.currency_suffix.captures_iter(query) {
        if let Ok(amount) = cap[1].replace(',', "").parse::<f64>() {
            let amount_seen = tokens
                .currency_amounts
                .iter()
                .any(|c| (c.amount - amount).abs() < f64::EPSILON);
            if !amount_seen {
                tokens.currency_amounts.push(CurrencyAmount {
                    currency: cap[2].to_uppercase(),
                    amount,
                });
            }
        }
    }

    if let Some(cap) = p.route.captures(query) {
        tokens.locations.push(titlecase(cap[1].trim()));
        tokens.locations.push(titlecase(cap[2].trim()));
    }

    debug!(
        containers = tokens.container_types.len(),
        locations = tokens.locations.len(),
        thresholds = tokens.thresholds.len(),
        amounts = tokens.currency_amounts.len(),
        "query tokens parsed"
    );
    tokens
}

fn normalize_container(size: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some("hc") | Some("hq") => format!("{size}hc"),
        _ => format!("{size}ft"),
    }
}

fn titlecase(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// External structured attribute store queried by candidate ids plus
/// extracted tokens.
pub trait RateAttributeStore: Send + Sync {
    /// Finds exact rate records tied to `document_ids` that satisfy the
    /// extracted tokens. Zero results is a normal outcome.
    fn find_rates<'a>(
        &'a self,
        document_ids: &'a [String],
        tokens: &'a QueryTokens,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PreciseRate>>> + Send + 'a>>;
}

/// In-memory attribute store.
#[derive(Default)]
pub struct MemoryRateStore {
    rates: RwLock<Vec<PreciseRate>>,
}

impl MemoryRateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one rate record.
    pub fn insert(&self, rate: PreciseRate) {
        self.rates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(rate);
    }

    fn rate_matches(rate: &PreciseRate, tokens: &QueryTokens) -> bool {
        if !tokens.container_types.is_empty()
            && !tokens
                .container_types
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&rate.container_type))
        {
            return false;
        }
        if !tokens.locations.is_empty() {
            let hit = tokens.locations.iter().any(|loc| {
                let loc = loc.to_lowercase();
                rate.origin_port.to_lowercase().contains(&loc)
                    || rate.destination_port.to_lowercase().contains(&loc)
            });
            if !hit {
                return false;
            }
        }
        for threshold in &tokens.thresholds {
            if let (Some(wanted_kg), Some(limit_kg)) = (threshold.as_kg(), rate.weight_limit_kg) {
                if limit_kg < wanted_kg {
                    return false;
                }
            }
        }
        true
    }
}

impl RateAttributeStore for MemoryRateStore {
    fn find_rates<'a>(
        &'a self,
        document_ids: &'a [String],
        tokens: &'a QueryTokens,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PreciseRate>>> + Send + 'a>> {
        Box::pin(async move {
            let rates = self.rates.read().unwrap_or_else(PoisonError::into_inner);
            Ok(rates
                .iter()
                .filter(|r| document_ids.iter().any(|id| id == &r.document_id))
                .filter(|r| Self::rate_matches(r, tokens))
                .cloned()
                .collect())
        })
    }
}
