//! Grounded answer and draft-email synthesis.
//!
//! Both paths are grounded strictly in the final candidates and precise
//! records handed to them. When the model backend is unavailable or its
//! reply unusable, the answer degrades to a fixed manual-review notice and
//! the draft to a template built from the precise figures. Synthesis never
//! fabricates values and never errors to the caller.

use std::sync::Arc;

use llm_service::LlmServiceProfiles;
use tracing::warn;

use crate::llm_json::parse_reply;
use crate::types::{DraftEmail, PreciseRate, RankedResult};

/// Fixed answer when no model is reachable.
pub const MANUAL_REVIEW_ANSWER: &str = "Automated summarization is unavailable. Please review \
the matched rate documents manually before responding.";

const ANSWER_SYSTEM: &str = "You answer freight-rate queries using ONLY the provided document \
excerpts. If the excerpts do not contain the answer, say so plainly. Never invent rates, \
routes, or validity dates.";

const DRAFT_SYSTEM: &str = "You draft customer replies for a freight forwarder using ONLY the \
provided rate data. Respond with strict JSON only: {\"subject\": \"..\", \"body\": \"..\", \
\"confidence_note\": \"..\"}. Never invent figures.";

/// Synthesizes a direct answer grounded in the final candidates.
///
/// `svc = None` (backend probed unavailable) or any call failure returns
/// [`MANUAL_REVIEW_ANSWER`].
pub async fn answer(
    svc: Option<&Arc<LlmServiceProfiles>>,
    query: &str,
    results: &[RankedResult],
) -> String {
    let Some(svc) = svc else {
        return MANUAL_REVIEW_ANSWER.to_string();
    };
    if results.is_empty() {
        return MANUAL_REVIEW_ANSWER.to_string();
    }

    let mut prompt = format!("Query:\n{query}\n\nDocument excerpts:\n");
    for r in results {
        prompt.push_str(&format!("[{}] {}\n", r.rank, r.document));
    }
    prompt.push_str("\nAnswer the query.");

    match svc.generate_slow(&prompt, Some(ANSWER_SYSTEM)).await {
        Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
        Ok(_) => MANUAL_REVIEW_ANSWER.to_string(),
        Err(err) => {
            warn!(error = %err, "answer synthesis failed, returning manual-review notice");
            MANUAL_REVIEW_ANSWER.to_string()
        }
    }
}

/// Drafts a customer reply email.
///
/// The model is asked for strict JSON (markdown fences tolerated); an
/// unusable reply or unavailable backend yields [`template_draft`].
pub async fn draft_email(
    svc: Option<&Arc<LlmServiceProfiles>>,
    query: &str,
    answer: &str,
    precise: &[PreciseRate],
) -> DraftEmail {
    let Some(svc) = svc else {
        return template_draft(query, precise);
    };

    let mut prompt = format!("Customer query:\n{query}\n\nGrounded answer:\n{answer}\n");
    if !precise.is_empty() {
        prompt.push_str("\nExact rate records:\n");
        for r in precise {
            prompt.push_str(&format!("- {}\n", format_rate(r)));
        }
    }
    prompt.push_str("\nDraft the reply email.");

    match svc.generate_slow(&prompt, Some(DRAFT_SYSTEM)).await {
        Ok(reply) => match parse_reply::<DraftEmail>(&reply) {
            Some(draft) if !draft.body.trim().is_empty() => draft,
            _ => {
                warn!("draft reply unparseable, using template");
                template_draft(query, precise)
            }
        },
        Err(err) => {
            warn!(error = %err, "draft synthesis failed, using template");
            template_draft(query, precise)
        }
    }
}

/// Deterministic fallback draft built from precise figures only.
pub fn template_draft(query: &str, precise: &[PreciseRate]) -> DraftEmail {
    let mut body = String::from("Hello,\n\nThank you for your inquiry.");
    if precise.is_empty() {
        body.push_str(
            "\n\nWe are checking our current rate sheets for your request and will follow up \
             with exact figures shortly.",
        );
    } else {
        body.push_str("\n\nBased on our current rate sheets:\n");
        for r in precise {
            body.push_str(&format!("- {}\n", format_rate(r)));
        }
    }
    body.push_str("\nBest regards,\nYour freight team");

    let subject = subject_for(query);
    DraftEmail {
        subject,
        body,
        confidence_note: "Drafted from structured rate data without model assistance; please \
                          verify before sending."
            .to_string(),
    }
}

fn subject_for(query: &str) -> String {
    let mut topic: String = query.split_whitespace().take(8).collect::<Vec<_>>().join(" ");
    if topic.is_empty() {
        topic = "your rate inquiry".to_string();
    }
    format!("Re: {topic}")
}

fn format_rate(r: &PreciseRate) -> String {
    let mut line = format!(
        "{} {} to {}: {} {:.0}",
        r.container_type, r.origin_port, r.destination_port, r.currency, r.base_rate
    );
    if let Some(days) = r.transit_days {
        line.push_str(&format!(", transit {days} days"));
    }
    if let Some(valid) = r.valid_until {
        line.push_str(&format!(", valid until {valid}"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate() -> PreciseRate {
        PreciseRate {
            document_id: "doc".into(),
            origin_port: "Shanghai".into(),
            destination_port: "Rotterdam".into(),
            container_type: "20ft".into(),
            base_rate: 1500.0,
            currency: "USD".into(),
            weight_limit_kg: None,
            transit_days: Some(32),
            valid_until: None,
        }
    }

    #[tokio::test]
    async fn answer_without_backend_is_manual_review() {
        let got = answer(None, "20ft rate?", &[]).await;
        assert_eq!(got, MANUAL_REVIEW_ANSWER);
    }

    #[tokio::test]
    async fn draft_without_backend_uses_template() {
        let precise = vec![rate()];
        let draft = draft_email(None, "20ft Shanghai to Rotterdam rate", "n/a", &precise).await;
        assert!(draft.subject.starts_with("Re: "));
        assert!(draft.body.contains("USD 1500"));
        assert!(draft.body.contains("transit 32 days"));
        assert!(!draft.confidence_note.is_empty());
    }

    #[test]
    fn template_without_precise_promises_follow_up() {
        let draft = template_draft("any rate", &[]);
        assert!(draft.body.contains("follow up"));
        // No figures may appear when nothing is grounded.
        assert!(!draft.body.chars().any(|c| c.is_ascii_digit()));
    }

    #[test]
    fn draft_email_parses_fenced_reply() {
        let reply = "```json\n{\"subject\": \"Re: rates\", \"body\": \"Hello\", \"confidence_note\": \"ok\"}\n```";
        let draft: DraftEmail = crate::llm_json::parse_reply(reply).unwrap();
        assert_eq!(draft.subject, "Re: rates");
    }
}
