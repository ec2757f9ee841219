//! Tolerant JSON extraction from model output.
//!
//! Models wrap JSON in markdown fences or chat prose often enough that
//! strict `from_str` on the raw reply is unreliable. Extraction order:
//! fenced block first, then the outermost brace span, then the raw text.

use serde::de::DeserializeOwned;

/// Attempts to deserialize `T` from a model reply.
pub fn parse_reply<T: DeserializeOwned>(reply: &str) -> Option<T> {
    for candidate in candidates(reply) {
        if let Ok(value) = serde_json::from_str::<T>(candidate) {
            return Some(value);
        }
    }
    None
}

fn candidates(reply: &str) -> Vec<&str> {
    let mut out = Vec::new();
    if let Some(fenced) = fenced_block(reply) {
        out.push(fenced);
    }
    if let Some(braced) = brace_span(reply) {
        out.push(braced);
    }
    out.push(reply.trim());
    out
}

/// Content of the first ```...``` block, tolerating a `json` tag.
fn fenced_block(reply: &str) -> Option<&str> {
    let start = reply.find("```")?;
    let after = &reply[start + 3..];
    let after = after.strip_prefix("json").unwrap_or(after);
    let end = after.find("```")?;
    Some(after[..end].trim())
}

/// Span from the first `{` to the last `}`.
fn brace_span(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end > start {
        Some(&reply[start..=end])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, PartialEq, Debug)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn parses_raw_json() {
        let got: Sample = parse_reply(r#"{"value": 3}"#).unwrap();
        assert_eq!(got, Sample { value: 3 });
    }

    #[test]
    fn parses_fenced_json() {
        let reply = "Here you go:\n```json\n{\"value\": 7}\n```\nDone.";
        let got: Sample = parse_reply(reply).unwrap();
        assert_eq!(got, Sample { value: 7 });
    }

    #[test]
    fn parses_json_embedded_in_prose() {
        let reply = "Sure! The result is {\"value\": 9} as requested.";
        let got: Sample = parse_reply(reply).unwrap();
        assert_eq!(got, Sample { value: 9 });
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_reply::<Sample>("no json here").is_none());
    }
}
