//! Defensive parsing of model output.
//!
//! Models wrap JSON in markdown fences, prepend chatter, or answer in loose
//! `KEY: value` lines. Everything here is tolerant of the wrapping and strict
//! about the payload.

use serde::de::DeserializeOwned;

use crate::error::LlmError;

/// Pull the JSON object out of a model reply.
///
/// Strips ```` ```json ```` fences when present, then takes the span from the
/// first `{` to the last `}`.
///
/// # Errors
///
/// Returns [`LlmError::ParseError`] if no object-shaped span exists.
pub fn extract_json(text: &str) -> Result<&str, LlmError> {
    let body = strip_fences(text);
    let start = body.find('{');
    let end = body.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if s < e => Ok(&body[s..=e]),
        _ => Err(LlmError::ParseError(format!(
            "no JSON object in reply: '{}'",
            preview(text)
        ))),
    }
}

/// [`extract_json`] followed by deserialization into `T`.
///
/// # Errors
///
/// Returns [`LlmError::ParseError`] for malformed JSON and
/// [`LlmError::SchemaValidation`] when the JSON has the wrong shape.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let json = extract_json(text)?;
    Ok(serde_json::from_str(json)?)
}

/// Value of the first line starting with `prefix` (case-insensitive), trimmed.
///
/// Leading list markers and bold markers (`-`, `*`) are ignored so that
/// `**MOOD:** HAPPY` and `- mood: happy` both match `MOOD:`.
#[must_use]
pub fn extract_prefixed(text: &str, prefix: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let line = line.trim().trim_start_matches(['-', '*', ' ']);
        let head = line.get(..prefix.len())?;
        if !head.eq_ignore_ascii_case(prefix) {
            return None;
        }
        let value = line[prefix.len()..].trim().trim_matches('*').trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// [`extract_prefixed`] parsed as a number.
#[must_use]
pub fn extract_prefixed_f32(text: &str, prefix: &str) -> Option<f32> {
    let raw = extract_prefixed(text, prefix)?;
    // "7/10" and "7.5 (quite strong)" both count as their leading number
    let number: String = raw
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
        .collect();
    number.parse::<f32>().ok().filter(|v| v.is_finite())
}

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.find("```").map(|i| &trimmed[i + 3..]) else {
        return trimmed;
    };
    // skip the language tag line
    let after_tag = after_open.find('\n').map_or(after_open, |i| &after_open[i + 1..]);
    after_tag
        .find("```")
        .map_or(after_tag, |close| &after_tag[..close])
        .trim()
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Tier {
        tier: String,
    }

    #[test]
    fn plain_json_passes_through() {
        assert_eq!(extract_json(r#"{"a": 1}"#).expect("json"), r#"{"a": 1}"#);
    }

    #[test]
    fn fences_and_chatter_are_stripped() {
        let reply = "Sure! Here is the analysis:\n```json\n{\"tier\": \"loved\"}\n```\nHope that helps.";
        let t: Tier = parse_structured(reply).expect("parse");
        assert_eq!(t.tier, "loved");

        let bare_fence = "```\n{\"tier\": \"hated\"}\n```";
        let t: Tier = parse_structured(bare_fence).expect("parse");
        assert_eq!(t.tier, "hated");
    }

    #[test]
    fn missing_object_is_a_parse_error() {
        assert!(matches!(extract_json("no json here"), Err(LlmError::ParseError(_))));
        assert!(matches!(extract_json("} backwards {"), Err(LlmError::ParseError(_))));
    }

    #[test]
    fn wrong_shape_is_a_schema_error() {
        let r = parse_structured::<Tier>(r#"{"tier": 5}"#);
        assert!(matches!(r, Err(LlmError::SchemaValidation(_))));
        let r = parse_structured::<Tier>(r#"{"tier": "loved",}"#);
        assert!(matches!(r, Err(LlmError::ParseError(_))));
    }

    #[test]
    fn prefixed_lines() {
        let reply = "Here you go\n**MOOD:** happy\n- intensity: 7/10\nJOY: +1.5\nSUMMARY: They were kind.";
        assert_eq!(extract_prefixed(reply, "MOOD:").as_deref(), Some("happy"));
        assert_eq!(extract_prefixed_f32(reply, "INTENSITY:"), Some(7.0));
        assert_eq!(extract_prefixed_f32(reply, "JOY:"), Some(1.5));
        assert_eq!(extract_prefixed(reply, "SUMMARY:").as_deref(), Some("They were kind."));
        assert_eq!(extract_prefixed(reply, "ANGER:"), None);
        assert_eq!(extract_prefixed_f32("ANGER: lots", "ANGER:"), None);
    }
}
