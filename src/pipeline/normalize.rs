//! Response normalisation: raw model text → JSON value.
//!
//! Models are told to answer in bare JSON, yet still wrap it in
//! ```` ```json ```` fences, add a sentence of prose, or stop mid-object.
//! The rules here run in a fixed order:
//!
//! 1. Reject text that is clearly not a model answer (NUL bytes, or mostly
//!    control and replacement characters)
//! 2. Take the body of the first code fence, tagged or not
//! 3. Repair near-valid JSON ([`super::repair`])
//! 4. Parse; failure at this point is final
//!
//! Feeding the output back in (serialised) yields the same value.

use super::repair::repair_json;
use crate::error::MalformedResponseError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Longest excerpt of the offending text carried in an error.
const CONTENT_PREVIEW_CHARS: usize = 2_000;

/// The first fenced block, wherever it starts. An unclosed fence runs to the
/// end of the text.
static RE_FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)```[ \t]*(?:json5?|javascript|js)?[ \t]*\r?\n?(.*?)(?:```|\z)").unwrap()
});

/// Return the body of the first code fence (optionally tagged `json`), or the
/// whole text when there is none. The result is trimmed.
///
/// Prose around the block is dropped along with the fence markers, so a
/// bracket in a preamble such as `Fields [page 1]:` never reaches the repair
/// pass.
pub fn strip_fences(raw: &str) -> String {
    match RE_FENCED_BLOCK.captures(raw).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim().to_string(),
        None => raw.trim().to_string(),
    }
}

/// Turn a model reply into a JSON value, repairing it where possible.
///
/// # Errors
///
/// [`MalformedResponseError`] when the text is empty, is not text at all, or
/// is still invalid after repair. The error carries the (repaired) content.
pub fn normalize_reply(raw: &str) -> Result<Value, MalformedResponseError> {
    if looks_binary(raw) {
        return Err(MalformedResponseError {
            message: "reply contains binary data".to_string(),
            content: preview(raw),
        });
    }

    let cleaned = strip_fences(raw);
    if cleaned.is_empty() {
        return Err(MalformedResponseError {
            message: "empty reply".to_string(),
            content: String::new(),
        });
    }

    if !cleaned.contains(['{', '[']) {
        return Err(MalformedResponseError {
            message: "reply contains no JSON object or array".to_string(),
            content: preview(&cleaned),
        });
    }

    let repaired = repair_json(&cleaned);
    serde_json::from_str(&repaired).map_err(|e| MalformedResponseError {
        message: e.to_string(),
        content: preview(&repaired),
    })
}

/// Share of suspicious characters above which a reply counts as binary.
const BINARY_RATIO: f64 = 0.1;

/// NUL anywhere, or a high share of control and replacement characters.
/// Stray `\u{FFFD}` from OCR noise inside otherwise valid JSON is left for the
/// parser to judge.
fn looks_binary(s: &str) -> bool {
    let mut total = 0usize;
    let mut suspicious = 0usize;
    for c in s.chars() {
        if c == '\0' {
            return true;
        }
        total += 1;
        if c == '\u{FFFD}' || (c.is_control() && !matches!(c, '\n' | '\r' | '\t')) {
            suspicious += 1;
        }
    }
    total > 0 && suspicious as f64 / total as f64 > BINARY_RATIO
}

fn preview(s: &str) -> String {
    s.chars().take(CONTENT_PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const OBJ: &str = r#"{"CountryOverview": {"CountryOfOrigin": "India"}}"#;

    #[test]
    fn fenced_and_bare_are_equivalent() {
        let bare = normalize_reply(OBJ).unwrap();
        for wrapped in [
            format!("```json\n{OBJ}\n```"),
            format!("```\n{OBJ}\n```"),
            format!("  ```JSON\r\n{OBJ}\r\n```  \n"),
            format!("```json {OBJ}```"),
        ] {
            assert_eq!(normalize_reply(&wrapped).unwrap(), bare, "input: {wrapped:?}");
        }
    }

    #[test]
    fn strip_fences_leaves_plain_text() {
        assert_eq!(strip_fences("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn fence_with_surrounding_prose() {
        let raw = format!("Sure! Here you go:\n```json\n{OBJ}\n```\nAnything else?");
        assert_eq!(normalize_reply(&raw).unwrap(), normalize_reply(OBJ).unwrap());
    }

    #[test]
    fn bracketed_prose_before_fence_is_ignored() {
        let raw = format!("Extracted fields [page 1]:\n```json\n{OBJ}\n```");
        assert_eq!(normalize_reply(&raw).unwrap(), normalize_reply(OBJ).unwrap());

        let raw = format!("See {{below}}:\n```\n{OBJ}");
        assert_eq!(normalize_reply(&raw).unwrap(), normalize_reply(OBJ).unwrap());
    }

    #[test]
    fn replacement_character_inside_string_is_kept() {
        let raw = serde_json::to_string(&json!({"DescriptionOfGoods": "Caf\u{FFFD} beans"})).unwrap();
        let value = normalize_reply(&raw).unwrap();
        assert_eq!(value["DescriptionOfGoods"], "Caf\u{FFFD} beans");
        assert_eq!(normalize_reply(&serde_json::to_string(&value).unwrap()).unwrap(), value);
    }

    #[test]
    fn repairs_malformed_replies() {
        let cases = [
            (r#"{"a": 1,}"#, json!({"a": 1})),
            (r#"{"a": [1, 2"#, json!({"a": [1, 2]})),
            ("{'a': None}", json!({"a": null})),
            ("{\"a\": \"x\"\n\"b\": \"y\"}", json!({"a": "x", "b": "y"})),
            ("```json\n{\"a\": {\"b\": \"c\"", json!({"a": {"b": "c"}})),
        ];
        for (raw, expected) in cases {
            assert_eq!(normalize_reply(raw).unwrap(), expected, "input: {raw:?}");
        }
    }

    #[test]
    fn unrecoverable_replies_fail() {
        for raw in [
            "",
            "   ",
            "```json\n```",
            "I'm sorry, I cannot read this document.",
            "42",
            "\u{0}\u{1}\u{2}PK\u{3}\u{4}",
            "\u{FFFD}\u{FFFD}{",
        ] {
            assert!(normalize_reply(raw).is_err(), "input: {raw:?}");
        }
    }

    #[test]
    fn error_carries_content() {
        let err = normalize_reply("no json here").unwrap_err();
        assert_eq!(err.content, "no json here");
        assert!(err.to_string().starts_with("Still invalid JSON after repair"));

        let err = normalize_reply("{\"a\": 1, {\"b\": 2}}").unwrap_err();
        assert!(err.content.starts_with('{'));
    }

    #[test]
    fn normalisation_is_idempotent() {
        for raw in [
            OBJ,
            "```json\n{\"a\": [1, 2,],}\n```",
            "{Parties: [{PartyName: 'Acme', Role: Exporter}",
        ] {
            let once = normalize_reply(raw).unwrap();
            let twice = normalize_reply(&serde_json::to_string(&once).unwrap()).unwrap();
            assert_eq!(once, twice);
        }
    }
}
