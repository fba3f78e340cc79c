//! Interpretation of the model's reply into a validated [`CodingResult`].
//!
//! LLM output is untrusted and frequently deviates from the requested format:
//! surrounding prose, malformed JSON, wrong value types, hallucinated codes.
//! This module is the enforcement boundary between free-form generation and
//! the rest of the system. It never returns an error and never panics; every
//! failure mode becomes a normally shaped result with a populated `error`
//! field and empty collections.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::codeframe::Codeframe;

/// The coding assigned to one response.
///
/// Invariants, enforced by [`interpret`]: every key in `confidence`,
/// `explanation`, and `relevant_quotes` is a member of `codes`, and every
/// code in `codes` exists in the codeframe it was validated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CodingResult {
    pub codes: Vec<String>,
    pub confidence: BTreeMap<String, f64>,
    pub explanation: BTreeMap<String, String>,
    pub relevant_quotes: BTreeMap<String, String>,
    pub error: Option<String>,
}

impl CodingResult {
    /// An empty result carrying only an error message.
    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Interpret a raw model reply against a codeframe.
///
/// 1. Trim; if the text does not start with `{`, slice from the first `{` to
///    the last `}` and treat that as the candidate payload.
/// 2. Parse the candidate as JSON.
/// 3. On failure, retry with a balanced-brace scan over the full raw text.
/// 4. Coerce wrong-typed fields (`codes` not an array becomes `[]`, the three
///    maps become `{}` when not objects).
/// 5. Drop codes absent from the codeframe, together with their per-code
///    entries.
pub fn interpret(raw: &str, codeframe: &Codeframe) -> CodingResult {
    let trimmed = raw.trim();

    let candidate = if trimmed.starts_with('{') {
        Some(trimmed)
    } else {
        slice_outer_braces(trimmed)
    };

    let parsed = candidate
        .and_then(|payload| serde_json::from_str::<Value>(payload).ok())
        // Recovery pass: some models wrap the object in prose that also
        // contains stray braces; a balanced scan over the full raw text
        // finds the first complete object.
        .or_else(|| {
            extract_balanced(raw).and_then(|payload| serde_json::from_str::<Value>(payload).ok())
        });

    let object = match parsed {
        Some(Value::Object(map)) => map,
        Some(_) | None => {
            return CodingResult::from_error(format!(
                "failed to parse model reply as coding JSON; raw reply: {raw}"
            ));
        }
    };

    let mut result = coerce(object);
    validate(&mut result, codeframe);
    result
}

/// Substring from the first `{` to the last `}`, inclusive.
fn slice_outer_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// First balanced `{...}` span anywhere in the text.
fn extract_balanced(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let remainder = &raw[start..];
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in remainder.char_indices() {
        if in_string {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&remainder[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Coerce a parsed object into the fixed schema, replacing wrong-typed
/// fields with empty collections rather than failing.
fn coerce(mut object: serde_json::Map<String, Value>) -> CodingResult {
    let codes = match object.remove("codes") {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    let confidence = match object.remove("confidence") {
        Some(Value::Object(map)) => map
            .into_iter()
            .filter_map(|(k, v)| v.as_f64().map(|f| (k, f)))
            .collect(),
        _ => BTreeMap::new(),
    };

    let explanation = string_map(object.remove("explanation"));
    let relevant_quotes = string_map(object.remove("relevant_quotes"));

    let error = match object.remove("error") {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    };

    CodingResult {
        codes,
        confidence,
        explanation,
        relevant_quotes,
        error,
    }
}

fn string_map(value: Option<Value>) -> BTreeMap<String, String> {
    match value {
        Some(Value::Object(map)) => map
            .into_iter()
            .filter_map(|(k, v)| match v {
                Value::String(s) => Some((k, s)),
                _ => None,
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

/// Drop codes outside the codeframe and any per-code entries they carried,
/// preserving the keys-subset-of-codes invariant. Also drops duplicate
/// mentions of the same code.
fn validate(result: &mut CodingResult, codeframe: &Codeframe) {
    let mut seen = std::collections::BTreeSet::new();
    let mut dropped: Vec<String> = Vec::new();

    result.codes.retain(|code| {
        if !codeframe.contains(code) {
            dropped.push(code.clone());
            return false;
        }
        seen.insert(code.clone())
    });

    if !dropped.is_empty() {
        // Indicates prompt drift: the model invented codes despite the
        // codeframe constraint in the prompt.
        warn!(codes = ?dropped, "model returned codes outside the codeframe; dropped");
    }

    result.confidence.retain(|code, _| seen.contains(code));
    result.explanation.retain(|code, _| seen.contains(code));
    result.relevant_quotes.retain(|code, _| seen.contains(code));
}
