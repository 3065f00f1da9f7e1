//! Tolerant JSON extraction from free-form model output.
//!
//! Strategies run in order, first success wins:
//!
//! | Strategy        | Handles                                         |
//! |-----------------|-------------------------------------------------|
//! | `raw`           | Output that is already valid JSON               |
//! | `fenced`        | JSON inside a ```` ```json ```` / ```` ``` ```` block |
//! | `bracket_slice` | First opening bracket to its last closing twin  |
//! | `balanced`      | First balanced `{}`/`[]` run, string-aware      |

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::error::{FulcrumError, Result};

lazy_static! {
    static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?s)```[ \t]*(?:json|JSON)?[ \t]*\r?\n?(.*?)```").expect("valid regex");
}

type Strategy = fn(&str) -> Option<Value>;

const STRATEGIES: [(&str, Strategy); 4] = [
    ("raw", parse_raw),
    ("fenced", parse_fenced),
    ("bracket_slice", parse_bracket_slice),
    ("balanced", parse_balanced),
];

/// Recover the first well-formed JSON object or array from `text`.
pub fn extract_json(text: &str) -> Result<Value> {
    for (name, strategy) in STRATEGIES {
        if let Some(value) = strategy(text) {
            tracing::trace!(strategy = name, "extracted JSON");
            return Ok(value);
        }
    }

    let excerpt: String = text.chars().take(120).collect();
    Err(FulcrumError::JsonExtraction(format!(
        "no JSON object or array found in model output: {excerpt:?}"
    )))
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

fn parse_raw(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text.trim())
        .ok()
        .filter(is_container)
}

fn parse_fenced(text: &str) -> Option<Value> {
    FENCED_BLOCK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| parse_raw(m.as_str()))
}

fn parse_bracket_slice(text: &str) -> Option<Value> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    parse_raw(&text[start..=end])
}

fn parse_balanced(text: &str) -> Option<Value> {
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find(['{', '[']) {
        let start = search_from + offset;
        if let Some(end) = balanced_end(&text[start..]) {
            if let Some(value) = parse_raw(&text[start..start + end]) {
                return Some(value);
            }
        }
        search_from = start + 1;
    }

    None
}

/// Byte length of the balanced bracket run starting at `s[0]`.
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {},
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            },
            _ => {},
        }
    }

    None
}
