//! Document Repairer
//!
//! Last-resort cleanup of near-valid JSON. Local fixes first (fence
//! stripping, trailing commas, unbalanced braces); when those fail, one
//! bounded escalation asks the generation service itself for a corrected
//! document, embedding the exact parser error.

use serde_json::Value;
use tracing::{debug, warn};

use super::strip_code_fences;
use crate::client::GenerationClient;
use crate::types::{GenerationError, GenerationRequest, LoomError, Result};

/// Repairs malformed generation output
#[derive(Debug, Clone, Default)]
pub struct DocumentRepairer;

impl DocumentRepairer {
    pub fn new() -> Self {
        Self
    }

    /// Apply purely local fixes and re-parse.
    ///
    /// Returns the repaired text on success, or a [`LoomError::Repair`]
    /// carrying the final parser error for the escalation prompt.
    pub fn repair_local(&self, text: &str) -> Result<String> {
        let cleaned = preprocess(text);

        if parses(&cleaned) {
            return Ok(cleaned);
        }

        let decommaed = fix_trailing_commas(&cleaned);
        if parses(&decommaed) {
            debug!("repaired document by dropping trailing commas");
            return Ok(decommaed);
        }

        let balanced = balance_brackets(&decommaed);
        match serde_json::from_str::<Value>(&balanced) {
            Ok(_) => {
                debug!("repaired document by balancing brackets");
                Ok(balanced)
            }
            Err(e) => Err(LoomError::Repair(e.to_string())),
        }
    }

    /// Escalate to the generation service: ask for a corrected document,
    /// quoting the parser error verbatim.
    ///
    /// Counts as one more client call, under the same retry and circuit
    /// breaker discipline. The caller re-runs the completeness checker on
    /// the result.
    pub async fn repair_via_service(
        &self,
        client: &GenerationClient,
        base: &GenerationRequest,
        broken: &str,
        parse_error: &str,
        deadline: Option<std::time::Instant>,
    ) -> std::result::Result<String, GenerationError> {
        warn!(
            endpoint = client.endpoint(),
            parse_error, "local repair failed, escalating to service"
        );

        let prompt = format!(
            "The following JSON document is broken and fails to parse with this \
             error:\n\n{parse_error}\n\nBroken document:\n{broken}\n\nReturn ONLY \
             the corrected, complete JSON document. No explanation, no markdown."
        );

        let response = client
            .call_with_deadline(&base.follow_up(prompt), deadline)
            .await?;

        Ok(strip_code_fences(&response).trim().to_string())
    }
}

fn parses(text: &str) -> bool {
    serde_json::from_str::<Value>(text).is_ok()
}

/// Strip fencing, BOM, and surrounding whitespace
fn preprocess(raw: &str) -> String {
    strip_code_fences(raw.trim())
        .trim_start_matches('\u{feff}')
        .trim()
        .to_string()
}

/// Drop commas immediately preceding `]` or `}`
fn fix_trailing_commas(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();

    let mut i = 0;
    while i < chars.len() {
        if chars[i] == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == ']' || chars[j] == '}') {
                i += 1;
                continue;
            }
        }
        result.push(chars[i]);
        i += 1;
    }

    result
}

/// Close an unterminated final string and append missing closers in
/// innermost-first order
fn balance_brackets(text: &str) -> String {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape = false;

    for ch in text.chars() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' if !in_string => stack.push('}'),
            '[' if !in_string => stack.push(']'),
            '}' | ']' if !in_string => {
                stack.pop();
            }
            _ => {}
        }
    }

    let mut result = text.to_string();
    if in_string {
        result.push('"');
    }
    while let Some(closer) = stack.pop() {
        result.push(closer);
    }

    result
}
