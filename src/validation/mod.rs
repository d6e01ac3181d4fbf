//! Document Validation and Reconstruction
//!
//! Everything that decides whether generated text is a finished document and
//! that rebuilds it when it is not:
//!
//! - `schema`: externally supplied description of a complete document
//! - `completeness`: structural validator (complete vs. truncated)
//! - `merge`: reconstruction from a truncated response plus its continuation
//! - `repair`: local JSON cleanup with one bounded service escalation

pub mod completeness;
pub mod merge;
pub mod repair;
pub mod schema;

pub use completeness::{Completeness, CompletenessChecker, is_balanced};
pub use merge::{ContinuationMerger, MergeOutcome};
pub use repair::DocumentRepairer;
pub use schema::{ComponentRule, DEFAULT_URL_PATTERN, RequiredSchema};

/// Strip markdown code fences without altering inner content.
///
/// Handles ```json ... ``` and bare ``` ... ``` wrapping, including a
/// truncated response that opened a fence it never closed.
pub(crate) fn strip_code_fences(text: &str) -> String {
    let mut result = text.trim().to_string();

    if result.starts_with("```")
        && let Some(first_newline) = result.find('\n')
    {
        result = result[first_newline + 1..].to_string();
    }

    if result.ends_with("```") {
        result = result[..result.len() - 3].trim_end().to_string();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fence() {
        let fenced = "```json\n{\"a\":1}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"a\":1}");
    }

    #[test]
    fn test_strip_bare_fence() {
        let fenced = "```\n{\"a\":1}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"a\":1}");
    }

    #[test]
    fn test_unfenced_text_unchanged() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn test_unclosed_fence_stripped() {
        let fenced = "```json\n{\"a\":";
        assert_eq!(strip_code_fences(fenced), "{\"a\":");
    }
}
