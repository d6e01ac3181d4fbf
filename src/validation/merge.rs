//! Continuation Merger
//!
//! Reconstructs a single candidate document from a truncated first response
//! and a "continue" response prompted to resume, not restart.
//!
//! Strategies are tried in order; the first one whose output parses wins:
//!
//! 1. **Truncated-literal repair**: the first half ends inside a string
//!    literal and the continuation resumes it exactly
//! 2. **Whole-replacement**: the continuation alone is a complete,
//!    schema-valid document longer than the first half
//! 3. **Structural-boundary splice**: cut at the last cleanly-closed inner
//!    structure, resume at the continuation's first opener
//! 4. **Property-boundary fallback**: cut at the last complete `"key":`
//!    occurrence instead
//! 5. **Give up**: keep the longer half; the caller routes it to repair
//!
//! The caller always re-runs the completeness checker on the merged text.

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::completeness::CompletenessChecker;
use super::strip_code_fences;
use crate::types::MergeStrategy;

/// Result of one merge pass
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub text: String,
    pub strategy: MergeStrategy,
}

/// Merges a truncated response with its continuation
#[derive(Debug, Clone)]
pub struct ContinuationMerger {
    checker: CompletenessChecker,
    key_pattern: Regex,
}

impl ContinuationMerger {
    pub fn new(checker: CompletenessChecker) -> Self {
        Self {
            checker,
            // A complete `"key":` occurrence, used by the property fallback
            key_pattern: Regex::new(r#""[^"\\]+"\s*:\s*"#).expect("static regex"),
        }
    }

    /// Reconstruct one document from `first` (truncated) and `second`
    /// (its continuation)
    pub fn merge(&self, first: &str, second: &str) -> MergeOutcome {
        let first = strip_code_fences(first);
        let second = strip_code_fences(second);
        let first = first.trim();
        let second = second.trim();

        if let Some(text) = self.try_truncated_literal(first, second) {
            debug!(strategy = %MergeStrategy::TruncatedLiteral, "merge succeeded");
            return MergeOutcome {
                text,
                strategy: MergeStrategy::TruncatedLiteral,
            };
        }

        if let Some(text) = self.try_whole_replacement(first, second) {
            debug!(strategy = %MergeStrategy::WholeReplacement, "merge succeeded");
            return MergeOutcome {
                text,
                strategy: MergeStrategy::WholeReplacement,
            };
        }

        let resume_at = continuation_start(second);

        if let Some(text) = self.try_structural_splice(first, second, resume_at) {
            debug!(strategy = %MergeStrategy::StructuralSplice, "merge succeeded");
            return MergeOutcome {
                text,
                strategy: MergeStrategy::StructuralSplice,
            };
        }

        if let Some(text) = self.try_property_splice(first, second, resume_at) {
            debug!(strategy = %MergeStrategy::PropertySplice, "merge succeeded");
            return MergeOutcome {
                text,
                strategy: MergeStrategy::PropertySplice,
            };
        }

        // Give up: hand back the longer half for the repair path
        debug!(strategy = %MergeStrategy::LongerWins, "all merge strategies failed");
        let text = if second.len() > first.len() {
            second.to_string()
        } else {
            first.to_string()
        };
        MergeOutcome {
            text,
            strategy: MergeStrategy::LongerWins,
        }
    }

    /// The first half was cut inside a string literal and the continuation
    /// resumes it exactly: plain concatenation restores the literal.
    fn try_truncated_literal(&self, first: &str, second: &str) -> Option<String> {
        if !ends_inside_string(first) {
            return None;
        }
        // The remainder of the literal must be closed somewhere in second
        if !second.contains('"') {
            return None;
        }

        let candidate = format!("{first}{second}");
        parses(&candidate).then_some(candidate)
    }

    /// Guard against a continuation that repeated the entire document:
    /// prefer it outright when it is complete and longer.
    fn try_whole_replacement(&self, first: &str, second: &str) -> Option<String> {
        (second.len() > first.len() && self.checker.check(second).complete)
            .then(|| second.to_string())
    }

    fn try_structural_splice(
        &self,
        first: &str,
        second: &str,
        resume_at: usize,
    ) -> Option<String> {
        let boundary = last_clean_close(first)?;
        splice_either(&first[..boundary], second, resume_at)
    }

    fn try_property_splice(&self, first: &str, second: &str, resume_at: usize) -> Option<String> {
        let last_key = self.key_pattern.find_iter(first).last()?;
        splice_either(&first[..last_key.start()], second, resume_at)
    }
}

/// Try the splice with the continuation taken verbatim first (an exact
/// resume keeps its `"key":` prefixes), then from its first opener (skips
/// any restarted preamble). First variant that parses wins.
fn splice_either(prefix: &str, second: &str, resume_at: usize) -> Option<String> {
    let verbatim = splice(prefix, second);
    if parses(&verbatim) {
        return Some(verbatim);
    }

    if resume_at > 0 {
        let from_opener = splice(prefix, &second[resume_at..]);
        if parses(&from_opener) {
            return Some(from_opener);
        }
    }

    None
}

fn parses(text: &str) -> bool {
    serde_json::from_str::<Value>(text).is_ok()
}

/// Whether a quote-aware scan of `text` ends inside a string literal
fn ends_inside_string(text: &str) -> bool {
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
            _ => {}
        }
    }

    in_string
}

/// Offset just past the last `}`/`]` outside a string that closed an inner
/// structure (depth stays >= 1 after it closes). Returns None if nothing
/// inside the top-level container ever closed cleanly.
fn last_clean_close(text: &str) -> Option<usize> {
    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escape = false;
    let mut last = None;

    for (i, ch) in text.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => {
                depth -= 1;
                if depth >= 1 {
                    last = Some(i + ch.len_utf8());
                }
            }
            _ => {}
        }
    }

    last
}

/// Offset in the continuation where the next `{`/`[` begins outside any
/// string; zero when the continuation has no opener (it only closes
/// structures the first half left open).
fn continuation_start(text: &str) -> usize {
    let mut in_string = false;
    let mut escape = false;

    for (i, ch) in text.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => return i,
            _ => {}
        }
    }

    0
}

/// Concatenate the two halves, inserting or dropping a comma where the
/// splice point syntactically requires it
fn splice(prefix: &str, suffix: &str) -> String {
    let mut prefix = prefix.trim_end().to_string();
    let suffix = suffix.trim_start();

    if suffix.starts_with(['}', ']']) {
        while prefix.ends_with(',') {
            prefix.pop();
            prefix.truncate(prefix.trim_end().len());
        }
    } else if suffix.starts_with(['{', '[', '"'])
        && (prefix.ends_with(['}', ']', '"']) || prefix.ends_with(|c: char| c.is_ascii_digit()))
    {
        prefix.push(',');
    }

    format!("{prefix}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::schema::{ComponentRule, RequiredSchema};
    use proptest::prelude::*;

    fn merger() -> ContinuationMerger {
        let mut schema = RequiredSchema {
            required_top_level_keys: vec!["id".into(), "titulo_nc".into(), "conteudo".into()],
            content_field: "conteudo".into(),
            ..Default::default()
        };
        schema.components.insert(
            "a".into(),
            ComponentRule {
                required_fields: vec!["imagens".into()],
                url_fields: vec!["imagens.imagem.url".into()],
            },
        );
        ContinuationMerger::new(CompletenessChecker::new(schema).unwrap())
    }

    #[test]
    fn test_mid_url_continuation_scenario() {
        let first = r#"{"id":"1","titulo_nc":"X","conteudo":[{"__component":"a","imagens":[{"imagem":{"url":"https://ex.com/i"#;
        let second = r#"mg.png"}}]}]}"#;

        let m = merger();
        let outcome = m.merge(first, second);
        assert_eq!(outcome.strategy, MergeStrategy::TruncatedLiteral);

        let doc: Value = serde_json::from_str(&outcome.text).unwrap();
        assert_eq!(
            doc["conteudo"][0]["imagens"][0]["imagem"]["url"],
            "https://ex.com/img.png"
        );
        assert!(m.checker.check(&outcome.text).complete);
    }

    #[test]
    fn test_whole_replacement_when_continuation_restarts() {
        let first = r#"{"id":"1","titulo_nc":"X","conteudo":[{"__component"#;
        // Continuation accidentally repeated the whole (longer) document
        let second = r#"{"id":"1","titulo_nc":"X","conteudo":[{"__component":"a","imagens":[{"imagem":{"url":"https://ex.com/img.png"}}]}]}"#;

        let outcome = merger().merge(first, second);
        assert_eq!(outcome.strategy, MergeStrategy::WholeReplacement);
        assert_eq!(outcome.text, second);
    }

    #[test]
    fn test_structural_splice_at_element_boundary() {
        // First half cut right after a closed element, mid-way into the next
        let first = r#"{"id":"1","titulo_nc":"X","conteudo":[{"__component":"t","body":"one"},{"__comp"#;
        let second = r#"{"__component":"t","body":"two"}]}"#;

        let outcome = merger().merge(first, second);
        assert_eq!(outcome.strategy, MergeStrategy::StructuralSplice);

        let doc: Value = serde_json::from_str(&outcome.text).unwrap();
        assert_eq!(doc["conteudo"].as_array().unwrap().len(), 2);
        assert_eq!(doc["conteudo"][1]["body"], "two");
    }

    #[test]
    fn test_longer_wins_when_nothing_parses() {
        let first = "complete nonsense";
        let second = "even longer complete nonsense";

        let outcome = merger().merge(first, second);
        assert_eq!(outcome.strategy, MergeStrategy::LongerWins);
        assert_eq!(outcome.text, second);
    }

    #[test]
    fn test_fenced_halves_are_unwrapped() {
        let first = "```json\n{\"id\":\"1\",\"titulo_nc\":\"X\",\"conteudo\":[],\"extra\":\"ab";
        let second = "cd\"}\n```";

        let outcome = merger().merge(first, second);
        let doc: Value = serde_json::from_str(&outcome.text).unwrap();
        assert_eq!(doc["extra"], "abcd");
    }

    #[test]
    fn test_splice_comma_handling() {
        assert_eq!(splice(r#"{"a":1"#, r#","b":2}"#), r#"{"a":1,"b":2}"#);
        assert_eq!(splice(r#"{"a":[{"x":1}"#, r#"{"x":2}]}"#), r#"{"a":[{"x":1},{"x":2}]}"#);
        assert_eq!(splice(r#"{"a":[1,2,"#, r#"]}"#), r#"{"a":[1,2]}"#);
    }

    #[test]
    fn test_last_clean_close() {
        let text = r#"{"a":[{"x":1},{"y"#;
        let boundary = last_clean_close(text).unwrap();
        assert_eq!(&text[..boundary], r#"{"a":[{"x":1}"#);

        assert_eq!(last_clean_close(r#"{"a":"#), None);
    }

    #[test]
    fn test_ends_inside_string() {
        assert!(ends_inside_string(r#"{"url":"https://ex"#));
        assert!(!ends_inside_string(r#"{"url":"https://ex.com/a.png""#));
        assert!(ends_inside_string(r#"{"a":"x\""#));
    }

    // =========================================================================
    // Round-trip property
    // =========================================================================

    /// Arbitrary JSON documents with an object at the top level
    fn arb_document() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::String),
        ];
        let node = leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 1..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 1..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        });
        prop::collection::btree_map("[a-z]{1,6}", node, 1..4)
            .prop_map(|m| Value::Object(m.into_iter().collect()))
    }

    /// Offsets just past closers that end an inner structure
    fn structural_boundaries(text: &str) -> Vec<usize> {
        let mut depth: i64 = 0;
        let mut in_string = false;
        let mut escape = false;
        let mut boundaries = Vec::new();

        for (i, ch) in text.char_indices() {
            if escape {
                escape = false;
                continue;
            }
            match ch {
                '\\' if in_string => escape = true,
                '"' => in_string = !in_string,
                '{' | '[' if !in_string => depth += 1,
                '}' | ']' if !in_string => {
                    depth -= 1;
                    if depth >= 1 {
                        boundaries.push(i + 1);
                    }
                }
                _ => {}
            }
        }

        boundaries
    }

    proptest! {
        #[test]
        fn prop_split_at_boundary_and_merge_roundtrips(
            doc in arb_document(),
            pick in any::<prop::sample::Index>(),
        ) {
            let text = serde_json::to_string(&doc).unwrap();
            let boundaries = structural_boundaries(&text);
            prop_assume!(!boundaries.is_empty());

            let cut = boundaries[pick.index(boundaries.len())];
            let (first, second) = text.split_at(cut);

            let outcome = merger().merge(first, second);
            let reparsed: Value = serde_json::from_str(&outcome.text)
                .expect("merged text must parse");
            prop_assert_eq!(reparsed, doc);
        }
    }
}
