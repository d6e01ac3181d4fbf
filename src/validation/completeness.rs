//! Completeness Checker
//!
//! Structural validator deciding whether a returned JSON document is
//! finished or truncated. Distinct from semantic correctness: a document is
//! "complete" when it parses, satisfies the required schema, and shows no
//! sign of being cut off mid-stream.
//!
//! Checks run in order and short-circuit on the first failure:
//!
//! 1. Strip fenced-code wrapping
//! 2. Trimmed text must start with `{` and end with `}`
//! 3. Parse as JSON
//! 4. Every required top-level key present
//! 5. Content elements of recognized types carry their required sub-fields;
//!    URL-flagged fields match the strict URL pattern
//! 6. Brace/bracket balance via a quote-aware streaming scan

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::schema::{RequiredSchema, collect_path_strings};
use super::strip_code_fences;
use crate::types::{LoomError, Result};

/// Verdict of one completeness check
#[derive(Debug, Clone)]
pub struct Completeness {
    pub complete: bool,
    /// First failed check, for logs and repair prompts
    pub reason: Option<String>,
}

impl Completeness {
    fn ok() -> Self {
        Self {
            complete: true,
            reason: None,
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            complete: false,
            reason: Some(reason.into()),
        }
    }
}

/// Schema-parameterized structural validator. No side effects; checking an
/// already-complete document is idempotent.
#[derive(Debug, Clone)]
pub struct CompletenessChecker {
    schema: RequiredSchema,
    url_regex: Regex,
}

impl CompletenessChecker {
    pub fn new(schema: RequiredSchema) -> Result<Self> {
        let url_regex = Regex::new(&schema.url_pattern)
            .map_err(|e| LoomError::Config(format!("invalid url_pattern regex: {e}")))?;

        Ok(Self { schema, url_regex })
    }

    /// Run all checks in order, short-circuiting on the first failure
    pub fn check(&self, text: &str) -> Completeness {
        let stripped = strip_code_fences(text);
        let trimmed = stripped.trim();

        if !trimmed.starts_with('{') || !trimmed.ends_with('}') {
            return Completeness::fail("text is not a braced JSON object");
        }

        let doc: Value = match serde_json::from_str(trimmed) {
            Ok(doc) => doc,
            Err(e) => return Completeness::fail(format!("JSON parse failed: {e}")),
        };

        for key in &self.schema.required_top_level_keys {
            if doc.get(key).is_none() {
                return Completeness::fail(format!("missing required top-level key '{key}'"));
            }
        }

        if let Some(verdict) = self.check_content_elements(&doc) {
            return verdict;
        }

        if !is_balanced(trimmed) {
            return Completeness::fail("unbalanced braces or brackets");
        }

        debug!(chars = trimmed.len(), "document passed completeness checks");
        Completeness::ok()
    }

    /// Validate recognized structural types in the designated content array
    fn check_content_elements(&self, doc: &Value) -> Option<Completeness> {
        let elements = doc.get(&self.schema.content_field)?.as_array()?;

        for (idx, element) in elements.iter().enumerate() {
            let Some((kind, rule)) = self.schema.rule_for(element) else {
                continue;
            };

            for field in &rule.required_fields {
                if element.get(field).is_none() {
                    return Some(Completeness::fail(format!(
                        "{}[{idx}] ({kind}): missing required field '{field}'",
                        self.schema.content_field
                    )));
                }
            }

            for path in &rule.url_fields {
                let urls = collect_path_strings(element, path);
                if urls.is_empty() {
                    return Some(Completeness::fail(format!(
                        "{}[{idx}] ({kind}): no value at URL field '{path}'",
                        self.schema.content_field
                    )));
                }
                for url in urls {
                    if !self.is_complete_url(url) {
                        return Some(Completeness::fail(format!(
                            "{}[{idx}] ({kind}): '{url}' is not a complete URL",
                            self.schema.content_field
                        )));
                    }
                }
            }
        }

        None
    }

    /// Strict URL check: parses, http(s) scheme, host, and a path matching
    /// the configured pattern. A cut-off prefix still parses as a URL, so
    /// the pattern does the real work.
    pub fn is_complete_url(&self, candidate: &str) -> bool {
        let Ok(parsed) = url::Url::parse(candidate) else {
            return false;
        };

        matches!(parsed.scheme(), "http" | "https")
            && parsed.host_str().is_some()
            && self.url_regex.is_match(candidate)
    }

    pub fn schema(&self) -> &RequiredSchema {
        &self.schema
    }
}

/// Quote-aware streaming scan confirming the text ends at nesting depth zero.
///
/// Ignores brackets inside string literals, respecting backslash escaping.
pub fn is_balanced(text: &str) -> bool {
    let mut depth: i64 = 0;
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
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }

    depth == 0 && !in_string
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::schema::ComponentRule;

    /// Schema mirroring the newsletter-style documents the backend produces
    fn gallery_schema() -> RequiredSchema {
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
        schema
    }

    fn checker() -> CompletenessChecker {
        CompletenessChecker::new(gallery_schema()).unwrap()
    }

    #[test]
    fn test_complete_document_passes() {
        let doc = r#"{"id":"1","titulo_nc":"X","conteudo":[{"__component":"a","imagens":[{"imagem":{"url":"https://ex.com/img.png"}}]}]}"#;
        let verdict = checker().check(doc);
        assert!(verdict.complete, "reason: {:?}", verdict.reason);
    }

    #[test]
    fn test_idempotent_on_complete_document() {
        let doc = r#"{"id":"1","titulo_nc":"X","conteudo":[]}"#;
        let c = checker();
        assert!(c.check(doc).complete);
        assert!(c.check(doc).complete);
    }

    #[test]
    fn test_fenced_document_passes() {
        let doc = "```json\n{\"id\":\"1\",\"titulo_nc\":\"X\",\"conteudo\":[]}\n```";
        assert!(checker().check(doc).complete);
    }

    #[test]
    fn test_missing_required_key_never_complete() {
        let doc = r#"{"id":"1","conteudo":[]}"#;
        let verdict = checker().check(doc);
        assert!(!verdict.complete);
        assert!(verdict.reason.unwrap().contains("titulo_nc"));
    }

    #[test]
    fn test_truncated_text_fails_shape_check() {
        let doc = r#"{"id":"1","titulo_nc":"X","conteudo":[{"__component":"a""#;
        let verdict = checker().check(doc);
        assert!(!verdict.complete);
    }

    #[test]
    fn test_parse_error_reported() {
        let doc = r#"{"id":,}"#;
        let verdict = checker().check(doc);
        assert!(!verdict.complete);
        assert!(verdict.reason.unwrap().contains("parse"));
    }

    #[test]
    fn test_cut_off_url_fails_even_when_json_parses() {
        // The JSON around the URL is valid, but the URL was cut mid-filename
        let doc = r#"{"id":"1","titulo_nc":"X","conteudo":[{"__component":"a","imagens":[{"imagem":{"url":"https://ex.com/i"}}]}]}"#;
        let verdict = checker().check(doc);
        assert!(!verdict.complete);
        assert!(verdict.reason.unwrap().contains("not a complete URL"));
    }

    #[test]
    fn test_missing_required_subfield_fails() {
        let doc = r#"{"id":"1","titulo_nc":"X","conteudo":[{"__component":"a"}]}"#;
        let verdict = checker().check(doc);
        assert!(!verdict.complete);
        assert!(verdict.reason.unwrap().contains("imagens"));
    }

    #[test]
    fn test_unrecognized_component_types_are_ignored() {
        let doc = r#"{"id":"1","titulo_nc":"X","conteudo":[{"__component":"text","body":"hi"}]}"#;
        assert!(checker().check(doc).complete);
    }

    #[test]
    fn test_is_complete_url() {
        let c = checker();
        assert!(c.is_complete_url("https://ex.com/img.png"));
        assert!(c.is_complete_url("http://cdn.ex.com/a/b/photo.jpeg"));
        assert!(!c.is_complete_url("https://ex.com/i"));
        assert!(!c.is_complete_url("https://ex.com"));
        assert!(!c.is_complete_url("ftp://ex.com/img.png"));
        assert!(!c.is_complete_url("not a url"));
    }

    #[test]
    fn test_is_balanced() {
        assert!(is_balanced(r#"{"a":[1,2,{"b":3}]}"#));
        assert!(!is_balanced(r#"{"a":[1,2"#));
        assert!(!is_balanced(r#"{"a":1}}"#));
        // Brackets inside strings don't count
        assert!(is_balanced(r#"{"a":"}{]["}"#));
        // Escaped quote doesn't end the string
        assert!(is_balanced(r#"{"a":"x\"}{\"y"}"#));
        // Unterminated string
        assert!(!is_balanced(r#"{"a":"unfinished"#));
    }
}
