//! Required Schema Configuration
//!
//! The minimal contract a finished document must satisfy. This is
//! configuration, not code: the completeness checker is parameterized by it,
//! so what counts as "complete" changes without code changes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default strict URL pattern: scheme, host, and a path whose final segment
/// carries an extension. A cut-off prefix like `https://ex.com/i` fails.
pub const DEFAULT_URL_PATTERN: &str = r#"^https?://[^\s"]+/[^\s"]*\.[A-Za-z0-9]{2,5}$"#;

/// Requirements for one recognized structural type inside the content array
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentRule {
    /// Sub-fields that must be present on every element of this type
    pub required_fields: Vec<String>,
    /// Dotted paths (arrays traversed implicitly) whose string values must
    /// be complete, well-formed URLs
    pub url_fields: Vec<String>,
}

/// Externally supplied description of a complete document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequiredSchema {
    /// Keys that must exist at the top level
    pub required_top_level_keys: Vec<String>,
    /// Name of the designated repeating content array field
    pub content_field: String,
    /// Key discriminating structural types of content elements
    pub component_key: String,
    /// Per-type requirements, keyed by discriminator value
    pub components: HashMap<String, ComponentRule>,
    /// Regex a "must be a complete URL" field has to match
    pub url_pattern: String,
}

impl Default for RequiredSchema {
    fn default() -> Self {
        Self {
            required_top_level_keys: Vec::new(),
            content_field: "content".to_string(),
            component_key: "__component".to_string(),
            components: HashMap::new(),
            url_pattern: DEFAULT_URL_PATTERN.to_string(),
        }
    }
}

impl RequiredSchema {
    /// Look up the rule for a content element, if its type is recognized.
    ///
    /// The returned discriminator borrows from `element`, the rule from
    /// `self`; the unified lifetime ties the pair to the shorter of the two.
    pub fn rule_for<'a>(&'a self, element: &'a Value) -> Option<(&'a str, &'a ComponentRule)> {
        let discriminator = element.get(&self.component_key)?.as_str()?;
        self.components
            .get(discriminator)
            .map(|rule| (discriminator, rule))
    }
}

/// Collect every string value reachable from `value` along a dotted path,
/// traversing arrays element-wise.
pub fn collect_path_strings<'a>(value: &'a Value, path: &str) -> Vec<&'a str> {
    fn walk<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a str>) {
        match value {
            Value::Array(items) => {
                for item in items {
                    walk(item, segments, out);
                }
            }
            Value::Object(map) => {
                if let Some((head, rest)) = segments.split_first()
                    && let Some(next) = map.get(*head)
                {
                    if rest.is_empty() {
                        if let Some(s) = next.as_str() {
                            out.push(s);
                        } else if let Value::Array(items) = next {
                            // Path ends on an array of strings
                            out.extend(items.iter().filter_map(|v| v.as_str()));
                        }
                    } else {
                        walk(next, rest, out);
                    }
                }
            }
            _ => {}
        }
    }

    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    walk(value, &segments, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_lookup_by_discriminator() {
        let mut schema = RequiredSchema::default();
        schema.components.insert(
            "gallery".to_string(),
            ComponentRule {
                required_fields: vec!["images".to_string()],
                url_fields: vec!["images.image.url".to_string()],
            },
        );

        let element = json!({"__component": "gallery", "images": []});
        let (name, rule) = schema.rule_for(&element).unwrap();
        assert_eq!(name, "gallery");
        assert_eq!(rule.required_fields, vec!["images"]);

        let unknown = json!({"__component": "other"});
        assert!(schema.rule_for(&unknown).is_none());
    }

    #[test]
    fn test_collect_path_strings_through_arrays() {
        let value = json!({
            "images": [
                {"image": {"url": "https://ex.com/a.png"}},
                {"image": {"url": "https://ex.com/b.png"}}
            ]
        });

        let urls = collect_path_strings(&value, "images.image.url");
        assert_eq!(urls, vec!["https://ex.com/a.png", "https://ex.com/b.png"]);
    }

    #[test]
    fn test_collect_path_missing_key_is_empty() {
        let value = json!({"other": 1});
        assert!(collect_path_strings(&value, "images.image.url").is_empty());
    }

    #[test]
    fn test_schema_deserializes_from_config() {
        let toml_src = r#"
            required_top_level_keys = ["id", "title"]
            content_field = "blocks"
            [components.gallery]
            required_fields = ["images"]
            url_fields = ["images.image.url"]
        "#;
        let schema: RequiredSchema = toml::from_str(toml_src).unwrap();
        assert_eq!(schema.content_field, "blocks");
        assert!(schema.components.contains_key("gallery"));
        assert_eq!(schema.component_key, "__component");
    }
}
