//! URL templates with named placeholders.
//!
//! `https://api.example.com/users/{user_id}/orders` has one placeholder, `user_id`. Literal
//! braces are written doubled: `{{` and `}}`. Substituted values are percent-encoded, so a
//! value never adds path segments, a query or a fragment to the URL.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::request::types::render_scalar;

/// Reasons a template cannot be parsed or rendered for an item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed placeholder starting at byte {0}")]
    Unclosed(usize),

    #[error("unmatched '}}' at byte {0}")]
    UnmatchedClose(usize),

    #[error("empty placeholder at byte {0}")]
    EmptyPlaceholder(usize),

    #[error("missing value for placeholder '{0}'")]
    MissingPlaceholder(String),

    #[error("placeholder '{0}' must be a string, number or boolean")]
    NonScalarPlaceholder(String),

    #[error("{field} value for '{key}' must be a string, number or boolean")]
    NonScalarValue { field: &'static str, key: String },

    #[error("rendered url '{url}' is invalid: {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed URL template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    segments: Vec<Segment>,
}

impl UrlTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        match c {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => return Err(TemplateError::Unclosed(pos)),
                            c => name.push(c),
                        }
                    }
                    if !closed {
                        return Err(TemplateError::Unclosed(pos));
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(TemplateError::EmptyPlaceholder(pos));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name.to_string()));
                }
                '}' => return Err(TemplateError::UnmatchedClose(pos)),
                c => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Placeholder names in order of appearance (repeats included).
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute every placeholder with its percent-encoded value. Values not named by the
    /// template are ignored.
    pub fn render(&self, values: &BTreeMap<String, Value>) -> Result<String, TemplateError> {
        let mut rendered = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Placeholder(name) => {
                    let value = values
                        .get(name)
                        .ok_or_else(|| TemplateError::MissingPlaceholder(name.clone()))?;
                    let value = render_scalar(value)
                        .ok_or_else(|| TemplateError::NonScalarPlaceholder(name.clone()))?;
                    rendered.push_str(&urlencoding::encode(&value));
                }
            }
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_render_named_placeholders() {
        let template =
            UrlTemplate::parse("https://api.example.com/users/{user}/orders/{order}").unwrap();
        assert_eq!(template.placeholders().collect::<Vec<_>>(), ["user", "order"]);

        let url = template
            .render(&values(&[("user", json!("alice")), ("order", json!(42))]))
            .unwrap();
        assert_eq!(url, "https://api.example.com/users/alice/orders/42");
    }

    #[test]
    fn test_extra_values_are_ignored() {
        let template = UrlTemplate::parse("https://a/{id}").unwrap();
        let url = template
            .render(&values(&[("id", json!(1)), ("unused", json!("x"))]))
            .unwrap();
        assert_eq!(url, "https://a/1");
    }

    #[test]
    fn test_escaped_braces() {
        let template = UrlTemplate::parse("https://a/{{literal}}/{id}").unwrap();
        assert_eq!(template.placeholders().count(), 1);
        assert_eq!(
            template.render(&values(&[("id", json!(true))])).unwrap(),
            "https://a/{literal}/true"
        );
    }

    #[test]
    fn test_template_without_placeholders() {
        let template = UrlTemplate::parse("https://a/static").unwrap();
        assert_eq!(template.render(&BTreeMap::new()).unwrap(), "https://a/static");
    }

    #[test]
    fn test_missing_and_non_scalar_values() {
        let template = UrlTemplate::parse("https://a/{id}").unwrap();
        assert_eq!(
            template.render(&BTreeMap::new()),
            Err(TemplateError::MissingPlaceholder("id".to_string()))
        );
        assert_eq!(
            template.render(&values(&[("id", json!([1, 2]))])),
            Err(TemplateError::NonScalarPlaceholder("id".to_string()))
        );
        assert_eq!(
            template.render(&values(&[("id", Value::Null)])),
            Err(TemplateError::NonScalarPlaceholder("id".to_string()))
        );
    }

    #[test]
    fn test_values_are_percent_encoded() {
        let template = UrlTemplate::parse("https://a/files/{name}").unwrap();
        assert_eq!(
            template
                .render(&values(&[("name", json!("a b/../c?x=1#top"))]))
                .unwrap(),
            "https://a/files/a%20b%2F..%2Fc%3Fx%3D1%23top"
        );
    }

    #[test]
    fn test_malformed_templates() {
        assert_eq!(
            UrlTemplate::parse("https://a/{id"),
            Err(TemplateError::Unclosed(10))
        );
        assert_eq!(
            UrlTemplate::parse("https://a/id}"),
            Err(TemplateError::UnmatchedClose(12))
        );
        assert_eq!(
            UrlTemplate::parse("https://a/{}"),
            Err(TemplateError::EmptyPlaceholder(10))
        );
        assert!(UrlTemplate::parse("https://a/{a{b}}").is_err());
    }
}
