//! Templated batches: one URL template, many items.
//!
//! ```json
//! {
//!   "baseUrl": "https://api.example.com/users/{user_id}",
//!   "method": "GET",
//!   "headers": { "Accept": "application/json" },
//!   "id": "users",
//!   "inputData": [
//!     { "placeholders": { "user_id": 1 }, "params": { "expand": "orders" } },
//!     { "placeholders": { "user_id": 2 }, "params": {} }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::template::{TemplateError, UrlTemplate};
use crate::request::types::render_scalar;
use crate::request::{Method, RequestDescriptor};

/// One item of a templated batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    /// Values substituted into the URL template
    #[serde(default)]
    pub placeholders: BTreeMap<String, Value>,
    /// Query parameters for this item
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl BatchItem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn placeholder(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.placeholders.insert(name.into(), value.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// A URL template plus the per-item values to expand it with.
///
/// All items share the method, the headers and the batch identifier. Item `i` gets the id
/// `"{batch_id}-{i}"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatedBatch {
    #[serde(alias = "baseUrl")]
    pub base_url_template: String,
    #[serde(default)]
    pub method: Method,
    #[serde(default)]
    pub headers: BTreeMap<String, Value>,
    #[serde(alias = "id", default)]
    pub batch_id: Value,
    #[serde(alias = "inputData", default)]
    pub items: Vec<BatchItem>,
}

/// An item after template expansion: either ready to dispatch or rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedItem {
    pub index: usize,
    pub id: String,
    pub descriptor: Result<RequestDescriptor, TemplateError>,
}

impl TemplatedBatch {
    pub fn new(base_url_template: impl Into<String>, batch_id: impl Into<Value>) -> Self {
        Self {
            base_url_template: base_url_template.into(),
            method: Method::Get,
            headers: BTreeMap::new(),
            batch_id: batch_id.into(),
            items: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_item(mut self, item: BatchItem) -> Self {
        self.items.push(item);
        self
    }

    /// Identifier of the item at `index`.
    pub fn item_id(&self, index: usize) -> String {
        let batch = render_scalar(&self.batch_id).unwrap_or_else(|| "batch".to_string());
        format!("{}-{}", batch, index)
    }

    /// Expand every item, in order.
    ///
    /// A malformed template or a bad shared header rejects every item with the same error; a
    /// bad item only rejects itself.
    pub fn render(&self) -> Vec<RenderedItem> {
        let shared = UrlTemplate::parse(&self.base_url_template)
            .and_then(|template| Ok((template, render_values("headers", &self.headers)?)));

        self.items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let id = self.item_id(index);
                let descriptor = match &shared {
                    Ok((template, headers)) => {
                        self.render_item(&id, template, headers.clone(), item)
                    }
                    Err(e) => Err(e.clone()),
                };
                RenderedItem {
                    index,
                    id,
                    descriptor,
                }
            })
            .collect()
    }

    fn render_item(
        &self,
        id: &str,
        template: &UrlTemplate,
        headers: BTreeMap<String, String>,
        item: &BatchItem,
    ) -> Result<RequestDescriptor, TemplateError> {
        let url = template.render(&item.placeholders)?;
        if let Err(e) = reqwest::Url::parse(&url) {
            return Err(TemplateError::InvalidUrl {
                url,
                reason: e.to_string(),
            });
        }
        let query = render_values("params", &item.params)?;

        Ok(RequestDescriptor {
            id: id.to_string(),
            method: self.method,
            url,
            query,
            headers,
            body: None,
        })
    }
}

fn render_values(
    field: &'static str,
    values: &BTreeMap<String, Value>,
) -> Result<BTreeMap<String, String>, TemplateError> {
    values
        .iter()
        .map(|(key, value)| {
            render_scalar(value)
                .map(|rendered| (key.clone(), rendered))
                .ok_or_else(|| TemplateError::NonScalarValue {
                    field,
                    key: key.clone(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_wire_format() {
        let batch: TemplatedBatch = serde_json::from_value(json!({
            "baseUrl": "https://api.example.com/users/{user_id}",
            "method": "get",
            "headers": { "Accept": "application/json" },
            "id": 7,
            "inputData": [
                { "placeholders": { "user_id": 1 }, "params": { "expand": "orders" } },
                { "placeholders": { "user_id": "two" } }
            ]
        }))
        .unwrap();

        assert_eq!(batch.method, Method::Get);
        assert_eq!(batch.items.len(), 2);

        let rendered = batch.render();
        assert_eq!(rendered[0].id, "7-0");
        let first = rendered[0].descriptor.as_ref().unwrap();
        assert_eq!(first.url, "https://api.example.com/users/1");
        assert_eq!(first.query["expand"], "orders");
        assert_eq!(first.headers["Accept"], "application/json");

        let second = rendered[1].descriptor.as_ref().unwrap();
        assert_eq!(second.id, "7-1");
        assert_eq!(second.url, "https://api.example.com/users/two");
        assert!(second.query.is_empty());
    }

    #[test]
    fn test_bad_item_only_rejects_itself() {
        let batch = TemplatedBatch::new("https://a/{id}", "b")
            .with_item(BatchItem::new().placeholder("id", 1))
            .with_item(BatchItem::new().placeholder("other", 2))
            .with_item(BatchItem::new().placeholder("id", 3).param("f", json!({})));

        let rendered = batch.render();
        assert_eq!(rendered.len(), 3);
        assert!(rendered[0].descriptor.is_ok());
        assert_eq!(
            rendered[1].descriptor,
            Err(TemplateError::MissingPlaceholder("id".to_string()))
        );
        assert_eq!(
            rendered[2].descriptor,
            Err(TemplateError::NonScalarValue {
                field: "params",
                key: "f".to_string()
            })
        );
    }

    #[test]
    fn test_bad_template_rejects_every_item() {
        let batch = TemplatedBatch::new("https://a/{id", "b")
            .with_item(BatchItem::new().placeholder("id", 1))
            .with_item(BatchItem::new().placeholder("id", 2));

        let rendered = batch.render();
        assert!(rendered.iter().all(|item| item.descriptor.is_err()));
        assert_eq!(rendered[1].index, 1);
    }

    #[test]
    fn test_unparseable_rendered_url_is_rejected() {
        let batch = TemplatedBatch::new("{host}/users", "b")
            .with_item(BatchItem::new().placeholder("host", "api.example.com"));

        let rendered = batch.render();
        assert!(matches!(
            &rendered[0].descriptor,
            Err(TemplateError::InvalidUrl { url, .. }) if url == "api.example.com/users"
        ));
    }

    #[test]
    fn test_item_id_without_batch_id() {
        let batch = TemplatedBatch::new("https://a", Value::Null);
        assert_eq!(batch.item_id(3), "batch-3");
    }
}
