//! Templated batches.
//!
//! A [`TemplatedBatch`] is a URL template with named placeholders plus a list of items, each
//! carrying its own placeholder values and query parameters. Rendering turns it into one
//! [`RequestDescriptor`](crate::request::RequestDescriptor) per item, or a
//! [`TemplateError`] for items that cannot be expanded.

pub mod template;
pub mod templated;

pub use template::{TemplateError, UrlTemplate};
pub use templated::{BatchItem, RenderedItem, TemplatedBatch};
