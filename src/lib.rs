//! Concurrent fan-out HTTP fetching with retries.
//!
//! This crate issues many independent HTTP requests in parallel through one shared client,
//! retries each failed request with exponential backoff, classifies failures (not found,
//! transient, server error, malformed, misconfigured, cancelled) and returns exactly one
//! result per request, in submission order. One request failing never aborts the others.
//!
//! ```ignore
//! let config = FetchConfig::default();
//! let coordinator = FanOutCoordinator::from_config(&config)?;
//!
//! let results = coordinator
//!     .run(vec![
//!         RequestDescriptor::get("first", "https://api.example.com/a"),
//!         RequestDescriptor::get("second", "https://api.example.com/b"),
//!     ])
//!     .await;
//!
//! let merged = coordinator.aggregator().merge(&results);
//! ```
//!
//! Inputs can also be loose [`RequestSpec`]s, a [`TemplatedBatch`] (one URL template expanded
//! per item) or a page range (`run_pages`).

pub mod aggregate;
pub mod backoff;
pub mod batch;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod http;
pub mod metrics;
pub mod request;

// Re-export commonly used types
pub use aggregate::{AggregatedResults, ErrorRecord, ResultAggregator};
pub use backoff::BackoffPolicy;
pub use batch::{BatchItem, TemplateError, TemplatedBatch, UrlTemplate};
pub use config::{BackoffConfig, ClientConfig, FetchConfig, InvalidItemPolicy};
pub use coordinator::{FanOutCoordinator, page_descriptors};
pub use error::{Result, VolleyError};
pub use executor::RequestExecutor;
pub use http::{HttpClient, HttpResponse, MockHttpClient, ReqwestHttpClient};
pub use request::*;
