//! Request descriptors and per-request outcomes.
//!
//! - [`types`]: what to send ([`RequestDescriptor`], [`Method`], [`RequestBody`]) and the
//!   loosely-typed [`RequestSpec`] input it is usually built from.
//! - [`outcome`]: what happened ([`AttemptOutcome`] per attempt, [`FetchResult`] per
//!   descriptor).

pub mod outcome;
pub mod types;

pub use outcome::{AttemptOutcome, FailureKind, FetchError, FetchOutcome, FetchResult};
pub use types::{Method, RequestBody, RequestDescriptor, RequestSpec};
