//! HTTP client abstraction for making requests.
//!
//! This module defines the `HttpClient` trait to abstract HTTP request execution,
//! enabling testability with mock implementations. One client is built per engine and shared
//! by every concurrent request; implementations must not let a single request change the
//! client's configuration.

use crate::config::ClientConfig;
use crate::error::{Result, VolleyError};
use crate::request::{RequestBody, RequestDescriptor};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

/// Response from an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as a string
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Trait for executing HTTP requests.
///
/// Non-2xx statuses are not errors at this level: they come back as an `HttpResponse` and the
/// executor decides what they mean. `Err` is reserved for requests that produced no response
/// at all.
///
/// # Example
/// ```ignore
/// let client = ReqwestHttpClient::new();
/// let descriptor = RequestDescriptor::get("r1", "https://api.example.com/data");
/// let response = client.execute(&descriptor, Duration::from_secs(10)).await?;
/// println!("Status: {}, Body: {}", response.status, response.body);
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync + Clone {
    /// Execute one attempt of an HTTP request.
    ///
    /// # Arguments
    /// * `request` - The descriptor to send
    /// * `timeout` - Upper bound for this attempt
    ///
    /// # Errors
    /// Returns an error if:
    /// - The request fails due to network issues
    /// - The request times out
    /// - The request cannot be built (invalid URL or header)
    async fn execute(&self, request: &RequestDescriptor, timeout: Duration)
    -> Result<HttpResponse>;
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// Production HTTP client using reqwest.
///
/// Cloning is cheap: clones share the underlying connection pool.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a client with reqwest's defaults.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Build the shared client from configuration.
    ///
    /// This is the only failure that aborts a whole batch: without a client nothing can be
    /// dispatched.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                VolleyError::ClientInit(format!("invalid default header name '{}': {}", name, e))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                VolleyError::ClientInit(format!("invalid value for default header '{}': {}", name, e))
            })?;
            headers.insert(header_name, header_value);
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        if let Some(connect_timeout_ms) = config.connect_timeout_ms {
            builder = builder.connect_timeout(Duration::from_millis(connect_timeout_ms));
        }

        let client = builder
            .build()
            .map_err(|e| VolleyError::ClientInit(e.to_string()))?;

        tracing::debug!(
            default_headers = config.default_headers.len(),
            "Built shared HTTP client"
        );

        Ok(Self { client })
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    #[tracing::instrument(skip(self, request), fields(request_id = %request.id, method = %request.method))]
    async fn execute(
        &self,
        request: &RequestDescriptor,
        timeout: Duration,
    ) -> Result<HttpResponse> {
        tracing::debug!(
            url = %request.url,
            timeout_ms = timeout.as_millis() as u64,
            "Executing HTTP request"
        );

        let mut req = self
            .client
            .request(request.method.as_reqwest(), &request.url)
            .timeout(timeout);

        if !request.query.is_empty() {
            req = req.query(&request.query);
        }

        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        match &request.body {
            Some(RequestBody::Json(json)) => {
                req = req.json(json);
                tracing::trace!(request_id = %request.id, "Added JSON request body");
            }
            Some(RequestBody::Bytes(bytes)) => {
                req = req.body(bytes.clone());
                tracing::trace!(
                    request_id = %request.id,
                    body_len = bytes.len(),
                    "Added request body"
                );
            }
            None => {}
        }

        let response = req.send().await.map_err(|e| {
            tracing::debug!(
                request_id = %request.id,
                url = %request.url,
                error = %e,
                "HTTP request failed"
            );
            e
        })?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::debug!(
            request_id = %request.id,
            status = status,
            response_len = body.len(),
            "HTTP request completed"
        );

        Ok(HttpResponse { status, body })
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;

/// Mock HTTP client for testing.
///
/// Responses are keyed by `"{METHOD} {url}"` (query parameters are not part of the key) and
/// consumed in FIFO order. A request with no scripted response left fails with a non-transport
/// error.
///
/// # Example
/// ```ignore
/// let mock = MockHttpClient::new();
/// mock.add_response(
///     "GET https://api.example.com/items/1",
///     Ok(HttpResponse::new(200, r#"{"results": []}"#)),
/// );
/// ```
#[derive(Clone)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, Vec<MockResponse>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

/// A scripted mock response.
enum MockResponse {
    /// Immediate response
    Immediate(Result<HttpResponse>),
    /// Response delivered after a delay (tokio time, so paused-clock tests advance instantly)
    Delayed {
        delay: Duration,
        response: Result<HttpResponse>,
    },
    /// Response that waits for a trigger signal before completing
    Triggered {
        response: Result<HttpResponse>,
        trigger: Arc<Mutex<Option<oneshot::Receiver<()>>>>,
    },
    /// Never completes; the caller's timeout has to fire
    Hang,
}

/// Record of a call made to the mock HTTP client.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub id: String,
    pub method: String,
    pub url: String,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<RequestBody>,
    pub timeout: Duration,
    /// When the call was made (tokio clock)
    pub at: tokio::time::Instant,
}

impl MockHttpClient {
    /// Create a new mock HTTP client.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn push(&self, key: &str, response: MockResponse) {
        self.responses
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(response);
    }

    /// Add a predetermined response for a specific method and URL.
    pub fn add_response(&self, key: &str, response: Result<HttpResponse>) {
        self.push(key, MockResponse::Immediate(response));
    }

    /// Add the same response `times` times.
    pub fn add_responses(&self, key: &str, times: usize, response: HttpResponse) {
        for _ in 0..times {
            self.add_response(key, Ok(response.clone()));
        }
    }

    /// Add a response that is delivered after `delay`.
    pub fn add_response_with_delay(
        &self,
        key: &str,
        delay: Duration,
        response: Result<HttpResponse>,
    ) {
        self.push(key, MockResponse::Delayed { delay, response });
    }

    /// Add a response that will wait for a manual trigger before completing.
    ///
    /// Returns a sender that when triggered (by sending `()` or dropping) will
    /// cause the HTTP request to complete with the given response.
    pub fn add_response_with_trigger(
        &self,
        key: &str,
        response: Result<HttpResponse>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.push(
            key,
            MockResponse::Triggered {
                response,
                trigger: Arc::new(Mutex::new(Some(rx))),
            },
        );
        tx
    }

    /// Add `times` attempts that never complete.
    pub fn add_hangs(&self, key: &str, times: usize) {
        for _ in 0..times {
            self.push(key, MockResponse::Hang);
        }
    }

    /// Get all calls that have been made to this mock client.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Calls made for a given request id, in order.
    pub fn calls_for(&self, id: &str) -> Vec<MockCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.id == id)
            .cloned()
            .collect()
    }

    /// Clear all recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Get the number of requests currently in-flight (executing).
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of requests that were in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(
        &self,
        request: &RequestDescriptor,
        timeout: Duration,
    ) -> Result<HttpResponse> {
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        // Guard to ensure we decrement even if cancelled/panicked
        let in_flight = self.in_flight.clone();
        let _guard = scopeguard::guard((), move |_| {
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        self.calls.lock().push(MockCall {
            id: request.id.clone(),
            method: request.method.to_string(),
            url: request.url.clone(),
            query: request.query.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            timeout,
            at: tokio::time::Instant::now(),
        });

        let key = format!("{} {}", request.method, request.url);
        let mock_response = {
            let mut responses = self.responses.lock();
            match responses.get_mut(&key) {
                Some(queue) if !queue.is_empty() => Some(queue.remove(0)),
                _ => None,
            }
        };

        match mock_response {
            Some(MockResponse::Immediate(response)) => response,
            Some(MockResponse::Delayed { delay, response }) => {
                tokio::time::sleep(delay).await;
                response
            }
            Some(MockResponse::Triggered { response, trigger }) => {
                let rx = trigger.lock().take();
                if let Some(rx) = rx {
                    // Proceed whether the trigger fired or was dropped
                    let _ = rx.await;
                }
                response
            }
            Some(MockResponse::Hang) => std::future::pending().await,
            None => Err(VolleyError::Other(anyhow::anyhow!(
                "No mock response configured for {}",
                key
            ))),
        }
    }
}
