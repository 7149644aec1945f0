//! Concurrent fan-out of many requests.
//!
//! The coordinator turns its input (descriptors, loose request specs, a templated batch or a
//! page range) into one slot per request, spawns a task per dispatchable slot onto the tokio
//! runtime, and waits for every task. Results come back in submission order no matter which
//! request finishes first, and one request failing never stops its siblings.
//!
//! Inputs that cannot be turned into a request are never dispatched. They get a
//! configuration-error result in their slot, except templated items under
//! [`InvalidItemPolicy::Drop`], which are left out of the output.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::aggregate::{AggregatedResults, ResultAggregator};
use crate::batch::TemplatedBatch;
use crate::config::{FetchConfig, InvalidItemPolicy};
use crate::error::{Result, VolleyError};
use crate::executor::RequestExecutor;
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::metrics;
use crate::request::{FetchError, FetchResult, RequestDescriptor, RequestSpec};

/// One position in the output.
enum Slot {
    /// Needs to go over the wire
    Dispatch(RequestDescriptor),
    /// Already decided without a request
    Ready(FetchResult),
}

enum Pending {
    Ready(FetchResult),
    Spawned {
        id: String,
        handle: JoinHandle<FetchResult>,
    },
}

/// Build the descriptors for `GET url?page=k`, `k` in `1..=total_pages`.
pub fn page_descriptors(url: &str, total_pages: u32) -> Vec<RequestDescriptor> {
    (1..=total_pages)
        .map(|page| {
            RequestDescriptor::get(format!("page-{}", page), url)
                .with_query("page", page.to_string())
        })
        .collect()
}

/// Dispatches batches of requests through one shared [`RequestExecutor`].
pub struct FanOutCoordinator<H: HttpClient> {
    executor: RequestExecutor<H>,
    max_concurrency: Option<usize>,
    batch_deadline: Option<Duration>,
    invalid_item_policy: InvalidItemPolicy,
    aggregator: ResultAggregator,
}

impl FanOutCoordinator<ReqwestHttpClient> {
    /// Validate `config` and build the shared reqwest client from it.
    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        config.validate()?;
        let client = ReqwestHttpClient::from_config(&config.client)?;
        Ok(Self::new(Arc::new(client), config))
    }
}

impl<H: HttpClient + 'static> FanOutCoordinator<H> {
    pub fn new(http_client: Arc<H>, config: &FetchConfig) -> Self {
        Self {
            executor: RequestExecutor::from_config(http_client, config),
            max_concurrency: config.max_concurrency,
            batch_deadline: config.batch_deadline(),
            invalid_item_policy: config.invalid_item_policy,
            aggregator: ResultAggregator::new(config.results_field.clone()),
        }
    }

    pub fn executor(&self) -> &RequestExecutor<H> {
        &self.executor
    }

    pub fn aggregator(&self) -> &ResultAggregator {
        &self.aggregator
    }

    /// Execute every descriptor concurrently. One result per descriptor, in input order.
    pub async fn run(&self, descriptors: Vec<RequestDescriptor>) -> Vec<FetchResult> {
        self.run_with_cancellation(descriptors, &CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), but requests still running when `cancellation` fires finish
    /// as [`FetchError::Cancelled`]. Results that were already complete are kept.
    pub async fn run_with_cancellation(
        &self,
        descriptors: Vec<RequestDescriptor>,
        cancellation: &CancellationToken,
    ) -> Vec<FetchResult> {
        let slots = descriptors.into_iter().map(Slot::Dispatch).collect();
        self.dispatch(slots, cancellation).await
    }

    /// Convert loose request specs and execute them. A spec that does not convert gets a
    /// configuration-error result in its slot and is never sent.
    pub async fn run_specs(&self, specs: Vec<RequestSpec>) -> Vec<FetchResult> {
        let slots = specs
            .into_iter()
            .map(|spec| {
                let id = spec.identifier();
                match RequestDescriptor::try_from(spec) {
                    Ok(descriptor) => Slot::Dispatch(descriptor),
                    Err(e) => {
                        tracing::warn!(request_id = %id, error = %e, "Invalid request, not dispatching");
                        let message = match e {
                            VolleyError::ValidationError(message) => message,
                            other => other.to_string(),
                        };
                        Slot::Ready(FetchResult::misconfigured(id, message))
                    }
                }
            })
            .collect();

        self.dispatch(slots, &CancellationToken::new()).await
    }

    /// Render and execute a templated batch.
    ///
    /// Items that cannot be rendered are reported or dropped according to the configured
    /// [`InvalidItemPolicy`]; either way they never reach the transport.
    #[tracing::instrument(skip(self, batch), fields(batch_id = %batch.batch_id, items = batch.items.len()))]
    pub async fn run_templated(&self, batch: &TemplatedBatch) -> Vec<FetchResult> {
        let mut slots = Vec::with_capacity(batch.items.len());

        for item in batch.render() {
            match item.descriptor {
                Ok(descriptor) => slots.push(Slot::Dispatch(descriptor)),
                Err(e) => match self.invalid_item_policy {
                    InvalidItemPolicy::Report => {
                        tracing::warn!(
                            request_id = %item.id,
                            index = item.index,
                            error = %e,
                            "Templated item cannot be rendered, reporting as failed"
                        );
                        slots.push(Slot::Ready(FetchResult::misconfigured(
                            item.id,
                            e.to_string(),
                        )));
                    }
                    InvalidItemPolicy::Drop => {
                        tracing::warn!(
                            request_id = %item.id,
                            index = item.index,
                            error = %e,
                            "Templated item cannot be rendered, dropping"
                        );
                    }
                },
            }
        }

        self.dispatch(slots, &CancellationToken::new()).await
    }

    /// Fetch pages `1..=total_pages` of a paged endpoint and merge their records.
    pub async fn run_pages(&self, url: &str, total_pages: u32) -> AggregatedResults {
        let results = self.run(page_descriptors(url, total_pages)).await;
        self.aggregator.merge(&results)
    }

    #[tracing::instrument(skip(self, slots, cancellation), fields(requests = slots.len()))]
    async fn dispatch(&self, slots: Vec<Slot>, cancellation: &CancellationToken) -> Vec<FetchResult> {
        let started = Instant::now();
        let batch_token = cancellation.child_token();
        // Abandoning the batch future cancels whatever is still running
        let _cancel_on_drop = batch_token.clone().drop_guard();

        if let Some(deadline) = self.batch_deadline {
            let token = batch_token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(deadline) => {
                        tracing::warn!(
                            deadline_ms = deadline.as_millis() as u64,
                            "Batch deadline elapsed, cancelling remaining requests"
                        );
                        token.cancel();
                    }
                    // Batch finished, was cancelled, or was dropped
                    _ = token.cancelled() => {}
                }
            });
        }

        let semaphore = self.max_concurrency.map(|limit| Arc::new(Semaphore::new(limit)));

        let pending: Vec<Pending> = slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Ready(result) => Pending::Ready(result),
                Slot::Dispatch(descriptor) => {
                    let id = descriptor.id.clone();
                    let executor = self.executor.clone();
                    let semaphore = semaphore.clone();
                    let token = batch_token.clone();

                    let handle = tokio::spawn(async move {
                        let _permit = match semaphore {
                            Some(semaphore) => tokio::select! {
                                permit = semaphore.acquire_owned() => permit.ok(),
                                _ = token.cancelled() => {
                                    return FetchResult::failed(&descriptor.id, 0, FetchError::Cancelled);
                                }
                            },
                            None => None,
                        };

                        metrics::request_started();
                        let _in_flight = scopeguard::guard((), |_| metrics::request_finished());

                        executor.execute_with_cancellation(&descriptor, &token).await
                    });

                    Pending::Spawned { id, handle }
                }
            })
            .collect();

        // join_all yields in input order, whatever order the tasks finish in
        let results = join_all(pending.into_iter().map(|slot| async move {
            match slot {
                Pending::Ready(result) => result,
                Pending::Spawned { id, handle } => match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(request_id = %id, error = %e, "Request task terminated");
                        FetchResult::failed(
                            id,
                            0,
                            FetchError::Unexpected {
                                cause: "task terminated".to_string(),
                            },
                        )
                    }
                },
            }
        }))
        .await;

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let skipped = results.iter().filter(|r| r.is_skipped()).count();
        let failed = results.iter().filter(|r| r.is_failed()).count();
        tracing::info!(
            total = results.len(),
            succeeded,
            skipped,
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch finished"
        );

        results
    }
}
