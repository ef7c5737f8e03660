//! Background delivery with retries.
//!
//! [`TelemetryClient`] drives a [`BatchSender`] and reacts to every
//! [`ResponseError`]: backing off, honouring requested waits, splitting
//! oversized batches and dropping rejected ones. Each batch is delivered by
//! its own tracked tokio task.
//!
//! The records held by in-flight deliveries are counted. Once that count
//! would pass `max_pending_records`, new batches are refused and dropped.

use crate::backoff::Backoff;
use crate::batch::Batch;
use crate::config::{BackoffConfig, Config, DEFAULT_MAX_PENDING_RECORDS};
use crate::error::Result;
use crate::http::ReqwestPoster;
use crate::response::ResponseError;
use crate::sender::BatchSender;
use crate::telemetry::Telemetry;
use crate::transport::HttpPoster;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

type Delivery = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Shared<T, P> {
    sender: BatchSender<T, P>,
    backoff: BackoffConfig,
    pending: Arc<AtomicUsize>,
    tracker: TaskTracker,
    cancel_token: CancellationToken,
}

/// Releases a delivery's share of the pending record count when dropped.
struct PendingRecords {
    pending: Arc<AtomicUsize>,
    count: usize,
}

impl Drop for PendingRecords {
    fn drop(&mut self) {
        self.pending.fetch_sub(self.count, Ordering::AcqRel);
    }
}

/// Sends batches in the background, retrying as the collector directs.
pub struct TelemetryClient<T, P> {
    shared: Arc<Shared<T, P>>,
    max_pending: usize,
}

impl<T: Telemetry> TelemetryClient<T, ReqwestPoster> {
    /// Creates a client posting with `reqwest`, configured from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured or the HTTP client
    /// cannot be created.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(BatchSender::from_config(config)?, config.backoff)
            .with_max_pending_records(config.max_pending_records))
    }
}

impl<T: Telemetry, P: HttpPoster + 'static> TelemetryClient<T, P> {
    /// Creates a client over `sender`.
    pub fn new(sender: BatchSender<T, P>, backoff: BackoffConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                sender,
                backoff,
                pending: Arc::new(AtomicUsize::new(0)),
                tracker: TaskTracker::new(),
                cancel_token: CancellationToken::new(),
            }),
            max_pending: DEFAULT_MAX_PENDING_RECORDS,
        }
    }

    /// Limits how many records may be awaiting delivery at once.
    #[must_use]
    pub fn with_max_pending_records(mut self, max: usize) -> Self {
        self.max_pending = max;
        self
    }

    /// Queues `batch` for delivery and returns immediately.
    ///
    /// Must be called from within a tokio runtime. Batches submitted after
    /// [`shutdown`](Self::shutdown) are dropped.
    pub fn send_batch(&self, batch: Batch<T>) {
        if self.shared.cancel_token.is_cancelled() {
            tracing::warn!(
                kind = %T::KIND,
                count = batch.len(),
                "Client is shut down, dropping batch"
            );
            return;
        }
        if !self.reserve(batch.len()) {
            tracing::warn!(
                kind = %T::KIND,
                count = batch.len(),
                pending = self.pending_records(),
                max = self.max_pending,
                "Refusing to send batch over the pending record limit, data is being lost"
            );
            return;
        }
        spawn_delivery(&self.shared, batch);
    }

    fn reserve(&self, count: usize) -> bool {
        self.shared
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| {
                pending
                    .checked_add(count)
                    .filter(|total| *total <= self.max_pending)
            })
            .is_ok()
    }

    /// Records held by deliveries that have not finished yet.
    pub fn pending_records(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Waits until every queued batch has been delivered or dropped,
    /// including retries and split halves.
    pub async fn flush(&self) {
        self.shared.tracker.close();
        self.shared.tracker.wait().await;
        self.shared.tracker.reopen();
        // A shutdown racing this flush must still see a closed tracker.
        if self.shared.cancel_token.is_cancelled() {
            self.shared.tracker.close();
        }
    }

    /// Cancels pending retry waits and waits for in-flight sends to finish.
    pub async fn shutdown(&self) {
        tracing::debug!(
            kind = %T::KIND,
            pending = self.shared.tracker.len(),
            "Shutting down telemetry client"
        );
        self.shared.cancel_token.cancel();
        self.shared.tracker.close();
        self.shared.tracker.wait().await;
    }

    /// The underlying sender.
    pub fn sender(&self) -> &BatchSender<T, P> {
        &self.shared.sender
    }
}

fn spawn_delivery<T: Telemetry, P: HttpPoster + 'static>(
    shared: &Arc<Shared<T, P>>,
    batch: Batch<T>,
) {
    shared.tracker.spawn(deliver(Arc::clone(shared), batch));
}

fn deliver<T: Telemetry, P: HttpPoster + 'static>(
    shared: Arc<Shared<T, P>>,
    batch: Batch<T>,
) -> Delivery {
    let mut reserved = PendingRecords {
        pending: Arc::clone(&shared.pending),
        count: batch.len(),
    };
    Box::pin(async move {
        let mut backoff = Backoff::from_config(&shared.backoff);

        loop {
            let wait = match shared.sender.send_batch(&batch).await {
                Ok(response) => {
                    tracing::debug!(
                        kind = %T::KIND,
                        request_id = %batch.request_id(),
                        status = response.status_code,
                        "Batch sent"
                    );
                    return;
                }
                Err(ResponseError::RetryWithBackoff { status, source }) => {
                    match backoff.next_wait() {
                        Some(wait) => {
                            tracing::info!(
                                kind = %T::KIND,
                                ?status,
                                error = source.as_ref().map(tracing::field::display),
                                wait_ms = wait.as_millis() as u64,
                                "Batch sending failed, backing off"
                            );
                            wait
                        }
                        None => {
                            tracing::error!(
                                kind = %T::KIND,
                                count = batch.len(),
                                attempts = backoff.attempts(),
                                "Max retries exceeded, dropping batch"
                            );
                            return;
                        }
                    }
                }
                Err(ResponseError::RetryWithRequestedWait { wait }) => {
                    if !backoff.record_attempt() {
                        tracing::error!(
                            kind = %T::KIND,
                            count = batch.len(),
                            attempts = backoff.attempts(),
                            "Max retries exceeded while rate limited, dropping batch"
                        );
                        return;
                    }
                    tracing::info!(
                        kind = %T::KIND,
                        wait_ms = wait.as_millis() as u64,
                        "Retrying batch after requested wait"
                    );
                    wait
                }
                Err(ResponseError::RetryWithSplit) => {
                    if batch.len() <= 1 {
                        tracing::error!(
                            kind = %T::KIND,
                            request_id = %batch.request_id(),
                            "Single-record batch is too large, dropping"
                        );
                        return;
                    }
                    tracing::info!(
                        kind = %T::KIND,
                        count = batch.len(),
                        "Batch too large, splitting and retrying"
                    );
                    // The halves take over this batch's pending records.
                    reserved.count = 0;
                    for half in batch.split() {
                        spawn_delivery(&shared, half);
                    }
                    return;
                }
                Err(ResponseError::DiscardBatch { status }) => {
                    tracing::error!(
                        kind = %T::KIND,
                        ?status,
                        count = batch.len(),
                        "Received a fatal response from the New Relic API, dropping batch"
                    );
                    return;
                }
            };

            if !pause(&shared.cancel_token, wait).await {
                tracing::warn!(
                    kind = %T::KIND,
                    count = batch.len(),
                    "Client shut down while waiting to retry, dropping batch"
                );
                return;
            }
        }
    })
}

/// Sleeps for `wait` unless cancelled first. Returns false on cancellation.
async fn pause(cancel_token: &CancellationToken, wait: Duration) -> bool {
    if wait.is_zero() {
        return !cancel_token.is_cancelled();
    }
    tokio::select! {
        () = cancel_token.cancelled() => false,
        () = tokio::time::sleep(wait) => true,
    }
}
