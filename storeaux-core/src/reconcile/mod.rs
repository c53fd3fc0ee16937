//! Reconciliation of charged-but-unsettled orders.
//!
//! When the in-request settlement fails after a successful charge, the
//! orchestrator queues a [`ChargedUnsettled`] record here. The worker keeps
//! retrying the settlement with exponential backoff until it succeeds or
//! the retry cap is reached, at which point it emits a final alertable log
//! for manual follow-up.
//!
//! Records live in memory only; this service has no database. Losing the
//! queue on restart is acceptable because every enqueue is also logged at
//! error level, so the audit trail survives in the logs.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::BackendApi;
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Maximum retry attempts per record. The wait before attempt `n` is
/// `2^n` backoff units, so the longest real wait is 2^10 = 1024 seconds.
const MAX_RETRY_COUNT: u32 = 11;

/// An order whose card charge succeeded but whose mark-paid mutation did
/// not go through.
#[derive(Debug, Clone)]
pub struct ChargedUnsettled {
    pub id: Uuid,
    pub order_id: String,
    pub payment_intent_id: String,
    pub first_failed_at: OffsetDateTime,
    pub attempts: u32,
}

impl ChargedUnsettled {
    pub fn new(order_id: &str, payment_intent_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order_id.to_string(),
            payment_intent_id: payment_intent_id.to_string(),
            first_failed_at: OffsetDateTime::now_utc(),
            attempts: 0,
        }
    }
}

/// Sending half of the reconciliation queue, held by the orchestrator.
#[derive(Clone)]
pub struct ReconcileHandle {
    tx: mpsc::Sender<ChargedUnsettled>,
}

impl ReconcileHandle {
    /// Create a handle and the receiver the worker consumes.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ChargedUnsettled>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue a record for the worker. If the worker is gone or the queue
    /// is full the record is dropped; the enqueue-time error log is then
    /// the only trace, which is why the orchestrator logs before calling.
    pub async fn enqueue(&self, record: ChargedUnsettled) {
        if let Err(e) = self.tx.send(record).await {
            error!(error = %e, "Reconciliation queue unavailable, record dropped");
        }
    }
}

/// Background worker that replays failed settlements.
pub struct ReconcileWorker {
    backend: Arc<dyn BackendApi>,
    rx: mpsc::Receiver<ChargedUnsettled>,
    shutdown_rx: watch::Receiver<bool>,
    /// Base backoff unit; one second in production, shrunk in tests.
    backoff_unit: Duration,
}

impl ReconcileWorker {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        rx: mpsc::Receiver<ChargedUnsettled>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            backend,
            rx,
            shutdown_rx,
            backoff_unit: Duration::from_secs(1),
        }
    }

    #[cfg(test)]
    fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Run until the queue closes or shutdown is signalled.
    ///
    /// Records are processed one at a time; a record in backoff delays the
    /// ones behind it. Acceptable at this service's volume, where a
    /// non-empty queue already means the backend is in trouble.
    pub async fn run(mut self) {
        info!("ReconcileWorker started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("ReconcileWorker received shutdown signal");
                        break;
                    }
                }

                record = self.rx.recv() => {
                    match record {
                        Some(record) => {
                            // A true return means shutdown arrived mid-backoff.
                            if self.reconcile(record).await {
                                info!("ReconcileWorker received shutdown signal");
                                break;
                            }
                        }
                        None => {
                            info!("Reconciliation queue closed");
                            break;
                        }
                    }
                }
            }
        }

        info!("ReconcileWorker shutdown complete");
    }

    async fn reconcile(&mut self, mut record: ChargedUnsettled) -> bool {
        while record.attempts < MAX_RETRY_COUNT {
            if self.wait_or_shutdown(backoff(self.backoff_unit, record.attempts)).await {
                return true;
            }
            record.attempts += 1;

            match self.try_settle(&record).await {
                Ok(is_paid) => {
                    info!(
                        order_id = %record.order_id,
                        payment_intent_id = %record.payment_intent_id,
                        attempts = record.attempts,
                        is_paid,
                        "Reconciliation settled order"
                    );
                    return false;
                }
                Err(e) => {
                    warn!(
                        order_id = %record.order_id,
                        attempts = record.attempts,
                        error = %e,
                        "Reconciliation attempt failed"
                    );
                }
            }
        }

        // Alertable: automation gave up, a human has to settle this order.
        error!(
            order_id = %record.order_id,
            payment_intent_id = %record.payment_intent_id,
            first_failed_at = %record.first_failed_at,
            attempts = record.attempts,
            "Reconciliation exhausted retries, manual settlement required"
        );
        false
    }

    async fn try_settle(
        &self,
        record: &ChargedUnsettled,
    ) -> Result<bool, crate::backend::BackendError> {
        let token = self.backend.token_create().await?;
        self.backend
            .order_mark_as_paid(&record.order_id, &token)
            .await
    }

    /// Sleep for `delay`, returning true if shutdown arrived first.
    async fn wait_or_shutdown(&mut self, delay: Duration) -> bool {
        tokio::select! {
            biased;

            _ = self.shutdown_rx.changed() => *self.shutdown_rx.borrow(),
            _ = tokio::time::sleep(delay) => false,
        }
    }
}

/// Exponential backoff: `unit * 2^attempt`. The retry loop only passes
/// attempts below [`MAX_RETRY_COUNT`]; the clamp bounds the shift for any
/// other caller.
fn backoff(unit: Duration, attempt: u32) -> Duration {
    unit * 2u32.saturating_pow(attempt.min(MAX_RETRY_COUNT))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::{AuthToken, BackendApi, BackendError};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_and_caps() {
        let unit = Duration::from_secs(1);
        assert_eq!(backoff(unit, 0), Duration::from_secs(1));
        assert_eq!(backoff(unit, 1), Duration::from_secs(2));
        assert_eq!(backoff(unit, 10), Duration::from_secs(1024));
        assert_eq!(backoff(unit, 11), Duration::from_secs(2048));
        assert_eq!(backoff(unit, 50), Duration::from_secs(2048));
    }

    /// Backend that fails the first N settle attempts, then succeeds.
    struct FlakyBackend {
        failures_left: AtomicU32,
        settled: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BackendApi for FlakyBackend {
        async fn token_create(&self) -> Result<AuthToken, BackendError> {
            Ok(AuthToken("jwt".to_string()))
        }

        async fn order_mark_as_paid(
            &self,
            order_id: &str,
            _token: &AuthToken,
        ) -> Result<bool, BackendError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(BackendError::Graphql("still down".to_string()));
            }
            self.settled.lock().unwrap().push(order_id.to_string());
            Ok(true)
        }
    }

    #[tokio::test]
    async fn worker_retries_until_backend_recovers() {
        let backend = Arc::new(FlakyBackend {
            failures_left: AtomicU32::new(2),
            settled: Mutex::new(Vec::new()),
        });
        let (handle, rx) = ReconcileHandle::channel(4);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = ReconcileWorker::new(backend.clone(), rx, shutdown_rx)
            .with_backoff_unit(Duration::from_millis(1));
        let join = tokio::spawn(worker.run());

        handle
            .enqueue(ChargedUnsettled::new("order_1", "pi_1"))
            .await;
        drop(handle); // close the queue so the worker exits

        join.await.unwrap();
        assert_eq!(
            backend.settled.lock().unwrap().clone(),
            vec!["order_1".to_string()]
        );
    }

    #[tokio::test]
    async fn worker_stops_on_shutdown_signal() {
        let backend = Arc::new(FlakyBackend {
            failures_left: AtomicU32::new(u32::MAX),
            settled: Mutex::new(Vec::new()),
        });
        let (handle, rx) = ReconcileHandle::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = ReconcileWorker::new(backend, rx, shutdown_rx)
            .with_backoff_unit(Duration::from_millis(1));
        let join = tokio::spawn(worker.run());

        handle
            .enqueue(ChargedUnsettled::new("order_1", "pi_1"))
            .await;
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), join)
            .await
            .unwrap()
            .unwrap();
    }
}
