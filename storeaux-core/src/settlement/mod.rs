//! Payment settlement orchestration.
//!
//! One request, one strictly sequential flow: create or confirm the intent
//! with the gateway, branch on the intent status, and on `succeeded`
//! authenticate against the backend and mark the order as paid.
//!
//! The two halves of the flow have different failure policies. Charge-path
//! failures are user-visible: a card decline comes back as an outcome the
//! handler turns into a 200 with an error message. Settlement-path failures
//! are operator-visible only: the client has already been charged, so the
//! client still sees success while the failure is logged and handed to the
//! reconciliation queue.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{AuthToken, BackendApi, BackendError};
use crate::gateway::{GatewayError, IntentStatus, PaymentGateway};
use crate::reconcile::{ChargedUnsettled, ReconcileHandle};
use thiserror::Error;

/// A single payment request, constructed per incoming HTTP request.
///
/// Exactly one of `payment_method_id` (first call, creates the intent) or
/// `payment_intent_id` (follow-up call after a client-side SDK action,
/// confirms the intent) must be set.
#[derive(Debug, Clone, Default)]
pub struct PaymentRequest {
    pub payment_method_id: Option<String>,
    pub payment_intent_id: Option<String>,
    /// Backend order to settle on success. When absent or empty, the
    /// charge still happens but settlement is silently skipped.
    pub order_id: Option<String>,
}

/// Terminal outcome of one settlement attempt, as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The gateway needs a client-side SDK step; the client secret is
    /// echoed back so the frontend can continue the flow.
    ActionRequired { client_secret: String },
    /// The charge went through. Terminal for the client regardless of the
    /// downstream settlement result.
    Succeeded,
    /// The gateway declined the card; the message is user-facing.
    CardDeclined { message: String },
}

/// Charge-path failures that abort the request.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// The request carried neither or both of the intent fields.
    #[error("{0}")]
    InvalidRequest(&'static str),

    /// The gateway reported a status the flow does not recognize.
    #[error("Invalid PaymentIntent status")]
    InvalidIntentStatus,

    /// The gateway call failed for a non-card reason.
    #[error(transparent)]
    Gateway(GatewayError),
}

/// Bounded exponential backoff for the settlement calls.
///
/// Applies only to `tokenCreate` and `orderMarkAsPaid`, which are
/// idempotent against the backend. The charge itself is never retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// The settlement orchestrator.
///
/// Holds the outbound clients behind trait objects and the reconciliation
/// queue handle. Cheap to clone; shared across all request handlers.
#[derive(Clone)]
pub struct SettlementService {
    gateway: Arc<dyn PaymentGateway>,
    backend: Arc<dyn BackendApi>,
    retry: RetryPolicy,
    reconcile: ReconcileHandle,
}

impl SettlementService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        backend: Arc<dyn BackendApi>,
        retry: RetryPolicy,
        reconcile: ReconcileHandle,
    ) -> Self {
        Self {
            gateway,
            backend,
            retry,
            reconcile,
        }
    }

    /// Run the full confirm-and-settle flow for one request.
    pub async fn confirm_and_settle(
        &self,
        request: PaymentRequest,
    ) -> Result<PaymentOutcome, SettlementError> {
        let intent = match (&request.payment_method_id, &request.payment_intent_id) {
            (Some(pm), None) => self.gateway.create_intent(pm).await,
            (None, Some(pi)) => self.gateway.confirm_intent(pi).await,
            (Some(_), Some(_)) => {
                return Err(SettlementError::InvalidRequest(
                    "provide only one of payment_method_id or payment_intent_id",
                ));
            }
            (None, None) => {
                return Err(SettlementError::InvalidRequest(
                    "payment_method_id or payment_intent_id is required",
                ));
            }
        };

        let intent = match intent {
            Ok(intent) => intent,
            Err(GatewayError::Card { message }) => {
                tracing::info!(reason = %message, "Gateway declined the card");
                return Ok(PaymentOutcome::CardDeclined { message });
            }
            Err(e) => return Err(SettlementError::Gateway(e)),
        };

        if intent.requires_sdk_action() {
            let client_secret = match intent.client_secret {
                Some(secret) => secret,
                None => {
                    // Malformed gateway response: an action the client must
                    // finish needs the secret to continue the flow.
                    tracing::warn!(
                        intent_id = %intent.id,
                        "Gateway omitted client_secret on a requires_action intent"
                    );
                    String::new()
                }
            };
            return Ok(PaymentOutcome::ActionRequired { client_secret });
        }

        if intent.status != IntentStatus::Succeeded {
            tracing::warn!(
                intent_id = %intent.id,
                status = ?intent.status,
                "Unexpected PaymentIntent status"
            );
            return Err(SettlementError::InvalidIntentStatus);
        }

        // Invariant: settlement runs only on an intent whose status is
        // exactly `succeeded`.
        match request.order_id.as_deref() {
            Some(order_id) if !order_id.is_empty() => {
                self.settle_order(order_id, &intent.id).await;
            }
            _ => {
                tracing::debug!(
                    intent_id = %intent.id,
                    "No order_id in request, skipping settlement"
                );
            }
        }

        Ok(PaymentOutcome::Succeeded)
    }

    /// Best-effort settlement: authenticate, then mark the order as paid.
    ///
    /// Failures never reach the client. They are logged with an alertable
    /// event and queued for the reconciliation worker, since at this point
    /// the card has already been charged.
    async fn settle_order(&self, order_id: &str, intent_id: &str) {
        let token = match self.authenticate().await {
            Some(token) => token,
            None => {
                self.record_unsettled(order_id, intent_id).await;
                return;
            }
        };

        match self.mark_order_paid(order_id, &token).await {
            Some(is_paid) => {
                tracing::info!(order_id = %order_id, is_paid, "Order settled");
            }
            None => {
                self.record_unsettled(order_id, intent_id).await;
            }
        }
    }

    /// Obtain a fresh bearer token, retrying per policy. Returns `None`
    /// after the final attempt fails.
    async fn authenticate(&self) -> Option<AuthToken> {
        match self.with_retry("tokenCreate", || self.backend.token_create()).await {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::error!(error = %e, "Settlement authentication failed");
                None
            }
        }
    }

    /// Issue the mark-paid mutation, retrying per policy. Returns `None`
    /// after the final attempt fails.
    async fn mark_order_paid(&self, order_id: &str, token: &AuthToken) -> Option<bool> {
        let result = self
            .with_retry("orderMarkAsPaid", || {
                self.backend.order_mark_as_paid(order_id, token)
            })
            .await;
        match result {
            Ok(is_paid) => Some(is_paid),
            Err(e) => {
                tracing::error!(
                    order_id = %order_id,
                    error = %e,
                    "Mark-paid mutation failed"
                );
                None
            }
        }
    }

    async fn with_retry<T, F, Fut>(&self, op: &str, mut f: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, BackendError>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    tracing::warn!(
                        operation = op,
                        attempt = attempt + 1,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Settlement call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn record_unsettled(&self, order_id: &str, intent_id: &str) {
        // Alertable: the card has been charged but the order is not marked
        // paid, and the client has already been told the payment worked.
        tracing::error!(
            order_id = %order_id,
            payment_intent_id = %intent_id,
            "Order charged but not settled, queued for reconciliation"
        );
        self.reconcile
            .enqueue(ChargedUnsettled::new(order_id, intent_id))
            .await;
    }
}
