//! Outbound payment gateway interface.
//!
//! The gateway owns the card charge itself: it creates or confirms a
//! payment intent and reports the resulting intent status. Everything the
//! orchestrator needs from the gateway goes through the [`PaymentGateway`]
//! trait so the settlement logic can be tested without network access.

mod stripe;

pub use stripe::{StripeConfig, StripeGateway};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Next-action type the gateway asks the client to perform before the
/// intent can succeed.
pub const NEXT_ACTION_USE_SDK: &str = "use_stripe_sdk";

/// Lifecycle status of a payment intent, as reported by the gateway.
///
/// Only the two states the settlement flow branches on are named; every
/// other gateway status collapses into `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresAction,
    Succeeded,
    #[serde(other)]
    Other,
}

/// A payment intent as returned by the gateway. Read-only to this system.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: IntentStatus,
    #[serde(default)]
    pub next_action: Option<NextAction>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// The action the gateway requires from the client, if any.
#[derive(Debug, Clone, Deserialize)]
pub struct NextAction {
    #[serde(rename = "type")]
    pub kind: String,
}

impl PaymentIntent {
    /// True when the intent is waiting on a client-side SDK step.
    pub fn requires_sdk_action(&self) -> bool {
        self.status == IntentStatus::RequiresAction
            && self
                .next_action
                .as_ref()
                .is_some_and(|a| a.kind == NEXT_ACTION_USE_SDK)
    }
}

/// Errors produced by the gateway client.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway declined the card. The message is safe to show to the
    /// end user and is surfaced as a 200 response with an `error` field.
    #[error("card error: {message}")]
    Card { message: String },

    /// The gateway returned a non-2xx response that was not a card error.
    #[error("gateway api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The request timed out. Kept distinct from transport errors so the
    /// two can be told apart in logs.
    #[error("gateway request timed out")]
    Timeout,

    /// Transport-level failure (DNS, TLS, connection reset).
    #[error("gateway transport error: {0}")]
    Transport(reqwest::Error),

    /// The response body could not be decoded.
    #[error("gateway response decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Transport(e)
        }
    }
}

/// Outbound interface to the card gateway.
///
/// The charge path is never retried automatically: a repeated create call
/// can double-charge the card.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a new intent for the given payment method and confirm it in
    /// the same call.
    async fn create_intent(&self, payment_method_id: &str)
    -> Result<PaymentIntent, GatewayError>;

    /// Confirm an existing intent, typically after the client completed a
    /// required SDK action.
    async fn confirm_intent(&self, payment_intent_id: &str)
    -> Result<PaymentIntent, GatewayError>;
}
