//! `POST /pay` — confirm a card payment and settle the backend order.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use storeaux_core::gateway::GatewayError;
use storeaux_core::settlement::{PaymentOutcome, PaymentRequest, SettlementError};

use crate::state::AppState;

/// Request body. Exactly one of `payment_method_id` (first call) or
/// `payment_intent_id` (follow-up after a client-side SDK action) must be
/// present. `order_id` is optional; without it the charge happens but no
/// settlement is attempted.
#[derive(Debug, Deserialize)]
pub struct PayRequest {
    #[serde(default)]
    pub payment_method_id: Option<String>,
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

/// Response body. The shape is part of the frontend contract: card errors
/// deliberately travel as HTTP 200 with an `error` field.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PayResponse {
    ActionRequired {
        requires_action: bool,
        payment_intent_client_secret: String,
    },
    Success {
        success: bool,
    },
    Error {
        error: String,
    },
}

/// `POST /pay` — run the confirm-and-settle flow.
pub(super) async fn pay(
    state: State<AppState>,
    Json(body): Json<PayRequest>,
) -> Result<impl IntoResponse, PayApiError> {
    let request = PaymentRequest {
        payment_method_id: body.payment_method_id,
        payment_intent_id: body.payment_intent_id,
        order_id: body.order_id,
    };

    let outcome = state.settlement.confirm_and_settle(request).await?;

    let response = match outcome {
        PaymentOutcome::ActionRequired { client_secret } => PayResponse::ActionRequired {
            requires_action: true,
            payment_intent_client_secret: client_secret,
        },
        PaymentOutcome::Succeeded => PayResponse::Success { success: true },
        PaymentOutcome::CardDeclined { message } => PayResponse::Error { error: message },
    };

    Ok(Json(response))
}

/// Errors that can occur in the pay handler.
#[derive(Debug)]
pub(super) enum PayApiError {
    /// The request body failed validation.
    InvalidRequest(&'static str),
    /// The gateway reported an unexpected intent status.
    InvalidIntentStatus,
    /// The gateway call failed for a non-card reason.
    Gateway(GatewayError),
}

impl From<SettlementError> for PayApiError {
    fn from(e: SettlementError) -> Self {
        match e {
            SettlementError::InvalidRequest(message) => PayApiError::InvalidRequest(message),
            SettlementError::InvalidIntentStatus => PayApiError::InvalidIntentStatus,
            SettlementError::Gateway(e) => PayApiError::Gateway(e),
        }
    }
}

impl IntoResponse for PayApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            PayApiError::InvalidRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(PayResponse::Error {
                    error: message.to_string(),
                }),
            )
                .into_response(),
            PayApiError::InvalidIntentStatus => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PayResponse::Error {
                    error: "Invalid PaymentIntent status".to_string(),
                }),
            )
                .into_response(),
            PayApiError::Gateway(e) => {
                tracing::error!(error = %e, "Gateway call failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(PayResponse::Error {
                        error: "internal server error".to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}
