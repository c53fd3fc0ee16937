//! Account relay handlers: email confirmation and password reset.
//!
//! Both endpoints forward to the backend GraphQL API and translate the
//! mutation result into a small `{success, message}` payload. Backend
//! account errors are a normal outcome (200 with `success: false`), not an
//! HTTP failure.

use axum::{Json, extract::Query, extract::State, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use storeaux_core::backend::AccountOutcome;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConfirmEmailParams {
    pub email: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub success: bool,
    pub message: String,
}

/// `GET /confirm-email?email=&token=` — relay `confirmAccount`.
pub(super) async fn confirm_email(
    state: State<AppState>,
    Query(params): Query<ConfirmEmailParams>,
) -> Result<impl IntoResponse, AccountApiError> {
    tracing::debug!(email = %params.email, "Confirming email");

    let outcome = state
        .backend
        .confirm_account(&params.email, &params.token)
        .await
        .map_err(AccountApiError::Backend)?;

    Ok(Json(match outcome {
        AccountOutcome::Ok => AccountResponse {
            success: true,
            message: "Email verified.".to_string(),
        },
        AccountOutcome::Rejected(message) => AccountResponse {
            success: false,
            message,
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
    pub token: String,
    pub new_password: String,
    pub confirm_new_password: String,
}

/// `POST /forgot-password` — relay `setPassword` after checking that the
/// two password fields match.
///
/// An undecodable or empty backend response is reported the way the
/// storefront has always shown it: `success: false` with
/// "Empty response from server."
pub(super) async fn forgot_password(
    state: State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AccountApiError> {
    if body.new_password != body.confirm_new_password {
        return Err(AccountApiError::PasswordMismatch);
    }

    let outcome = state
        .backend
        .set_password(&body.email, &body.new_password, &body.token)
        .await;

    Ok(Json(match outcome {
        Ok(AccountOutcome::Ok) => AccountResponse {
            success: true,
            message: "Password reset.".to_string(),
        },
        Ok(AccountOutcome::Rejected(message)) => AccountResponse {
            success: false,
            message,
        },
        Err(e) => {
            tracing::error!(error = %e, "setPassword relay failed");
            AccountResponse {
                success: false,
                message: "Empty response from server.".to_string(),
            }
        }
    }))
}

/// Errors that can occur in the account handlers.
#[derive(Debug)]
pub(super) enum AccountApiError {
    /// The two password fields did not match.
    PasswordMismatch,
    /// The backend call failed.
    Backend(storeaux_core::backend::BackendError),
}

impl IntoResponse for AccountApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AccountApiError::PasswordMismatch => (
                StatusCode::BAD_REQUEST,
                Json(AccountResponse {
                    success: false,
                    message: "Passwords do not match.".to_string(),
                }),
            )
                .into_response(),
            AccountApiError::Backend(e) => {
                tracing::error!(error = %e, "Account relay backend error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(AccountResponse {
                        success: false,
                        message: "internal server error".to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}
