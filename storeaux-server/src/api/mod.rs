//! Request handlers.
//!
//! # Endpoints
//!
//! - `GET  /`                – landing info (storefront + dashboard URLs)
//! - `POST /pay`             – confirm a card payment and settle the order
//! - `GET  /confirm-email`   – relay the email confirmation mutation
//! - `POST /forgot-password` – relay the password reset mutation

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

mod account;
mod pages;
mod pay;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(pages::home))
        .route("/pay", post(pay::pay))
        .route("/confirm-email", get(account::confirm_email))
        .route("/forgot-password", post(account::forgot_password))
}
