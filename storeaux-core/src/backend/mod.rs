//! Outbound storefront backend (GraphQL) interface.
//!
//! The settlement flow only needs two operations — authenticate and mark an
//! order as paid — so only those live behind the [`BackendApi`] trait. The
//! account-facing mutations (`confirmAccount`, `setPassword`) are inherent
//! methods on [`GraphqlClient`](graphql::GraphqlClient) and are exercised
//! directly by the server handlers.

pub mod graphql;

pub use graphql::{AccountOutcome, BackendConfig, GraphqlClient};

use async_trait::async_trait;
use thiserror::Error;

/// Opaque bearer token returned by `tokenCreate`.
///
/// Obtained fresh for every settlement attempt; never persisted or reused
/// across requests.
#[derive(Debug, Clone)]
pub struct AuthToken(pub String);

/// Errors produced by the backend client.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request timed out.
    #[error("backend request timed out")]
    Timeout,

    /// Transport-level failure (DNS, TLS, connection reset).
    #[error("backend transport error: {0}")]
    Transport(reqwest::Error),

    /// The response body was empty or could not be decoded.
    #[error("backend response decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The GraphQL layer returned errors instead of data.
    #[error("backend graphql error: {0}")]
    Graphql(String),

    /// The response decoded but a field the caller needs was absent.
    #[error("backend response missing field: {0}")]
    MissingField(&'static str),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout
        } else {
            BackendError::Transport(e)
        }
    }
}

/// The two backend operations the settlement flow depends on.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// `tokenCreate(email, password)` — authenticate with the configured
    /// admin credentials and return a bearer token.
    async fn token_create(&self) -> Result<AuthToken, BackendError>;

    /// `orderMarkAsPaid(id)` — mark the order as paid using the given
    /// token. Returns the resulting `isPaid` flag.
    async fn order_mark_as_paid(
        &self,
        order_id: &str,
        token: &AuthToken,
    ) -> Result<bool, BackendError>;
}
