//! GraphQL client for the storefront backend.
//!
//! Every operation is a plain HTTP POST of `{query, variables}`. Responses
//! are decoded into per-operation structs where every field is optional:
//! the backend is free to return `data` with null members alongside an
//! `errors` array, and callers must handle absent fields defensively.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

use super::{AuthToken, BackendApi, BackendError};

const TOKEN_CREATE: &str = r#"
mutation tokenCreate($email: String!, $password: String!) {
    tokenCreate(email: $email, password: $password) {
        token
        user { id }
    }
}
"#;

const ORDER_MARK_AS_PAID: &str = r#"
mutation orderMarkAsPaid($id: ID!) {
    orderMarkAsPaid(id: $id) {
        order { isPaid }
    }
}
"#;

const CONFIRM_ACCOUNT: &str = r#"
mutation confirmAccount($email: String!, $token: String!) {
    confirmAccount(email: $email, token: $token) {
        user { isActive }
        accountErrors { message }
    }
}
"#;

const SET_PASSWORD: &str = r#"
mutation setPassword($email: String!, $password: String!, $token: String!) {
    setPassword(email: $email, password: $password, token: $token) {
        user { email isActive }
        accountErrors { field message }
    }
}
"#;

/// Configuration for the backend client.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// GraphQL endpoint, e.g. `http://backend:8000/graphql/`.
    pub graphql_url: Url,
    /// Admin credentials used by `tokenCreate` for settlement.
    pub admin_email: String,
    pub admin_password: String,
    /// Timeout applied to every request.
    pub timeout: Duration,
}

/// HTTP client for the storefront backend.
#[derive(Debug, Clone)]
pub struct GraphqlClient {
    http: reqwest::Client,
    config: BackendConfig,
}

/// Generic GraphQL response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct TokenCreateData {
    #[serde(rename = "tokenCreate")]
    token_create: Option<TokenCreatePayload>,
}

#[derive(Debug, Deserialize)]
struct TokenCreatePayload {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderMarkAsPaidData {
    #[serde(rename = "orderMarkAsPaid")]
    order_mark_as_paid: Option<OrderMarkAsPaidPayload>,
}

#[derive(Debug, Deserialize)]
struct OrderMarkAsPaidPayload {
    order: Option<OrderPayload>,
}

#[derive(Debug, Deserialize)]
struct OrderPayload {
    #[serde(rename = "isPaid")]
    is_paid: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ConfirmAccountData {
    #[serde(rename = "confirmAccount")]
    confirm_account: Option<AccountMutationPayload>,
}

#[derive(Debug, Deserialize)]
struct SetPasswordData {
    #[serde(rename = "setPassword")]
    set_password: Option<AccountMutationPayload>,
}

#[derive(Debug, Deserialize)]
struct AccountMutationPayload {
    user: Option<AccountUser>,
    #[serde(rename = "accountErrors", default)]
    account_errors: Vec<AccountError>,
}

#[derive(Debug, Deserialize)]
struct AccountUser {
    #[serde(rename = "isActive")]
    _is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct AccountError {
    message: String,
}

/// Outcome of an account-facing mutation (`confirmAccount`, `setPassword`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountOutcome {
    Ok,
    /// The backend rejected the mutation; the message is user-facing.
    Rejected(String),
}

impl GraphqlClient {
    /// Build a backend client with the configured timeout.
    pub fn new(config: BackendConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
        token: Option<&AuthToken>,
    ) -> Result<T, BackendError> {
        let mut request = self
            .http
            .post(self.config.graphql_url.clone())
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(token) = token {
            request = request.bearer_auth(&token.0);
        }
        let response = request.send().await?;

        let bytes = response.bytes().await?;
        let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;

        if let Some(first) = envelope.errors.first() {
            return Err(BackendError::Graphql(first.message.clone()));
        }
        envelope.data.ok_or(BackendError::MissingField("data"))
    }

    /// `confirmAccount(email, token)` — activate an account after the user
    /// followed the confirmation link.
    pub async fn confirm_account(
        &self,
        email: &str,
        token: &str,
    ) -> Result<AccountOutcome, BackendError> {
        let data: ConfirmAccountData = self
            .execute(CONFIRM_ACCOUNT, json!({ "email": email, "token": token }), None)
            .await?;

        let payload = data
            .confirm_account
            .ok_or(BackendError::MissingField("confirmAccount"))?;
        match payload.user {
            Some(_) => Ok(AccountOutcome::Ok),
            None => Ok(AccountOutcome::Rejected(first_error_message(
                &payload.account_errors,
            ))),
        }
    }

    /// `setPassword(email, password, token)` — complete a password reset.
    pub async fn set_password(
        &self,
        email: &str,
        password: &str,
        token: &str,
    ) -> Result<AccountOutcome, BackendError> {
        let data: SetPasswordData = self
            .execute(
                SET_PASSWORD,
                json!({ "email": email, "password": password, "token": token }),
                None,
            )
            .await?;

        let payload = data
            .set_password
            .ok_or(BackendError::MissingField("setPassword"))?;
        if payload.account_errors.is_empty() {
            Ok(AccountOutcome::Ok)
        } else {
            Ok(AccountOutcome::Rejected(first_error_message(
                &payload.account_errors,
            )))
        }
    }
}

fn first_error_message(errors: &[AccountError]) -> String {
    errors
        .first()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| "Unknown error.".to_string())
}

#[async_trait]
impl BackendApi for GraphqlClient {
    async fn token_create(&self) -> Result<AuthToken, BackendError> {
        let data: TokenCreateData = self
            .execute(
                TOKEN_CREATE,
                json!({
                    "email": self.config.admin_email,
                    "password": self.config.admin_password,
                }),
                None,
            )
            .await?;

        data.token_create
            .and_then(|p| p.token)
            .map(AuthToken)
            .ok_or(BackendError::MissingField("tokenCreate.token"))
    }

    async fn order_mark_as_paid(
        &self,
        order_id: &str,
        token: &AuthToken,
    ) -> Result<bool, BackendError> {
        let data: OrderMarkAsPaidData = self
            .execute(ORDER_MARK_AS_PAID, json!({ "id": order_id }), Some(token))
            .await?;

        data.order_mark_as_paid
            .and_then(|p| p.order)
            .and_then(|o| o.is_paid)
            .ok_or(BackendError::MissingField("orderMarkAsPaid.order.isPaid"))
    }
}
