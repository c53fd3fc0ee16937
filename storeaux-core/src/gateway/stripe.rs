//! Stripe-shaped gateway client.
//!
//! Requests are form-encoded and authenticated with the secret key as a
//! bearer token. Card declines arrive as a 402 with
//! `{"error": {"type": "card_error", "message": ...}}` and are mapped to
//! [`GatewayError::Card`] so the caller can surface the message to the
//! user; every other non-2xx body becomes [`GatewayError::Api`].

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{GatewayError, PaymentGateway, PaymentIntent};

/// Configuration for the Stripe gateway client.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// API base, e.g. `https://api.stripe.com`. Overridable for tests.
    pub api_base: Url,
    /// Secret API key.
    pub secret_key: String,
    /// Charge amount in the currency's minor unit.
    ///
    /// The amount is not derived from the order; it is a fixed configured
    /// value carried over from the source system. See DESIGN.md.
    pub amount: i64,
    /// Three-letter currency code, lowercase.
    pub currency: String,
    /// Timeout applied to every request.
    pub timeout: Duration,
}

/// HTTP client for the payment gateway.
#[derive(Debug, Clone)]
pub struct StripeGateway {
    http: reqwest::Client,
    config: StripeConfig,
}

/// Error envelope returned by the gateway on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: Option<String>,
}

impl StripeGateway {
    /// Build a gateway client with the configured timeout.
    pub fn new(config: StripeConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.config.api_base.join(path).map_err(|e| GatewayError::Api {
            status: 0,
            message: format!("invalid endpoint url: {e}"),
        })
    }

    async fn send(
        &self,
        url: Url,
        form: &[(&str, String)],
    ) -> Result<PaymentIntent, GatewayError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.secret_key)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if status.is_success() {
            return Ok(serde_json::from_slice(&bytes)?);
        }

        // Non-2xx: try to pull the error envelope apart. A card decline is
        // an expected outcome, everything else is an API failure.
        match serde_json::from_slice::<ErrorEnvelope>(&bytes) {
            Ok(envelope) => {
                let message = envelope
                    .error
                    .message
                    .unwrap_or_else(|| "payment failed".to_string());
                if envelope.error.kind.as_deref() == Some("card_error") {
                    Err(GatewayError::Card { message })
                } else {
                    Err(GatewayError::Api {
                        status: status.as_u16(),
                        message,
                    })
                }
            }
            Err(_) => Err(GatewayError::Api {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            }),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(
        &self,
        payment_method_id: &str,
    ) -> Result<PaymentIntent, GatewayError> {
        let url = self.endpoint("/v1/payment_intents")?;
        let form = [
            ("payment_method", payment_method_id.to_string()),
            ("amount", self.config.amount.to_string()),
            ("currency", self.config.currency.clone()),
            ("confirmation_method", "manual".to_string()),
            ("confirm", "true".to_string()),
        ];
        self.send(url, &form).await
    }

    async fn confirm_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, GatewayError> {
        let url =
            self.endpoint(&format!("/v1/payment_intents/{payment_intent_id}/confirm"))?;
        self.send(url, &[]).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::gateway::IntentStatus;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_base: &str) -> StripeConfig {
        StripeConfig {
            api_base: api_base.parse().unwrap(),
            secret_key: "sk_test_123".to_string(),
            amount: 1099,
            currency: "usd".to_string(),
            timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn create_intent_parses_succeeded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .and(body_string_contains("payment_method=pm_123"))
            .and(body_string_contains("amount=1099"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pi_1",
                "status": "succeeded",
                "client_secret": "pi_1_secret"
            })))
            .mount(&server)
            .await;

        let gateway = StripeGateway::new(test_config(&server.uri())).unwrap();
        let intent = gateway.create_intent("pm_123").await.unwrap();
        assert_eq!(intent.status, IntentStatus::Succeeded);
        assert_eq!(intent.id, "pi_1");
    }

    #[tokio::test]
    async fn confirm_intent_reports_sdk_action() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents/pi_2/confirm"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pi_2",
                "status": "requires_action",
                "next_action": {"type": "use_stripe_sdk"},
                "client_secret": "pi_2_secret"
            })))
            .mount(&server)
            .await;

        let gateway = StripeGateway::new(test_config(&server.uri())).unwrap();
        let intent = gateway.confirm_intent("pi_2").await.unwrap();
        assert!(intent.requires_sdk_action());
        assert_eq!(intent.client_secret.as_deref(), Some("pi_2_secret"));
    }

    #[tokio::test]
    async fn card_decline_maps_to_card_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .respond_with(ResponseTemplate::new(402).set_body_json(serde_json::json!({
                "error": {
                    "type": "card_error",
                    "code": "card_declined",
                    "message": "Your card was declined."
                }
            })))
            .mount(&server)
            .await;

        let gateway = StripeGateway::new(test_config(&server.uri())).unwrap();
        let err = gateway.create_intent("pm_declined").await.unwrap_err();
        match err {
            GatewayError::Card { message } => {
                assert_eq!(message, "Your card was declined.")
            }
            other => panic!("expected card error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_card_failure_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"type": "invalid_request_error", "message": "Invalid API Key"}
            })))
            .mount(&server)
            .await;

        let gateway = StripeGateway::new(test_config(&server.uri())).unwrap();
        let err = gateway.create_intent("pm_123").await.unwrap_err();
        match err {
            GatewayError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid API Key");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_gateway_reports_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "pi_3", "status": "succeeded"}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let gateway = StripeGateway::new(test_config(&server.uri())).unwrap();
        let err = gateway.create_intent("pm_123").await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout));
    }

    #[test]
    fn unknown_status_collapses_to_other() {
        let intent: PaymentIntent = serde_json::from_value(serde_json::json!({
            "id": "pi_4",
            "status": "requires_payment_method"
        }))
        .unwrap();
        assert_eq!(intent.status, IntentStatus::Other);
        assert!(!intent.requires_sdk_action());
    }
}
