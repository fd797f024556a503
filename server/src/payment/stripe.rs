use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use super::{CheckoutRequest, CheckoutSession, CheckoutSessionStatus, PaymentProvider};
use crate::config::PaymentConfig;
use crate::utils::error::AppError;

const API_BASE: &str = "https://api.stripe.com/v1";

/// Minimal client for Stripe Checkout: create a hosted session, read it back.
#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    secret_key: String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
    payment_status: Option<String>,
    payment_intent: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

impl StripeClient {
    pub fn new(config: &PaymentConfig) -> Self {
        Self {
            http: Client::new(),
            secret_key: config.secret_key.clone(),
            api_base: API_BASE.to_string(),
        }
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let detail = response
            .json::<ErrorEnvelope>()
            .await
            .ok()
            .and_then(|e| e.error.message)
            .unwrap_or_default();
        warn!(%status, detail = %detail, "Stripe request failed");
        Err(AppError::ExternalServiceError(
            "Der Zahlungsdienst hat die Anfrage abgelehnt.".to_string(),
        ))
    }
}

/// Stripe's form encoding for nested parameters: `line_items[0][quantity]=2`.
pub(crate) fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("customer_email".to_string(), request.customer_email.clone()),
    ];
    for (i, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        form.push((
            format!("{prefix}[price_data][currency]"),
            request.currency.clone(),
        ));
        form.push((
            format!("{prefix}[price_data][product_data][name]"),
            item.name.clone(),
        ));
        form.push((
            format!("{prefix}[price_data][unit_amount]"),
            item.unit_amount_cents.to_string(),
        ));
        form.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
    }
    for (key, value) in &request.metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }
    form
}

/// Checkout session ids are `cs_` followed by alphanumerics and underscores.
fn valid_session_id(id: &str) -> bool {
    id.strip_prefix("cs_").is_some_and(|rest| {
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, AppError> {
        let response = self
            .http
            .post(format!("{}/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&checkout_form(request))
            .send()
            .await?;
        let session: SessionResponse = Self::parse(response).await?;
        let url = session.url.ok_or_else(|| {
            AppError::ExternalServiceError("Der Zahlungsdienst lieferte keinen Link.".to_string())
        })?;
        info!(session_id = %session.id, "Checkout session created");
        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSessionStatus, AppError> {
        if !valid_session_id(session_id) {
            warn!(session_id = %session_id, "Rejected malformed checkout session id");
            return Err(AppError::ValidationError("Ungültige Zahlungssitzung.".to_string()));
        }
        let response = self
            .http
            .get(format!("{}/checkout/sessions/{session_id}", self.api_base))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        let session: SessionResponse = Self::parse(response).await?;
        Ok(CheckoutSessionStatus {
            paid: session.payment_status.as_deref() == Some("paid"),
            payment_reference: session.payment_intent,
            metadata: session.metadata,
            id: session.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::LineItem;
    use super::*;

    #[test]
    fn test_checkout_form_encodes_line_items_and_metadata() {
        let request = CheckoutRequest {
            customer_email: "anna@example.com".into(),
            currency: "eur".into(),
            line_items: vec![
                LineItem {
                    name: "Ballticket".into(),
                    unit_amount_cents: 3500,
                    quantity: 2,
                },
                LineItem {
                    name: "Versand".into(),
                    unit_amount_cents: 450,
                    quantity: 1,
                },
            ],
            metadata: BTreeMap::from([("sold_ticket_id".to_string(), "t-1".to_string())]),
            success_url: "https://ball.example.org/ok".into(),
            cancel_url: "https://ball.example.org/kaufen".into(),
        };
        let form = checkout_form(&request);
        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("3500"));
        assert_eq!(get("line_items[0][quantity]"), Some("2"));
        assert_eq!(get("line_items[1][price_data][product_data][name]"), Some("Versand"));
        assert_eq!(get("metadata[sold_ticket_id]"), Some("t-1"));
    }

    #[test]
    fn test_session_response_tolerates_missing_fields() {
        let session: SessionResponse = serde_json::from_str(
            r#"{"id":"cs_test_1","url":null,"payment_status":"unpaid","payment_intent":null}"#,
        )
        .unwrap();
        assert_eq!(session.id, "cs_test_1");
        assert!(session.metadata.is_empty());
    }

    #[test]
    fn test_session_id_charset() {
        assert!(valid_session_id("cs_test_a1B2c3"));
        assert!(!valid_session_id("cs_"));
        assert!(!valid_session_id("pi_123"));
        assert!(!valid_session_id("cs_../../customers"));
        assert!(!valid_session_id("cs_abc?expand=x"));
    }

    #[tokio::test]
    async fn test_malformed_session_id_is_rejected_before_request() {
        let mut client = StripeClient::new(&PaymentConfig {
            secret_key: "sk_test_local".into(),
            publishable_key: "pk_test_local".into(),
            webhook_secret: None,
            currency: "eur".into(),
        });
        client.api_base = "http://127.0.0.1:9".into();
        let err = client.retrieve_session("cs_a/b").await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
