//! Delivery through the Microsoft Graph `sendMail` endpoint, authenticated with
//! the OAuth2 client-credentials grant of an app registration.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Mailer, OutgoingMail};
use crate::config::MailConfig;
use crate::utils::error::AppError;

const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
/// Refresh this long before the token actually expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

pub struct GraphMailer {
    http: Client,
    config: MailConfig,
    token: Mutex<Option<CachedToken>>,
}

impl GraphMailer {
    pub fn new(config: MailConfig) -> Self {
        Self {
            http: Client::new(),
            config,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, AppError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        debug!("Requesting Graph access token");
        let response = self
            .http
            .post(format!(
                "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
                self.config.tenant_id
            ))
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("scope", GRAPH_SCOPE),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            warn!(status = %response.status(), "Graph token request rejected");
            return Err(AppError::ExternalServiceError(
                "Der E-Mail-Dienst ist nicht erreichbar.".to_string(),
            ));
        }
        let token: TokenResponse = response.json().await?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }
}

fn send_mail_body(mail: &OutgoingMail) -> serde_json::Value {
    json!({
        "message": {
            "subject": mail.subject,
            "body": { "contentType": "Text", "content": mail.body },
            "toRecipients": [ { "emailAddress": { "address": mail.to } } ]
        },
        "saveToSentItems": false
    })
}

#[async_trait]
impl Mailer for GraphMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), AppError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{GRAPH_BASE}/users/{}/sendMail", self.config.sender))
            .bearer_auth(token)
            .json(&send_mail_body(mail))
            .send()
            .await?;

        if response.status().is_success() {
            debug!(to = %mail.to, "Mail accepted by Graph");
            Ok(())
        } else {
            warn!(status = %response.status(), to = %mail.to, "Graph sendMail rejected");
            Err(AppError::ExternalServiceError(
                "Die E-Mail konnte nicht versendet werden.".to_string(),
            ))
        }
    }
}
