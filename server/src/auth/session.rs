//! Signed, stateless session tokens.
//!
//! A token is `base64url(claims_json) "." base64url(hmac_sha256(claims_json))`.
//! Buyers and staff share the format and are told apart by [`Provider`].

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::utils::error::AppError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Buyer signed in through an emailed link.
    Email,
    /// Staff member signed in with username and password.
    Credentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub provider: Provider,
    pub group: String,
    pub exp: i64,
}

#[derive(Clone)]
pub struct SessionKeys {
    secret: Vec<u8>,
    ttl: Duration,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl,
        }
    }

    fn mac(&self) -> Result<HmacSha256, AppError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::InternalServerError(format!("Ungültiger Sitzungsschlüssel: {e}")))
    }

    pub fn issue(
        &self,
        sub: &str,
        provider: Provider,
        group: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| AppError::InternalServerError(format!("Ungültige Sitzungsdauer: {e}")))?;
        let claims = SessionClaims {
            sub: sub.to_string(),
            provider,
            group: group.to_string(),
            exp: (now + ttl).timestamp(),
        };
        let payload = serde_json::to_vec(&claims)
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, AppError> {
        let invalid = || AppError::AuthError("Sitzung ungültig. Bitte erneut anmelden.".into());

        let (payload, signature) = token.split_once('.').ok_or_else(invalid)?;
        let payload = URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid())?;
        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        mac.verify_slice(&signature).map_err(|_| invalid())?;

        let claims: SessionClaims = serde_json::from_slice(&payload).map_err(|_| invalid())?;
        if claims.exp <= now.timestamp() {
            return Err(AppError::AuthError(
                "Sitzung abgelaufen. Bitte erneut anmelden.".into(),
            ));
        }
        Ok(claims)
    }
}
