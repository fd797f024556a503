use chrono::Utc;
use reqwest::Url;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::auth::password::{hash_password, verify_password};
use crate::auth::permissions::ADMIN_GROUP;
use crate::auth::Provider;
use crate::mail::messages;
use crate::models::{NewBuyer, PUBLIC_GROUP};
use crate::state::AppState;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub token: String,
    pub provider: Provider,
    pub subject: String,
    pub group: String,
}

/// Trims and lower-cases an address, rejecting anything that is clearly not one.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;
    let plausible = !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
        && !domain.contains('@');
    plausible.then_some(email)
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn invalid_email() -> AppError {
    AppError::ValidationError("Bitte eine gültige E-Mail-Adresse angeben.".to_string())
}

fn login_link(base: &str, email: &str, token: &str) -> Result<String, AppError> {
    Url::parse_with_params(
        &format!("{base}/login/verify"),
        &[("email", email), ("token", token)],
    )
    .map(String::from)
    .map_err(|e| AppError::InternalServerError(format!("Ungültige Basis-URL: {e}")))
}

pub async fn request_magic_link(state: &AppState, raw_email: &str) -> Result<(), AppError> {
    let email = normalize_email(raw_email).ok_or_else(invalid_email)?;

    let token = hex::encode(rand::random::<[u8; 32]>());
    let ttl = chrono::Duration::from_std(state.config.magic_link_ttl)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    state
        .store
        .insert_verification_token(&email, &hash_token(&token), Utc::now() + ttl)
        .await?;

    let link = login_link(&state.config.public_base_url, &email, &token)?;
    let mail = messages::magic_link(&email, &link, state.config.magic_link_ttl.as_secs() / 60);
    state.mailer.send(&mail).await?;

    info!(email = %email, "Login link sent");
    Ok(())
}

pub async fn verify_magic_link(
    state: &AppState,
    raw_email: &str,
    token: &str,
) -> Result<LoginResult, AppError> {
    let invalid = || AppError::AuthError("Der Anmeldelink ist ungültig oder abgelaufen.".to_string());
    let email = normalize_email(raw_email).ok_or_else(invalid)?;

    if !state
        .store
        .take_verification_token(&email, &hash_token(token.trim()), Utc::now())
        .await?
    {
        return Err(invalid());
    }

    let buyer = match state.store.find_buyer_by_email(&email).await? {
        Some(buyer) if buyer.verified => buyer,
        Some(buyer) => state.store.set_buyer_verified(buyer.id).await?,
        None => {
            let group = state
                .store
                .find_buyer_group_by_name(PUBLIC_GROUP)
                .await?
                .ok_or_else(|| {
                    AppError::InternalServerError(format!("Gruppe {PUBLIC_GROUP} fehlt."))
                })?;
            info!(email = %email, "New buyer registered");
            state
                .store
                .insert_buyer(NewBuyer {
                    email: email.clone(),
                    name: None,
                    group_id: group.id,
                    verified: true,
                })
                .await?
        }
    };

    let group = state
        .store
        .find_buyer_group(buyer.group_id)
        .await?
        .map(|g| g.name)
        .unwrap_or_else(|| PUBLIC_GROUP.to_string());

    let token = state
        .sessions
        .issue(&email, Provider::Email, &group, Utc::now())?;
    Ok(LoginResult {
        token,
        provider: Provider::Email,
        subject: email,
        group,
    })
}

pub async fn staff_login(
    state: &AppState,
    username: &str,
    password: &str,
) -> Result<LoginResult, AppError> {
    let rejected = || AppError::AuthError("Benutzername oder Passwort falsch.".to_string());

    let account = state
        .store
        .find_staff_account(username.trim())
        .await?
        .ok_or_else(rejected)?;
    if !verify_password(password, &account.password_hash) {
        return Err(rejected());
    }

    let token = state.sessions.issue(
        &account.username,
        Provider::Credentials,
        &account.group_name,
        Utc::now(),
    )?;
    info!(username = %account.username, group = %account.group_name, "Staff login");
    Ok(LoginResult {
        token,
        provider: Provider::Credentials,
        subject: account.username,
        group: account.group_name,
    })
}

/// Creates the configured first admin account if it does not exist yet.
pub async fn ensure_bootstrap_admin(state: &AppState) -> Result<(), AppError> {
    let Some((username, password)) = state.config.bootstrap_admin.as_ref() else {
        return Ok(());
    };
    if state.store.find_staff_account(username).await?.is_some() {
        return Ok(());
    }
    state
        .store
        .insert_staff_account(username, &hash_password(password)?, ADMIN_GROUP)
        .await?;
    info!(username = %username, "Bootstrap admin account created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email("  Anna.Muster@Example.ORG "),
            Some("anna.muster@example.org".to_string())
        );
        assert_eq!(normalize_email("anna"), None);
        assert_eq!(normalize_email("@example.org"), None);
        assert_eq!(normalize_email("anna@localhost"), None);
        assert_eq!(normalize_email("an na@example.org"), None);
        assert_eq!(normalize_email("a@b@example.org"), None);
    }

    #[test]
    fn test_login_link_encodes_email() {
        let link = login_link("https://ball.example.org", "a+b@example.org", "abc").unwrap();
        assert_eq!(
            link,
            "https://ball.example.org/login/verify?email=a%2Bb%40example.org&token=abc"
        );
    }

    #[test]
    fn test_token_hash_is_stable_hex() {
        let hash = hash_token("abc");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_token("abc"));
    }
}
