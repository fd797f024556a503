use std::{env, net::SocketAddr, time::Duration};

use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const MIN_AUTH_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Credentials for the Graph mail API. Absent when mail delivery is only logged.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub sender: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub secret_key: String,
    pub publishable_key: String,
    pub webhook_secret: Option<String>,
    pub currency: String,
}

#[derive(Debug, Clone, Default)]
pub struct SaleWindow {
    pub alumni_start: Option<DateTime<Utc>>,
    pub public_start: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub public_base_url: String,
    pub auth_secret: String,
    pub session_ttl: Duration,
    pub magic_link_ttl: Duration,
    pub mail: Option<MailConfig>,
    pub payment: PaymentConfig,
    pub sale_window: SaleWindow,
    pub pickup_dates: Vec<String>,
    pub allowed_origins: String,
    pub production: bool,
    pub bootstrap_admin: Option<(String, String)>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;

        let auth_secret = required("AUTH_SECRET")?;
        if auth_secret.len() < MIN_AUTH_SECRET_LEN {
            return Err(ConfigError::Invalid {
                key: "AUTH_SECRET",
                reason: format!("must be at least {MIN_AUTH_SECRET_LEN} bytes"),
            });
        }

        let mail = match (
            optional("MAIL_TENANT_ID"),
            optional("MAIL_CLIENT_ID"),
            optional("MAIL_CLIENT_SECRET"),
        ) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => Some(MailConfig {
                sender: optional("MAIL_SENDER").unwrap_or_else(|| "tickets@localhost".into()),
                tenant_id,
                client_id,
                client_secret,
            }),
            _ => {
                tracing::warn!("Mail credentials incomplete, outgoing mail is only logged");
                None
            }
        };

        let payment = PaymentConfig {
            secret_key: required("STRIPE_SECRET_KEY")?,
            publishable_key: required("STRIPE_PUBLISHABLE_KEY")?,
            webhook_secret: optional("STRIPE_WEBHOOK_SECRET"),
            currency: optional("TICKET_CURRENCY").unwrap_or_else(|| "eur".into()),
        };

        let sale_window = SaleWindow {
            alumni_start: parse_optional("SALE_START_ALUMNI", parse_timestamp)?,
            public_start: parse_optional("SALE_START_PUBLIC", parse_timestamp)?,
        };

        let bootstrap_admin = match (
            optional("BOOTSTRAP_ADMIN_USERNAME"),
            optional("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(user), Some(password)) => Some((user, password)),
            _ => None,
        };

        Ok(Self {
            database_url,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5)?,
            bind_addr: parse_or("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3001)))?,
            public_base_url: optional("PUBLIC_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3000".into())
                .trim_end_matches('/')
                .to_string(),
            auth_secret,
            session_ttl: Duration::from_secs(parse_or("SESSION_TTL_HOURS", 12u64)? * 3600),
            magic_link_ttl: Duration::from_secs(parse_or("MAGIC_LINK_TTL_MINUTES", 1440u64)? * 60),
            mail,
            payment,
            sale_window,
            pickup_dates: optional("PICKUP_DATES")
                .map(|raw| split_pickup_dates(&raw))
                .unwrap_or_default(),
            allowed_origins: optional("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| cors::DEFAULT_ALLOWED_ORIGINS.to_string()),
            production: optional("RUST_ENV")
                .map(|v| v.eq_ignore_ascii_case("production"))
                .unwrap_or(false),
            bootstrap_admin,
        })
    }
}

impl Default for Config {
    /// Local development values. `from_env` never falls back to these secrets.
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/ballticket".into(),
            database_max_connections: 5,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            public_base_url: "http://localhost:3000".into(),
            auth_secret: "local-development-secret-0123456789abcdef".into(),
            session_ttl: Duration::from_secs(12 * 3600),
            magic_link_ttl: Duration::from_secs(24 * 3600),
            mail: None,
            payment: PaymentConfig {
                secret_key: "sk_test_local".into(),
                publishable_key: "pk_test_local".into(),
                webhook_secret: None,
                currency: "eur".into(),
            },
            sale_window: SaleWindow::default(),
            pickup_dates: Vec::new(),
            allowed_origins: cors::DEFAULT_ALLOWED_ORIGINS.into(),
            production: false,
            bootstrap_admin: None,
        }
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    optional(key).ok_or(ConfigError::Missing(key))
}

fn parse_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_optional<T>(
    key: &'static str,
    parse: fn(&str) -> Result<T, String>,
) -> Result<Option<T>, ConfigError> {
    optional(key)
        .map(|raw| parse(&raw).map_err(|reason| ConfigError::Invalid { key, reason }))
        .transpose()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| e.to_string())
}

fn split_pickup_dates(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
