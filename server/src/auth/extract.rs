use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use chrono::Utc;

use super::permissions::{permissions_for, Permissions, Section};
use super::session::{Provider, SessionClaims};
use crate::state::AppState;
use crate::utils::error::AppError;

pub const SESSION_COOKIE: &str = "session";

/// Signed-in buyer (passwordless email login).
#[derive(Debug, Clone)]
pub struct BuyerSession {
    pub email: String,
    pub group: String,
}

/// Signed-in staff member (username/password login).
#[derive(Debug, Clone)]
pub struct StaffSession {
    pub username: String,
    pub group: String,
    pub permissions: Permissions,
}

impl StaffSession {
    pub fn require(&self, section: Section) -> Result<(), AppError> {
        if self.permissions.allows(section) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Keine Berechtigung für diesen Bereich.".to_string(),
            ))
        }
    }
}

fn session_token(parts: &Parts) -> Option<&str> {
    if let Some(token) = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token.trim());
    }

    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

fn claims(parts: &Parts, state: &AppState) -> Result<SessionClaims, AppError> {
    let token = session_token(parts)
        .ok_or_else(|| AppError::AuthError("Bitte zuerst anmelden.".to_string()))?;
    state.sessions.verify(token, Utc::now())
}

#[async_trait]
impl FromRequestParts<AppState> for BuyerSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = claims(parts, state)?;
        if claims.provider != Provider::Email {
            return Err(AppError::Forbidden(
                "Dieser Bereich ist nur für Ticketkäufer.".to_string(),
            ));
        }
        Ok(Self {
            email: claims.sub,
            group: claims.group,
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for StaffSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = claims(parts, state)?;
        if claims.provider != Provider::Credentials {
            return Err(AppError::Forbidden(
                "Dieser Bereich ist nur für das Team.".to_string(),
            ));
        }
        Ok(Self {
            permissions: permissions_for(&claims.group),
            username: claims.sub,
            group: claims.group,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(name: header::HeaderName, value: &str) -> Parts {
        let (parts, _) = Request::builder()
            .header(name, value)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn test_token_from_bearer_header() {
        let parts = parts(header::AUTHORIZATION, "Bearer abc.def");
        assert_eq!(session_token(&parts), Some("abc.def"));
    }

    #[test]
    fn test_token_from_cookie() {
        let parts = parts(header::COOKIE, "theme=dark; session=abc.def");
        assert_eq!(session_token(&parts), Some("abc.def"));
    }

    #[test]
    fn test_missing_token() {
        let parts = parts(header::COOKIE, "theme=dark");
        assert_eq!(session_token(&parts), None);
    }

    #[test]
    fn test_staff_require() {
        let staff = StaffSession {
            username: "versand1".into(),
            group: "Versand".into(),
            permissions: permissions_for("Versand"),
        };
        assert!(staff.require(Section::Tickets).is_ok());
        assert!(matches!(
            staff.require(Section::Settings),
            Err(AppError::Forbidden(_))
        ));
    }
}
