use axum::extract::State;
use axum::http::{header, HeaderValue};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::extract::SESSION_COOKIE;
use crate::auth::{Permissions, StaffSession};
use crate::services::auth::{self as auth_service, LoginResult};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{empty_success, success};

#[derive(Debug, Deserialize)]
pub struct EmailLoginRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct StaffLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
struct PermissionsPayload {
    username: String,
    group: String,
    permissions: Permissions,
}

fn with_session_cookie(
    state: &AppState,
    login: LoginResult,
    message: &str,
) -> Result<Response, AppError> {
    let mut cookie = format!(
        "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        login.token,
        state.config.session_ttl.as_secs()
    );
    if state.config.production {
        cookie.push_str("; Secure");
    }
    let cookie = HeaderValue::from_str(&cookie)
        .map_err(|e| AppError::InternalServerError(format!("Ungültiges Cookie: {e}")))?;

    let mut response = success(login, message);
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}

pub async fn request_email_login(
    State(state): State<AppState>,
    Json(body): Json<EmailLoginRequest>,
) -> Result<Response, AppError> {
    auth_service::request_magic_link(&state, &body.email).await?;
    Ok(empty_success(
        "Wir haben dir einen Anmeldelink per E-Mail geschickt.",
    ))
}

pub async fn verify_email_login(
    State(state): State<AppState>,
    Json(body): Json<VerifyRequest>,
) -> Result<Response, AppError> {
    let login = auth_service::verify_magic_link(&state, &body.email, &body.token).await?;
    with_session_cookie(&state, login, "Anmeldung erfolgreich")
}

pub async fn staff_login(
    State(state): State<AppState>,
    Json(body): Json<StaffLoginRequest>,
) -> Result<Response, AppError> {
    let login = auth_service::staff_login(&state, &body.username, &body.password).await?;
    with_session_cookie(&state, login, "Anmeldung erfolgreich")
}

pub async fn permissions(staff: StaffSession) -> Response {
    success(
        PermissionsPayload {
            username: staff.username,
            group: staff.group,
            permissions: staff.permissions,
        },
        "Berechtigungen geladen",
    )
}
