use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use chrono::Utc;
use tracing::{debug, warn};

use crate::payment::webhook::{verify_signature, WebhookEvent, CHECKOUT_COMPLETED};
use crate::services::purchase;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::empty_success;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Provider callback for completed checkouts. Only the session id is taken from the
/// event; the session itself is re-read from the provider before anything changes.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let Some(secret) = state.config.payment.webhook_secret.as_deref() else {
        return Err(AppError::NotFound("Webhook nicht konfiguriert.".to_string()));
    };
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !verify_signature(&body, signature, secret, Utc::now().timestamp()) {
        warn!("Rejected webhook with invalid signature");
        return Err(AppError::Forbidden("Ungültige Signatur.".to_string()));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::ValidationError(format!("Ungültiges Ereignis: {e}")))?;
    if event.event_type != CHECKOUT_COMPLETED {
        debug!(event_type = %event.event_type, "Ignoring webhook event");
        return Ok(empty_success("Ereignis ignoriert"));
    }

    purchase::confirm_payment(&state, &event.data.object.id, None).await?;
    Ok(empty_success("Zahlung verarbeitet"))
}
