use axum::extract::{Query, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::BuyerSession;
use crate::services::purchase::{self, PurchaseRequest};
use crate::services::sale::{sale_status, SaleStatus};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Serialize)]
struct ShopInfo<'a> {
    sale: SaleStatus,
    publishable_key: &'a str,
    currency: &'a str,
    pickup_dates: &'a [String],
    signed_in: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    pub session_id: String,
}

/// Group name as stored now; an import may have moved the buyer since sign-in.
async fn current_group(state: &AppState, session: &BuyerSession) -> Result<String, AppError> {
    let Some(buyer) = state.store.find_buyer_by_email(&session.email).await? else {
        return Ok(session.group.clone());
    };
    Ok(state
        .store
        .find_buyer_group(buyer.group_id)
        .await?
        .map_or_else(|| session.group.clone(), |group| group.name))
}

pub async fn shop_info(
    State(state): State<AppState>,
    buyer: Option<BuyerSession>,
) -> Result<Response, AppError> {
    let settings = state.store.settings().await?;
    let group = match &buyer {
        Some(session) => Some(current_group(&state, session).await?),
        None => None,
    };
    let info = ShopInfo {
        sale: sale_status(
            &settings,
            &state.config.sale_window,
            group.as_deref(),
            Utc::now(),
        ),
        publishable_key: &state.config.payment.publishable_key,
        currency: &state.config.payment.currency,
        pickup_dates: &state.config.pickup_dates,
        signed_in: buyer.is_some(),
    };
    Ok(success(info, "Shop-Informationen geladen"))
}

pub async fn offers(
    State(state): State<AppState>,
    buyer: BuyerSession,
) -> Result<Response, AppError> {
    let offers = purchase::list_offers(&state, &buyer.email).await?;
    Ok(success(offers, "Angebote geladen"))
}

pub async fn start_purchase(
    State(state): State<AppState>,
    buyer: BuyerSession,
    Json(body): Json<PurchaseRequest>,
) -> Result<Response, AppError> {
    let started = purchase::start_purchase(&state, &buyer.email, body).await?;
    Ok(created(started, "Weiter zur Zahlung"))
}

pub async fn confirm(
    State(state): State<AppState>,
    buyer: BuyerSession,
    Query(query): Query<ConfirmQuery>,
) -> Result<Response, AppError> {
    let confirmed =
        purchase::confirm_payment(&state, query.session_id.trim(), Some(&buyer.email)).await?;
    Ok(success(confirmed, "Zahlung bestätigt"))
}

pub async fn my_tickets(
    State(state): State<AppState>,
    buyer: BuyerSession,
) -> Result<Response, AppError> {
    let tickets = purchase::buyer_tickets(&state, &buyer.email).await?;
    Ok(success(tickets, "Tickets geladen"))
}
