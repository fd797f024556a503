//! Staff back office. Every handler checks the section permission before touching
//! the store.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use uuid::Uuid;

use crate::auth::{Section, StaffSession};
use crate::models::ReserveInput;
use crate::services::admin::{
    self, BuyerCapUpdate, GroupLimitUpdate, SettingsUpdate, SurchargeUpdate,
};
use crate::services::csv_import::import_alumni;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn list_contingents(
    State(state): State<AppState>,
    staff: StaffSession,
) -> Result<Response, AppError> {
    staff.require(Section::Contingents)?;
    let contingents = admin::list_contingents(state.store.as_ref()).await?;
    Ok(success(contingents, "Kontingente geladen"))
}

pub async fn create_contingent(
    State(state): State<AppState>,
    staff: StaffSession,
    Json(body): Json<ReserveInput>,
) -> Result<Response, AppError> {
    staff.require(Section::Contingents)?;
    let contingent = admin::create_contingent(state.store.as_ref(), &body, &staff.username).await?;
    Ok(created(contingent, "Kontingent angelegt"))
}

pub async fn update_contingent(
    State(state): State<AppState>,
    staff: StaffSession,
    Path(id): Path<Uuid>,
    Json(body): Json<ReserveInput>,
) -> Result<Response, AppError> {
    staff.require(Section::Contingents)?;
    let contingent =
        admin::update_contingent(state.store.as_ref(), id, &body, &staff.username).await?;
    Ok(success(contingent, "Kontingent gespeichert"))
}

pub async fn list_ticket_types(
    State(state): State<AppState>,
    staff: StaffSession,
) -> Result<Response, AppError> {
    staff.require(Section::Contingents)?;
    let types = admin::list_ticket_types(state.store.as_ref()).await?;
    Ok(success(types, "Tickettypen geladen"))
}

pub async fn list_delivery_methods(
    State(state): State<AppState>,
    staff: StaffSession,
) -> Result<Response, AppError> {
    staff.require(Section::DeliveryMethods)?;
    let methods = state.store.list_delivery_methods().await?;
    Ok(success(methods, "Lieferarten geladen"))
}

pub async fn update_delivery_method(
    State(state): State<AppState>,
    staff: StaffSession,
    Path(id): Path<Uuid>,
    Json(body): Json<SurchargeUpdate>,
) -> Result<Response, AppError> {
    staff.require(Section::DeliveryMethods)?;
    let method =
        admin::update_surcharge(state.store.as_ref(), id, body.surcharge, &staff.username).await?;
    Ok(success(method, "Lieferart gespeichert"))
}

pub async fn list_buyer_groups(
    State(state): State<AppState>,
    staff: StaffSession,
) -> Result<Response, AppError> {
    staff.require(Section::BuyerGroups)?;
    let groups = state.store.list_buyer_groups().await?;
    Ok(success(groups, "Käufergruppen geladen"))
}

pub async fn update_buyer_group(
    State(state): State<AppState>,
    staff: StaffSession,
    Path(id): Path<Uuid>,
    Json(body): Json<GroupLimitUpdate>,
) -> Result<Response, AppError> {
    staff.require(Section::BuyerGroups)?;
    let group =
        admin::update_group_limit(state.store.as_ref(), id, body.max_tickets, &staff.username)
            .await?;
    Ok(success(group, "Käufergruppe gespeichert"))
}

pub async fn list_buyers(
    State(state): State<AppState>,
    staff: StaffSession,
) -> Result<Response, AppError> {
    staff.require(Section::Buyers)?;
    let buyers = admin::list_buyers(state.store.as_ref()).await?;
    Ok(success(buyers, "Käufer geladen"))
}

pub async fn update_buyer(
    State(state): State<AppState>,
    staff: StaffSession,
    Path(id): Path<Uuid>,
    Json(body): Json<BuyerCapUpdate>,
) -> Result<Response, AppError> {
    staff.require(Section::Buyers)?;
    let buyer = admin::update_buyer_cap(state.store.as_ref(), id, body.max_tickets).await?;
    Ok(success(buyer, "Käufer gespeichert"))
}

pub async fn list_tickets(
    State(state): State<AppState>,
    staff: StaffSession,
) -> Result<Response, AppError> {
    staff.require(Section::Tickets)?;
    let tickets = admin::list_tickets(state.store.as_ref()).await?;
    Ok(success(tickets, "Tickets geladen"))
}

pub async fn ticket_by_code(
    State(state): State<AppState>,
    staff: StaffSession,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    staff.require(Section::Tickets)?;
    let lookup = admin::ticket_by_code(state.store.as_ref(), &code).await?;
    Ok(success(lookup, "Ticket gefunden"))
}

pub async fn mark_ticket_sent(
    State(state): State<AppState>,
    staff: StaffSession,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    staff.require(Section::Tickets)?;
    let result = admin::mark_sent(&state, id, &staff.username).await?;
    Ok(success(result, "Ticket als versendet markiert"))
}

pub async fn get_settings(
    State(state): State<AppState>,
    staff: StaffSession,
) -> Result<Response, AppError> {
    staff.require(Section::Settings)?;
    let settings = admin::settings(state.store.as_ref()).await?;
    Ok(success(settings, "Einstellungen geladen"))
}

pub async fn update_settings(
    State(state): State<AppState>,
    staff: StaffSession,
    Json(body): Json<SettingsUpdate>,
) -> Result<Response, AppError> {
    staff.require(Section::Settings)?;
    let settings =
        admin::set_sales_enabled(state.store.as_ref(), body.sales_enabled, &staff.username)
            .await?;
    Ok(success(settings, "Einstellungen gespeichert"))
}

/// Accepts the CSV as the raw request body.
pub async fn import_buyers(
    State(state): State<AppState>,
    staff: StaffSession,
    body: String,
) -> Result<Response, AppError> {
    staff.require(Section::Import)?;
    if body.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Die hochgeladene Datei ist leer.".to_string(),
        ));
    }
    let report = import_alumni(state.store.as_ref(), &body, &staff.username).await?;
    Ok(success(report, "Import abgeschlossen"))
}
