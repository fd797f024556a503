//! Buyer-facing purchase flow: offers, checkout start, payment confirmation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::codes::{generate_code, generate_unique_code};
use super::sale::{sale_status, SaleStatus};
use crate::mail::{messages, send_best_effort};
use crate::models::{
    Buyer, BuyerGroup, ContactDetails, DeliveryKind, NewSoldTicket, SoldTicket, TicketReserve,
};
use crate::payment::{to_cents, CheckoutRequest, LineItem};
use crate::state::AppState;
use crate::store::Store;
use crate::utils::error::AppError;

pub const MAX_QUANTITY: i32 = 10;

pub const META_SOLD_TICKET: &str = "sold_ticket_id";
pub const META_RESERVE: &str = "reserve_id";
pub const META_BUYER: &str = "buyer_id";
pub const META_QUANTITY: &str = "quantity";

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseRequest {
    pub reserve_id: Uuid,
    pub quantity: i32,
    pub delivery_method_id: Uuid,
    #[serde(default)]
    pub contact: ContactDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseStarted {
    pub sold_ticket_id: Uuid,
    pub session_id: String,
    pub checkout_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmedPurchase {
    pub sold_ticket_id: Uuid,
    pub code: String,
    pub quantity: i32,
    pub price_paid: Decimal,
    pub delivery_method: String,
    pub reserve_name: String,
    pub buyer_email: String,
    pub payment_reference: Option<String>,
    pub purchased_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OfferDeliveryMethod {
    pub id: Uuid,
    pub name: String,
    pub surcharge: Decimal,
    pub kind: DeliveryKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct Offer {
    pub reserve_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub remaining: i32,
    pub delivery_methods: Vec<OfferDeliveryMethod>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OfferList {
    pub sale: SaleStatus,
    pub group: String,
    pub max_quantity: i32,
    pub already_purchased: bool,
    pub offers: Vec<Offer>,
}

/// Per-buyer cap if set, else the group's, never above [`MAX_QUANTITY`].
pub fn effective_cap(buyer: &Buyer, group: &BuyerGroup) -> i32 {
    buyer
        .max_tickets
        .unwrap_or(group.max_tickets)
        .clamp(0, MAX_QUANTITY)
}

/// Tickets of the reserve not yet covered by a paid purchase.
pub async fn remaining(store: &dyn Store, reserve: &TicketReserve) -> Result<i32, AppError> {
    let sold = store.sold_units(reserve.id).await?;
    let left = (i64::from(reserve.amount) - sold).clamp(0, i64::from(i32::MAX));
    Ok(left as i32)
}

fn cleaned(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn require(value: &Option<String>, label: &str) -> Result<String, AppError> {
    cleaned(value).ok_or_else(|| AppError::ValidationError(format!("Bitte {label} angeben.")))
}

/// Pickup needs name and phone; shipping additionally needs a full postal address.
pub fn validate_contact(
    kind: DeliveryKind,
    contact: &ContactDetails,
) -> Result<ContactDetails, AppError> {
    let name = require(&contact.name, "einen Namen")?;
    let phone = require(&contact.phone, "eine Telefonnummer")?;
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '/' | '(' | ')'));
    if digits < 5 || !allowed {
        return Err(AppError::ValidationError(
            "Bitte eine gültige Telefonnummer angeben.".to_string(),
        ));
    }

    match kind {
        DeliveryKind::Pickup => Ok(ContactDetails {
            name: Some(name),
            phone: Some(phone),
            street: cleaned(&contact.street),
            postal_code: cleaned(&contact.postal_code),
            city: cleaned(&contact.city),
            country: cleaned(&contact.country),
        }),
        DeliveryKind::Shipping => Ok(ContactDetails {
            name: Some(name),
            phone: Some(phone),
            street: Some(require(&contact.street, "Straße und Hausnummer")?),
            postal_code: Some(require(&contact.postal_code, "eine Postleitzahl")?),
            city: Some(require(&contact.city, "einen Ort")?),
            country: Some(require(&contact.country, "ein Land")?),
        }),
    }
}

async fn buyer_context(state: &AppState, email: &str) -> Result<(Buyer, BuyerGroup), AppError> {
    let buyer = state
        .store
        .find_buyer_by_email(email)
        .await?
        .ok_or_else(|| AppError::NotFound("Käuferkonto nicht gefunden.".to_string()))?;
    let group = state
        .store
        .find_buyer_group(buyer.group_id)
        .await?
        .ok_or_else(|| {
            AppError::InternalServerError("Käufergruppe nicht gefunden.".to_string())
        })?;
    Ok((buyer, group))
}

pub async fn list_offers(state: &AppState, email: &str) -> Result<OfferList, AppError> {
    let (buyer, group) = buyer_context(state, email).await?;
    let settings = state.store.settings().await?;
    let sale = sale_status(
        &settings,
        &state.config.sale_window,
        Some(&group.name),
        Utc::now(),
    );
    let visible_types = state.store.group_ticket_type_ids(group.id).await?;

    let mut offers = Vec::new();
    for reserve in state.store.list_reserves().await? {
        if !visible_types.contains(&reserve.type_id) {
            continue;
        }
        let delivery_methods = state
            .store
            .reserve_delivery_methods(reserve.id)
            .await?
            .into_iter()
            .filter_map(|m| {
                m.kind().map(|kind| OfferDeliveryMethod {
                    id: m.id,
                    name: m.name,
                    surcharge: m.surcharge,
                    kind,
                })
            })
            .collect();
        let remaining = remaining(state.store.as_ref(), &reserve).await?;
        offers.push(Offer {
            reserve_id: reserve.id,
            name: reserve.name,
            price: reserve.price,
            remaining,
            delivery_methods,
        });
    }

    Ok(OfferList {
        sale,
        max_quantity: effective_cap(&buyer, &group),
        already_purchased: state.store.count_tickets_for_buyer(buyer.id).await? > 0,
        group: group.name,
        offers,
    })
}

pub async fn start_purchase(
    state: &AppState,
    email: &str,
    request: PurchaseRequest,
) -> Result<PurchaseStarted, AppError> {
    if !(1..=MAX_QUANTITY).contains(&request.quantity) {
        return Err(AppError::ValidationError(format!(
            "Bitte eine Anzahl zwischen 1 und {MAX_QUANTITY} wählen."
        )));
    }

    let (buyer, group) = buyer_context(state, email).await?;

    let settings = state.store.settings().await?;
    let sale = sale_status(
        &settings,
        &state.config.sale_window,
        Some(&group.name),
        Utc::now(),
    );
    if !sale.open {
        return Err(AppError::Forbidden(sale.message.unwrap_or_else(|| {
            "Der Ticketverkauf ist derzeit geschlossen.".to_string()
        })));
    }

    let not_offered = || AppError::NotFound("Kontingent nicht gefunden.".to_string());
    let reserve = state
        .store
        .find_reserve(request.reserve_id)
        .await?
        .ok_or_else(not_offered)?;
    if !state
        .store
        .group_ticket_type_ids(group.id)
        .await?
        .contains(&reserve.type_id)
    {
        return Err(not_offered());
    }

    let cap = effective_cap(&buyer, &group);
    if request.quantity > cap {
        return Err(AppError::ValidationError(format!(
            "Du kannst höchstens {cap} Tickets kaufen."
        )));
    }
    if remaining(state.store.as_ref(), &reserve).await? < request.quantity {
        return Err(AppError::Conflict(
            "Es sind nicht mehr genügend Tickets verfügbar.".to_string(),
        ));
    }
    if state.store.count_tickets_for_buyer(buyer.id).await? > 0 {
        return Err(AppError::Conflict(
            "Du hast bereits Tickets gekauft. Pro Person ist nur ein Kauf möglich.".to_string(),
        ));
    }

    let unavailable_method = || {
        AppError::ValidationError(
            "Diese Lieferart ist für das Kontingent nicht verfügbar.".to_string(),
        )
    };
    let method = state
        .store
        .reserve_delivery_methods(reserve.id)
        .await?
        .into_iter()
        .find(|m| m.id == request.delivery_method_id)
        .ok_or_else(unavailable_method)?;
    let kind = method.kind().ok_or_else(unavailable_method)?;
    let contact = validate_contact(kind, &request.contact)?;

    // All checks passed; writes start here.
    let buyer = state.store.update_buyer_contact(buyer.id, &contact).await?;
    let code = generate_unique_code(state.store.as_ref(), generate_code).await?;
    let price_paid = reserve.price * Decimal::from(request.quantity) + method.surcharge;

    let ticket = state
        .store
        .insert_sold_ticket(NewSoldTicket {
            buyer_id: buyer.id,
            reserve_id: reserve.id,
            quantity: request.quantity,
            delivery_method: method.name.clone(),
            code,
            price_paid,
        })
        .await?;

    let mut line_items = vec![LineItem {
        name: format!("Ballticket ({})", reserve.name),
        unit_amount_cents: to_cents(reserve.price)?,
        quantity: request.quantity,
    }];
    if method.surcharge > Decimal::ZERO {
        line_items.push(LineItem {
            name: method.name.clone(),
            unit_amount_cents: to_cents(method.surcharge)?,
            quantity: 1,
        });
    }
    let base = &state.config.public_base_url;
    let checkout = CheckoutRequest {
        customer_email: buyer.email.clone(),
        currency: state.config.payment.currency.clone(),
        line_items,
        metadata: BTreeMap::from([
            (META_SOLD_TICKET.to_string(), ticket.id.to_string()),
            (META_RESERVE.to_string(), reserve.id.to_string()),
            (META_BUYER.to_string(), buyer.id.to_string()),
            (META_QUANTITY.to_string(), request.quantity.to_string()),
        ]),
        success_url: format!("{base}/kaufen/erfolg?session_id={{CHECKOUT_SESSION_ID}}"),
        cancel_url: format!("{base}/kaufen"),
    };

    let session = match state.payments.create_checkout_session(&checkout).await {
        Ok(session) => session,
        Err(e) => {
            // Without a checkout the pending ticket would block the buyer forever.
            if let Err(cleanup) = state.store.delete_sold_ticket(ticket.id).await {
                error!(ticket_id = %ticket.id, error = %cleanup, "Failed to remove pending ticket");
            }
            return Err(e);
        }
    };
    state
        .store
        .set_checkout_session(ticket.id, &session.id)
        .await?;

    info!(
        ticket_id = %ticket.id,
        buyer = %buyer.email,
        quantity = request.quantity,
        "Checkout started"
    );
    Ok(PurchaseStarted {
        sold_ticket_id: ticket.id,
        session_id: session.id,
        checkout_url: session.url,
    })
}

async fn confirmation(
    state: &AppState,
    ticket: &SoldTicket,
    buyer: &Buyer,
) -> Result<ConfirmedPurchase, AppError> {
    let reserve_name = state
        .store
        .find_reserve(ticket.reserve_id)
        .await?
        .map(|r| r.name)
        .unwrap_or_default();
    Ok(ConfirmedPurchase {
        sold_ticket_id: ticket.id,
        code: ticket.code.clone(),
        quantity: ticket.quantity,
        price_paid: ticket.price_paid,
        delivery_method: ticket.delivery_method.clone(),
        reserve_name,
        buyer_email: buyer.email.clone(),
        payment_reference: ticket.payment_reference.clone(),
        purchased_at: ticket.created_at,
    })
}

/// Reconciles a completed checkout with its pending ticket. Safe to call any number
/// of times: only the first call marks the ticket paid and counts it as sold.
/// `owner` restricts confirmation to the buyer who started the purchase.
pub async fn confirm_payment(
    state: &AppState,
    session_id: &str,
    owner: Option<&str>,
) -> Result<ConfirmedPurchase, AppError> {
    let session = state.payments.retrieve_session(session_id).await?;

    let ticket_id = session
        .metadata
        .get(META_SOLD_TICKET)
        .and_then(|id| Uuid::parse_str(id).ok())
        .ok_or_else(|| {
            AppError::ValidationError("Die Zahlung gehört zu keiner Bestellung.".to_string())
        })?;
    let ticket = state
        .store
        .find_sold_ticket(ticket_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Bestellung nicht gefunden.".to_string()))?;
    let buyer = state
        .store
        .find_buyer(ticket.buyer_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Käuferkonto nicht gefunden.".to_string()))?;
    if owner.is_some_and(|email| email != buyer.email) {
        return Err(AppError::Forbidden(
            "Diese Bestellung gehört zu einem anderen Konto.".to_string(),
        ));
    }

    if ticket.paid {
        return confirmation(state, &ticket, &buyer).await;
    }
    if !session.paid {
        return Err(AppError::Conflict(
            "Die Zahlung ist noch nicht abgeschlossen.".to_string(),
        ));
    }
    let metadata_reserve = session
        .metadata
        .get(META_RESERVE)
        .and_then(|id| Uuid::parse_str(id).ok());
    if metadata_reserve != Some(ticket.reserve_id) {
        return Err(AppError::ValidationError(
            "Die Zahlungsdaten passen nicht zur Bestellung.".to_string(),
        ));
    }

    let reference = session
        .payment_reference
        .clone()
        .unwrap_or_else(|| session.id.clone());
    let Some(paid) = state.store.mark_ticket_paid(ticket.id, &reference).await? else {
        // Lost the race against a concurrent confirmation; report its result.
        let current = state
            .store
            .find_sold_ticket(ticket.id)
            .await?
            .filter(|t| t.paid)
            .ok_or_else(|| AppError::NotFound("Bestellung nicht gefunden.".to_string()))?;
        return confirmation(state, &current, &buyer).await;
    };
    info!(ticket_id = %paid.id, quantity = paid.quantity, "Payment confirmed");

    let confirmed = confirmation(state, &paid, &buyer).await?;
    let mail = messages::purchase_confirmation(
        &buyer.email,
        &messages::ConfirmationDetails {
            name: buyer.name.as_deref(),
            reserve_name: &confirmed.reserve_name,
            quantity: paid.quantity,
            price_paid: paid.price_paid,
            delivery_method: &paid.delivery_method,
            kind: DeliveryKind::classify(&paid.delivery_method),
            code: &paid.code,
            pickup_dates: &state.config.pickup_dates,
        },
    );
    if !send_best_effort(state.mailer.as_ref(), mail).await {
        warn!(ticket_id = %paid.id, "Purchase confirmed without confirmation mail");
    }
    Ok(confirmed)
}

pub async fn buyer_tickets(state: &AppState, email: &str) -> Result<Vec<SoldTicket>, AppError> {
    let (buyer, _) = buyer_context(state, email).await?;
    state.store.tickets_for_buyer(buyer.id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(name: &str, phone: &str) -> ContactDetails {
        ContactDetails {
            name: Some(name.into()),
            phone: Some(phone.into()),
            ..ContactDetails::default()
        }
    }

    #[test]
    fn test_pickup_needs_only_name_and_phone() {
        let validated =
            validate_contact(DeliveryKind::Pickup, &contact(" Anna ", "0171 1234567")).unwrap();
        assert_eq!(validated.name.as_deref(), Some("Anna"));
        assert_eq!(validated.street, None);
    }

    #[test]
    fn test_shipping_needs_address() {
        let err = validate_contact(DeliveryKind::Shipping, &contact("Anna", "0171 1234567"));
        assert!(matches!(err, Err(AppError::ValidationError(msg)) if msg.contains("Straße")));

        let full = ContactDetails {
            street: Some("Schulweg 1".into()),
            postal_code: Some("12345".into()),
            city: Some("Musterstadt".into()),
            country: Some("Deutschland".into()),
            ..contact("Anna", "+49 171 1234567")
        };
        assert!(validate_contact(DeliveryKind::Shipping, &full).is_ok());
    }

    #[test]
    fn test_phone_is_checked() {
        assert!(validate_contact(DeliveryKind::Pickup, &contact("Anna", "123")).is_err());
        assert!(validate_contact(DeliveryKind::Pickup, &contact("Anna", "call me")).is_err());
        assert!(validate_contact(DeliveryKind::Pickup, &contact("", "0171 1234567")).is_err());
    }

    #[test]
    fn test_effective_cap() {
        let now = Utc::now();
        let group = BuyerGroup {
            id: Uuid::new_v4(),
            name: "Absolventen".into(),
            max_tickets: 4,
            updated_by: None,
            updated_at: now,
        };
        let mut buyer = Buyer {
            id: Uuid::new_v4(),
            email: "a@example.com".into(),
            name: None,
            phone: None,
            street: None,
            postal_code: None,
            city: None,
            country: None,
            verified: true,
            group_id: group.id,
            max_tickets: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(effective_cap(&buyer, &group), 4);
        buyer.max_tickets = Some(1);
        assert_eq!(effective_cap(&buyer, &group), 1);
        buyer.max_tickets = Some(50);
        assert_eq!(effective_cap(&buyer, &group), MAX_QUANTITY);
    }
}
