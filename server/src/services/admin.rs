use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::purchase::remaining;
use crate::mail::{messages, send_best_effort};
use crate::models::{
    BuyerGroup, BuyerOverview, DeliveryKind, DeliveryMethod, ReserveInput, SoldTicket,
    SystemSettings, TicketReserve, TicketType,
};
use crate::state::AppState;
use crate::store::Store;
use crate::utils::error::AppError;

pub const MAX_SURCHARGE: Decimal = Decimal::ONE_HUNDRED;
pub const MAX_GROUP_TICKETS: i32 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct ContingentOverview {
    #[serde(flatten)]
    pub reserve: TicketReserve,
    pub type_name: Option<String>,
    pub sold: i64,
    pub remaining: i32,
    pub delivery_methods: Vec<DeliveryMethod>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SurchargeUpdate {
    pub surcharge: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupLimitUpdate {
    pub max_tickets: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuyerCapUpdate {
    pub max_tickets: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettingsUpdate {
    pub sales_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketLookup {
    pub ticket: SoldTicket,
    pub buyer_email: String,
    pub buyer_name: Option<String>,
    pub reserve_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentResult {
    pub ticket: SoldTicket,
    pub notified: bool,
}

async fn overview(store: &dyn Store, reserve: TicketReserve) -> Result<ContingentOverview, AppError> {
    Ok(ContingentOverview {
        type_name: store.find_ticket_type(reserve.type_id).await?.map(|t| t.name),
        sold: store.sold_units(reserve.id).await?,
        remaining: remaining(store, &reserve).await?,
        delivery_methods: store.reserve_delivery_methods(reserve.id).await?,
        reserve,
    })
}

pub async fn list_contingents(store: &dyn Store) -> Result<Vec<ContingentOverview>, AppError> {
    let mut contingents = Vec::new();
    for reserve in store.list_reserves().await? {
        contingents.push(overview(store, reserve).await?);
    }
    Ok(contingents)
}

pub async fn list_ticket_types(store: &dyn Store) -> Result<Vec<TicketType>, AppError> {
    store.list_ticket_types().await
}

async fn validate_reserve_input(
    store: &dyn Store,
    input: &ReserveInput,
    sold: i64,
) -> Result<ReserveInput, AppError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::ValidationError(
            "Bitte einen Namen für das Kontingent angeben.".to_string(),
        ));
    }
    if input.amount < 0 {
        return Err(AppError::ValidationError(
            "Die Menge darf nicht negativ sein.".to_string(),
        ));
    }
    if i64::from(input.amount) < sold {
        return Err(AppError::ValidationError(format!(
            "Die Menge darf nicht unter die bereits verkaufte Anzahl ({sold}) sinken."
        )));
    }
    if input.price < Decimal::ZERO {
        return Err(AppError::ValidationError(
            "Der Preis darf nicht negativ sein.".to_string(),
        ));
    }
    if input.delivery_method_ids.is_empty() {
        return Err(AppError::ValidationError(
            "Bitte mindestens eine Lieferart auswählen.".to_string(),
        ));
    }
    let known = store.list_delivery_methods().await?;
    if !input
        .delivery_method_ids
        .iter()
        .all(|id| known.iter().any(|m| m.id == *id))
    {
        return Err(AppError::ValidationError(
            "Unbekannte Lieferart ausgewählt.".to_string(),
        ));
    }
    if store.find_ticket_type(input.type_id).await?.is_none() {
        return Err(AppError::ValidationError(
            "Unbekannter Tickettyp ausgewählt.".to_string(),
        ));
    }

    let mut method_ids = input.delivery_method_ids.clone();
    method_ids.sort();
    method_ids.dedup();
    Ok(ReserveInput {
        name: name.to_string(),
        amount: input.amount,
        price: input.price,
        type_id: input.type_id,
        delivery_method_ids: method_ids,
    })
}

pub async fn create_contingent(
    store: &dyn Store,
    input: &ReserveInput,
    staff: &str,
) -> Result<ContingentOverview, AppError> {
    let input = validate_reserve_input(store, input, 0).await?;
    let reserve = store.insert_reserve(&input, staff).await?;
    info!(reserve_id = %reserve.id, staff = %staff, "Contingent created");
    overview(store, reserve).await
}

pub async fn update_contingent(
    store: &dyn Store,
    id: Uuid,
    input: &ReserveInput,
    staff: &str,
) -> Result<ContingentOverview, AppError> {
    if store.find_reserve(id).await?.is_none() {
        return Err(AppError::NotFound("Kontingent nicht gefunden.".to_string()));
    }
    let sold = store.sold_units(id).await?;
    let input = validate_reserve_input(store, input, sold).await?;
    let reserve = store
        .update_reserve(id, &input, staff)
        .await?
        .ok_or_else(|| AppError::NotFound("Kontingent nicht gefunden.".to_string()))?;
    info!(reserve_id = %id, amount = reserve.amount, staff = %staff, "Contingent updated");
    overview(store, reserve).await
}

pub async fn update_surcharge(
    store: &dyn Store,
    id: Uuid,
    surcharge: Decimal,
    staff: &str,
) -> Result<DeliveryMethod, AppError> {
    if surcharge < Decimal::ZERO || surcharge > MAX_SURCHARGE {
        return Err(AppError::ValidationError(format!(
            "Der Aufschlag muss zwischen 0 und {MAX_SURCHARGE} Euro liegen."
        )));
    }
    store
        .update_delivery_surcharge(id, surcharge.round_dp(2), staff)
        .await?
        .ok_or_else(|| AppError::NotFound("Lieferart nicht gefunden.".to_string()))
}

pub async fn update_group_limit(
    store: &dyn Store,
    id: Uuid,
    max_tickets: i32,
    staff: &str,
) -> Result<BuyerGroup, AppError> {
    if !(0..=MAX_GROUP_TICKETS).contains(&max_tickets) {
        return Err(AppError::ValidationError(format!(
            "Die Höchstanzahl muss zwischen 0 und {MAX_GROUP_TICKETS} liegen."
        )));
    }
    store
        .update_buyer_group_max(id, max_tickets, staff)
        .await?
        .ok_or_else(|| AppError::NotFound("Käufergruppe nicht gefunden.".to_string()))
}

pub async fn list_buyers(store: &dyn Store) -> Result<Vec<BuyerOverview>, AppError> {
    store.list_buyers().await
}

pub async fn update_buyer_cap(
    store: &dyn Store,
    id: Uuid,
    max_tickets: Option<i32>,
) -> Result<BuyerOverview, AppError> {
    if max_tickets.is_some_and(|max| !(0..=MAX_GROUP_TICKETS).contains(&max)) {
        return Err(AppError::ValidationError(format!(
            "Die Höchstanzahl muss zwischen 0 und {MAX_GROUP_TICKETS} liegen."
        )));
    }
    store
        .set_buyer_max_tickets(id, max_tickets)
        .await?
        .ok_or_else(|| AppError::NotFound("Käufer nicht gefunden.".to_string()))?;
    store
        .list_buyers()
        .await?
        .into_iter()
        .find(|b| b.id == id)
        .ok_or_else(|| AppError::NotFound("Käufer nicht gefunden.".to_string()))
}

pub async fn list_tickets(store: &dyn Store) -> Result<Vec<SoldTicket>, AppError> {
    store.list_sold_tickets().await
}

pub async fn ticket_by_code(store: &dyn Store, code: &str) -> Result<TicketLookup, AppError> {
    let code = code.trim().to_uppercase();
    let ticket = store
        .find_ticket_by_code(&code)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Kein Ticket mit Code {code}.")))?;
    let buyer = store.find_buyer(ticket.buyer_id).await?;
    let reserve_name = store
        .find_reserve(ticket.reserve_id)
        .await?
        .map(|r| r.name)
        .unwrap_or_default();
    Ok(TicketLookup {
        buyer_email: buyer.as_ref().map(|b| b.email.clone()).unwrap_or_default(),
        buyer_name: buyer.and_then(|b| b.name),
        reserve_name,
        ticket,
    })
}

/// Marks a paid ticket as shipped or handed out and notifies the buyer. The
/// notification is best effort.
pub async fn mark_sent(state: &AppState, id: Uuid, staff: &str) -> Result<SentResult, AppError> {
    let store = state.store.as_ref();
    let ticket = store
        .find_sold_ticket(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Ticket nicht gefunden.".to_string()))?;
    if !ticket.paid {
        return Err(AppError::ValidationError(
            "Unbezahlte Tickets können nicht versendet werden.".to_string(),
        ));
    }
    let ticket = store
        .mark_ticket_sent(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Ticket nicht gefunden.".to_string()))?;
    info!(ticket_id = %id, staff = %staff, "Ticket marked as sent");

    let Some(buyer) = store.find_buyer(ticket.buyer_id).await? else {
        return Ok(SentResult {
            ticket,
            notified: false,
        });
    };
    let mail = match DeliveryKind::classify(&ticket.delivery_method) {
        Some(DeliveryKind::Shipping) => Some(messages::shipping_notification(
            &buyer.email,
            buyer.name.as_deref(),
            &ticket.code,
        )),
        Some(DeliveryKind::Pickup) => Some(messages::pickup_notification(
            &buyer.email,
            buyer.name.as_deref(),
            &ticket.code,
            &state.config.pickup_dates,
        )),
        None => None,
    };
    let notified = match mail {
        Some(mail) => send_best_effort(state.mailer.as_ref(), mail).await,
        None => false,
    };
    Ok(SentResult { ticket, notified })
}

pub async fn settings(store: &dyn Store) -> Result<SystemSettings, AppError> {
    store.settings().await
}

pub async fn set_sales_enabled(
    store: &dyn Store,
    enabled: bool,
    staff: &str,
) -> Result<SystemSettings, AppError> {
    let settings = store.set_sales_enabled(enabled, staff).await?;
    info!(sales_enabled = enabled, staff = %staff, "Sales kill switch changed");
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewSoldTicket, PUBLIC_GROUP};
    use crate::store::MemoryStore;

    struct Fixture {
        store: MemoryStore,
        ticket_type: TicketType,
        pickup: DeliveryMethod,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let ticket_type = store.add_ticket_type("Ball", &[PUBLIC_GROUP]).await;
        let pickup = store.add_delivery_method("Abholung", Decimal::ZERO).await;
        Fixture {
            store,
            ticket_type,
            pickup,
        }
    }

    fn input(f: &Fixture, amount: i32) -> ReserveInput {
        ReserveInput {
            name: "Hauptkontingent".into(),
            amount,
            price: Decimal::new(3500, 2),
            type_id: f.ticket_type.id,
            delivery_method_ids: vec![f.pickup.id],
        }
    }

    #[tokio::test]
    async fn test_amount_cannot_drop_below_sold() {
        let f = fixture().await;
        let created = create_contingent(&f.store, &input(&f, 20), "orga")
            .await
            .unwrap();
        sell(&f, created.reserve.id, 4, "ABCD2345").await;
        assert_eq!(
            f.store.find_reserve(created.reserve.id).await.unwrap().unwrap().amount,
            20
        );

        let err = update_contingent(&f.store, created.reserve.id, &input(&f, 3), "orga").await;
        assert!(matches!(err, Err(AppError::ValidationError(msg)) if msg.contains("(4)")));

        let ok = update_contingent(&f.store, created.reserve.id, &input(&f, 4), "orga")
            .await
            .unwrap();
        assert_eq!(ok.reserve.amount, 4);
        assert_eq!(ok.sold, 4);
        assert_eq!(ok.remaining, 0);
        assert_eq!(ok.reserve.updated_by.as_deref(), Some("orga"));
    }

    async fn sell(f: &Fixture, reserve_id: Uuid, quantity: i32, code: &str) {
        let ticket = f
            .store
            .insert_sold_ticket(NewSoldTicket {
                buyer_id: Uuid::new_v4(),
                reserve_id,
                quantity,
                delivery_method: "Abholung".into(),
                code: code.into(),
                price_paid: Decimal::new(3500, 2) * Decimal::from(quantity),
            })
            .await
            .unwrap();
        f.store.mark_ticket_paid(ticket.id, "pi_1").await.unwrap();
    }

    #[tokio::test]
    async fn test_mostly_sold_contingent_stays_editable() {
        let f = fixture().await;
        let created = create_contingent(&f.store, &input(&f, 100), "orga")
            .await
            .unwrap();
        for n in 0..6 {
            sell(&f, created.reserve.id, 10, &format!("CODE{n:04}")).await;
        }

        let mut renamed = input(&f, 100);
        renamed.name = "Restkarten".into();
        let updated = update_contingent(&f.store, created.reserve.id, &renamed, "orga")
            .await
            .unwrap();
        assert_eq!(updated.reserve.name, "Restkarten");
        assert_eq!(updated.sold, 60);
        assert_eq!(updated.remaining, 40);

        let shrunk = update_contingent(&f.store, created.reserve.id, &input(&f, 60), "orga")
            .await
            .unwrap();
        assert_eq!(shrunk.remaining, 0);
        assert!(update_contingent(&f.store, created.reserve.id, &input(&f, 59), "orga")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_contingent_from_seeded_catalogue() {
        let store = MemoryStore::new();
        let ticket_type = store.list_ticket_types().await.unwrap().remove(0);
        let method_ids = store
            .list_delivery_methods()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        let created = create_contingent(
            &store,
            &ReserveInput {
                name: "Hauptkontingent".into(),
                amount: 200,
                price: Decimal::new(3500, 2),
                type_id: ticket_type.id,
                delivery_method_ids: method_ids,
            },
            "orga",
        )
        .await
        .unwrap();
        assert_eq!(created.delivery_methods.len(), 2);
        assert_eq!(created.remaining, 200);
    }

    #[tokio::test]
    async fn test_contingent_needs_delivery_method() {
        let f = fixture().await;
        let mut bad = input(&f, 10);
        bad.delivery_method_ids.clear();
        assert!(create_contingent(&f.store, &bad, "orga").await.is_err());

        bad.delivery_method_ids.push(Uuid::new_v4());
        assert!(create_contingent(&f.store, &bad, "orga").await.is_err());
    }

    #[tokio::test]
    async fn test_surcharge_bounds() {
        let f = fixture().await;
        assert!(update_surcharge(&f.store, f.pickup.id, Decimal::new(-1, 0), "orga")
            .await
            .is_err());
        let updated = update_surcharge(&f.store, f.pickup.id, Decimal::new(450, 2), "orga")
            .await
            .unwrap();
        assert_eq!(updated.surcharge, Decimal::new(450, 2));
        assert_eq!(updated.updated_by.as_deref(), Some("orga"));
    }

    #[tokio::test]
    async fn test_group_limit_bounds() {
        let f = fixture().await;
        let group = f
            .store
            .find_buyer_group_by_name(PUBLIC_GROUP)
            .await
            .unwrap()
            .unwrap();
        assert!(update_group_limit(&f.store, group.id, 11, "orga").await.is_err());
        let updated = update_group_limit(&f.store, group.id, 6, "orga").await.unwrap();
        assert_eq!(updated.max_tickets, 6);
    }
}
