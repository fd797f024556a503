use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Store, StoreResult};
use crate::models::{
    Buyer, BuyerGroup, BuyerOverview, ContactDetails, DeliveryMethod, NewBuyer, NewSoldTicket,
    ReserveInput, SoldTicket, StaffAccount, SystemSettings, TicketReserve, TicketType,
    ALUMNI_GROUP, PUBLIC_GROUP,
};
use crate::utils::error::AppError;

const BACKEND_GROUPS: [&str; 4] = ["Admin", "Orga", "Kasse", "Versand"];

/// Ticket types of a fresh database and the buyer groups that may buy them.
const SEED_TICKET_TYPES: [(&str, &[&str]); 2] = [
    ("Ballkarte", &[PUBLIC_GROUP, ALUMNI_GROUP]),
    ("Absolventenkarte", &[ALUMNI_GROUP]),
];

/// Delivery methods of a fresh database with their surcharge in cents.
const SEED_DELIVERY_METHODS: [(&str, i64); 2] = [("Versand", 500), ("Abholung", 0)];

#[derive(Default)]
struct Tables {
    settings: Option<SystemSettings>,
    groups: Vec<BuyerGroup>,
    ticket_types: Vec<TicketType>,
    group_types: Vec<(Uuid, Uuid)>,
    buyers: Vec<Buyer>,
    tokens: Vec<(String, String, DateTime<Utc>)>,
    staff: Vec<StaffAccount>,
    methods: Vec<DeliveryMethod>,
    reserves: Vec<TicketReserve>,
    reserve_methods: HashMap<Uuid, Vec<Uuid>>,
    tickets: Vec<SoldTicket>,
}

/// Process-local store seeded like a fresh database. Used by tests and local demos.
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let now = Utc::now();
        let group = |name: &str, max_tickets| BuyerGroup {
            id: Uuid::new_v4(),
            name: name.to_string(),
            max_tickets,
            updated_by: None,
            updated_at: now,
        };
        let mut tables = Tables {
            settings: Some(SystemSettings {
                sales_enabled: false,
                updated_by: None,
                updated_at: now,
            }),
            groups: vec![group(PUBLIC_GROUP, 2), group(ALUMNI_GROUP, 4)],
            ..Tables::default()
        };
        for (name, group_names) in SEED_TICKET_TYPES {
            let ticket_type = TicketType {
                id: Uuid::new_v4(),
                name: name.to_string(),
            };
            for group in tables.groups.iter().filter(|g| group_names.contains(&g.name.as_str())) {
                tables.group_types.push((group.id, ticket_type.id));
            }
            tables.ticket_types.push(ticket_type);
        }
        tables.methods = SEED_DELIVERY_METHODS
            .iter()
            .map(|(name, cents)| DeliveryMethod {
                id: Uuid::new_v4(),
                name: name.to_string(),
                surcharge: Decimal::new(*cents, 2),
                updated_by: None,
                updated_at: now,
            })
            .collect();
        Self {
            tables: Mutex::new(tables),
        }
    }

    pub async fn add_ticket_type(&self, name: &str, group_names: &[&str]) -> TicketType {
        let mut tables = self.tables.lock().await;
        let ticket_type = TicketType {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        let group_ids: Vec<Uuid> = tables
            .groups
            .iter()
            .filter(|g| group_names.contains(&g.name.as_str()))
            .map(|g| g.id)
            .collect();
        for group_id in group_ids {
            tables.group_types.push((group_id, ticket_type.id));
        }
        tables.ticket_types.push(ticket_type.clone());
        ticket_type
    }

    pub async fn add_delivery_method(&self, name: &str, surcharge: Decimal) -> DeliveryMethod {
        let method = DeliveryMethod {
            id: Uuid::new_v4(),
            name: name.to_string(),
            surcharge,
            updated_by: None,
            updated_at: Utc::now(),
        };
        self.tables.lock().await.methods.push(method.clone());
        method
    }
}

fn missing(what: &str) -> AppError {
    AppError::NotFound(format!("{what} nicht gefunden."))
}

#[async_trait]
impl Store for MemoryStore {
    async fn settings(&self) -> StoreResult<SystemSettings> {
        self.tables
            .lock()
            .await
            .settings
            .clone()
            .ok_or_else(|| AppError::InternalServerError("Systemeinstellungen fehlen.".into()))
    }

    async fn set_sales_enabled(
        &self,
        enabled: bool,
        updated_by: &str,
    ) -> StoreResult<SystemSettings> {
        let settings = SystemSettings {
            sales_enabled: enabled,
            updated_by: Some(updated_by.to_string()),
            updated_at: Utc::now(),
        };
        self.tables.lock().await.settings = Some(settings.clone());
        Ok(settings)
    }

    async fn list_buyer_groups(&self) -> StoreResult<Vec<BuyerGroup>> {
        let mut groups = self.tables.lock().await.groups.clone();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn find_buyer_group(&self, id: Uuid) -> StoreResult<Option<BuyerGroup>> {
        let tables = self.tables.lock().await;
        Ok(tables.groups.iter().find(|g| g.id == id).cloned())
    }

    async fn find_buyer_group_by_name(&self, name: &str) -> StoreResult<Option<BuyerGroup>> {
        let tables = self.tables.lock().await;
        Ok(tables.groups.iter().find(|g| g.name == name).cloned())
    }

    async fn update_buyer_group_max(
        &self,
        id: Uuid,
        max_tickets: i32,
        updated_by: &str,
    ) -> StoreResult<Option<BuyerGroup>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.groups.iter_mut().find(|g| g.id == id).map(|group| {
            group.max_tickets = max_tickets;
            group.updated_by = Some(updated_by.to_string());
            group.updated_at = Utc::now();
            group.clone()
        }))
    }

    async fn list_ticket_types(&self) -> StoreResult<Vec<TicketType>> {
        Ok(self.tables.lock().await.ticket_types.clone())
    }

    async fn find_ticket_type(&self, id: Uuid) -> StoreResult<Option<TicketType>> {
        let tables = self.tables.lock().await;
        Ok(tables.ticket_types.iter().find(|t| t.id == id).cloned())
    }

    async fn group_ticket_type_ids(&self, group_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .group_types
            .iter()
            .filter(|(g, _)| *g == group_id)
            .map(|(_, t)| *t)
            .collect())
    }

    async fn find_buyer(&self, id: Uuid) -> StoreResult<Option<Buyer>> {
        let tables = self.tables.lock().await;
        Ok(tables.buyers.iter().find(|b| b.id == id).cloned())
    }

    async fn find_buyer_by_email(&self, email: &str) -> StoreResult<Option<Buyer>> {
        let tables = self.tables.lock().await;
        Ok(tables.buyers.iter().find(|b| b.email == email).cloned())
    }

    async fn insert_buyer(&self, buyer: NewBuyer) -> StoreResult<Buyer> {
        let mut tables = self.tables.lock().await;
        if tables.buyers.iter().any(|b| b.email == buyer.email) {
            return Err(AppError::Conflict(format!(
                "Käufer {} existiert bereits.",
                buyer.email
            )));
        }
        let now = Utc::now();
        let buyer = Buyer {
            id: Uuid::new_v4(),
            email: buyer.email,
            name: buyer.name,
            phone: None,
            street: None,
            postal_code: None,
            city: None,
            country: None,
            verified: buyer.verified,
            group_id: buyer.group_id,
            max_tickets: None,
            created_at: now,
            updated_at: now,
        };
        tables.buyers.push(buyer.clone());
        Ok(buyer)
    }

    async fn set_buyer_verified(&self, id: Uuid) -> StoreResult<Buyer> {
        let mut tables = self.tables.lock().await;
        let buyer = tables
            .buyers
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| missing("Käufer"))?;
        buyer.verified = true;
        buyer.updated_at = Utc::now();
        Ok(buyer.clone())
    }

    async fn update_buyer_contact(
        &self,
        id: Uuid,
        contact: &ContactDetails,
    ) -> StoreResult<Buyer> {
        let mut tables = self.tables.lock().await;
        let buyer = tables
            .buyers
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| missing("Käufer"))?;
        buyer.name = contact.name.clone();
        buyer.phone = contact.phone.clone();
        buyer.street = contact.street.clone();
        buyer.postal_code = contact.postal_code.clone();
        buyer.city = contact.city.clone();
        buyer.country = contact.country.clone();
        buyer.updated_at = Utc::now();
        Ok(buyer.clone())
    }

    async fn update_buyer_group_and_name(
        &self,
        id: Uuid,
        group_id: Uuid,
        name: &str,
    ) -> StoreResult<Buyer> {
        let mut tables = self.tables.lock().await;
        let buyer = tables
            .buyers
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| missing("Käufer"))?;
        buyer.group_id = group_id;
        buyer.name = Some(name.to_string());
        buyer.updated_at = Utc::now();
        Ok(buyer.clone())
    }

    async fn set_buyer_max_tickets(
        &self,
        id: Uuid,
        max_tickets: Option<i32>,
    ) -> StoreResult<Option<Buyer>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.buyers.iter_mut().find(|b| b.id == id).map(|buyer| {
            buyer.max_tickets = max_tickets;
            buyer.updated_at = Utc::now();
            buyer.clone()
        }))
    }

    async fn list_buyers(&self) -> StoreResult<Vec<BuyerOverview>> {
        let tables = self.tables.lock().await;
        let mut buyers: Vec<BuyerOverview> = tables
            .buyers
            .iter()
            .map(|b| BuyerOverview {
                id: b.id,
                email: b.email.clone(),
                name: b.name.clone(),
                verified: b.verified,
                group_name: tables
                    .groups
                    .iter()
                    .find(|g| g.id == b.group_id)
                    .map(|g| g.name.clone())
                    .unwrap_or_default(),
                max_tickets: b.max_tickets,
                ticket_count: tables.tickets.iter().filter(|t| t.buyer_id == b.id).count() as i64,
            })
            .collect();
        buyers.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(buyers)
    }

    async fn insert_verification_token(
        &self,
        identifier: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.tables.lock().await.tokens.push((
            identifier.to_string(),
            token_hash.to_string(),
            expires_at,
        ));
        Ok(())
    }

    async fn take_verification_token(
        &self,
        identifier: &str,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let position = tables
            .tokens
            .iter()
            .position(|(id, hash, _)| id == identifier && hash == token_hash);
        let valid = match position {
            Some(index) => tables.tokens.remove(index).2 > now,
            None => false,
        };
        tables.tokens.retain(|(_, _, expires_at)| *expires_at > now);
        Ok(valid)
    }

    async fn find_staff_account(&self, username: &str) -> StoreResult<Option<StaffAccount>> {
        let tables = self.tables.lock().await;
        Ok(tables.staff.iter().find(|s| s.username == username).cloned())
    }

    async fn insert_staff_account(
        &self,
        username: &str,
        password_hash: &str,
        group_name: &str,
    ) -> StoreResult<StaffAccount> {
        if !BACKEND_GROUPS.contains(&group_name) {
            return Err(AppError::NotFound(format!(
                "Gruppe '{group_name}' existiert nicht."
            )));
        }
        let mut tables = self.tables.lock().await;
        if tables.staff.iter().any(|s| s.username == username) {
            return Err(AppError::Conflict(format!(
                "Benutzer {username} existiert bereits."
            )));
        }
        let account = StaffAccount {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            group_name: group_name.to_string(),
        };
        tables.staff.push(account.clone());
        Ok(account)
    }

    async fn list_delivery_methods(&self) -> StoreResult<Vec<DeliveryMethod>> {
        let mut methods = self.tables.lock().await.methods.clone();
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(methods)
    }

    async fn update_delivery_surcharge(
        &self,
        id: Uuid,
        surcharge: Decimal,
        updated_by: &str,
    ) -> StoreResult<Option<DeliveryMethod>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.methods.iter_mut().find(|m| m.id == id).map(|method| {
            method.surcharge = surcharge;
            method.updated_by = Some(updated_by.to_string());
            method.updated_at = Utc::now();
            method.clone()
        }))
    }

    async fn list_reserves(&self) -> StoreResult<Vec<TicketReserve>> {
        let mut reserves = self.tables.lock().await.reserves.clone();
        reserves.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(reserves)
    }

    async fn find_reserve(&self, id: Uuid) -> StoreResult<Option<TicketReserve>> {
        let tables = self.tables.lock().await;
        Ok(tables.reserves.iter().find(|r| r.id == id).cloned())
    }

    async fn reserve_delivery_methods(
        &self,
        reserve_id: Uuid,
    ) -> StoreResult<Vec<DeliveryMethod>> {
        let tables = self.tables.lock().await;
        let ids = tables
            .reserve_methods
            .get(&reserve_id)
            .cloned()
            .unwrap_or_default();
        let mut methods: Vec<DeliveryMethod> = tables
            .methods
            .iter()
            .filter(|m| ids.contains(&m.id))
            .cloned()
            .collect();
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(methods)
    }

    async fn sold_units(&self, reserve_id: Uuid) -> StoreResult<i64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tickets
            .iter()
            .filter(|t| t.reserve_id == reserve_id && t.paid)
            .map(|t| i64::from(t.quantity))
            .sum())
    }

    async fn insert_reserve(
        &self,
        input: &ReserveInput,
        updated_by: &str,
    ) -> StoreResult<TicketReserve> {
        let reserve = TicketReserve {
            id: Uuid::new_v4(),
            name: input.name.clone(),
            amount: input.amount,
            price: input.price,
            type_id: input.type_id,
            updated_by: Some(updated_by.to_string()),
            updated_at: Utc::now(),
        };
        let mut tables = self.tables.lock().await;
        tables
            .reserve_methods
            .insert(reserve.id, input.delivery_method_ids.clone());
        tables.reserves.push(reserve.clone());
        Ok(reserve)
    }

    async fn update_reserve(
        &self,
        id: Uuid,
        input: &ReserveInput,
        updated_by: &str,
    ) -> StoreResult<Option<TicketReserve>> {
        let mut tables = self.tables.lock().await;
        let Some(reserve) = tables.reserves.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        reserve.name = input.name.clone();
        reserve.amount = input.amount;
        reserve.price = input.price;
        reserve.type_id = input.type_id;
        reserve.updated_by = Some(updated_by.to_string());
        reserve.updated_at = Utc::now();
        let updated = reserve.clone();
        tables
            .reserve_methods
            .insert(id, input.delivery_method_ids.clone());
        Ok(Some(updated))
    }

    async fn code_exists(&self, code: &str) -> StoreResult<bool> {
        let tables = self.tables.lock().await;
        Ok(tables.tickets.iter().any(|t| t.code == code))
    }

    async fn count_tickets_for_buyer(&self, buyer_id: Uuid) -> StoreResult<i64> {
        let tables = self.tables.lock().await;
        Ok(tables.tickets.iter().filter(|t| t.buyer_id == buyer_id).count() as i64)
    }

    async fn insert_sold_ticket(&self, ticket: NewSoldTicket) -> StoreResult<SoldTicket> {
        let mut tables = self.tables.lock().await;
        if tables.tickets.iter().any(|t| t.code == ticket.code) {
            return Err(AppError::Conflict(format!(
                "Code {} ist bereits vergeben.",
                ticket.code
            )));
        }
        let ticket = SoldTicket {
            id: Uuid::new_v4(),
            buyer_id: ticket.buyer_id,
            reserve_id: ticket.reserve_id,
            quantity: ticket.quantity,
            delivery_method: ticket.delivery_method,
            code: ticket.code,
            paid: false,
            sent: false,
            payment_reference: None,
            checkout_session_id: None,
            price_paid: ticket.price_paid,
            created_at: Utc::now(),
        };
        tables.tickets.push(ticket.clone());
        Ok(ticket)
    }

    async fn set_checkout_session(&self, ticket_id: Uuid, session_id: &str) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if let Some(ticket) = tables.tickets.iter_mut().find(|t| t.id == ticket_id) {
            ticket.checkout_session_id = Some(session_id.to_string());
        }
        Ok(())
    }

    async fn delete_sold_ticket(&self, ticket_id: Uuid) -> StoreResult<()> {
        self.tables
            .lock()
            .await
            .tickets
            .retain(|t| t.id != ticket_id || t.paid);
        Ok(())
    }

    async fn find_sold_ticket(&self, id: Uuid) -> StoreResult<Option<SoldTicket>> {
        let tables = self.tables.lock().await;
        Ok(tables.tickets.iter().find(|t| t.id == id).cloned())
    }

    async fn find_ticket_by_code(&self, code: &str) -> StoreResult<Option<SoldTicket>> {
        let tables = self.tables.lock().await;
        Ok(tables.tickets.iter().find(|t| t.code == code).cloned())
    }

    async fn tickets_for_buyer(&self, buyer_id: Uuid) -> StoreResult<Vec<SoldTicket>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tickets
            .iter()
            .filter(|t| t.buyer_id == buyer_id)
            .cloned()
            .collect())
    }

    async fn list_sold_tickets(&self) -> StoreResult<Vec<SoldTicket>> {
        let tables = self.tables.lock().await;
        Ok(tables.tickets.iter().rev().cloned().collect())
    }

    async fn mark_ticket_paid(
        &self,
        ticket_id: Uuid,
        payment_reference: &str,
    ) -> StoreResult<Option<SoldTicket>> {
        let mut tables = self.tables.lock().await;
        let Some(ticket) = tables
            .tickets
            .iter_mut()
            .find(|t| t.id == ticket_id && !t.paid)
        else {
            return Ok(None);
        };
        ticket.paid = true;
        ticket.payment_reference = Some(payment_reference.to_string());
        Ok(Some(ticket.clone()))
    }

    async fn mark_ticket_sent(&self, ticket_id: Uuid) -> StoreResult<Option<SoldTicket>> {
        let mut tables = self.tables.lock().await;
        Ok(tables
            .tickets
            .iter_mut()
            .find(|t| t.id == ticket_id)
            .map(|ticket| {
                ticket.sent = true;
                ticket.clone()
            }))
    }
}
