//! Persistence seam. Handlers and services only see [`Store`]; production wires
//! [`PgStore`], tests wire [`MemoryStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    Buyer, BuyerGroup, BuyerOverview, ContactDetails, DeliveryMethod, NewBuyer, NewSoldTicket,
    ReserveInput, SoldTicket, StaffAccount, SystemSettings, TicketReserve, TicketType,
};
use crate::utils::error::AppError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, AppError>;

#[async_trait]
pub trait Store: Send + Sync {
    // system settings
    async fn settings(&self) -> StoreResult<SystemSettings>;
    async fn set_sales_enabled(&self, enabled: bool, updated_by: &str)
        -> StoreResult<SystemSettings>;

    // buyer groups and ticket types
    async fn list_buyer_groups(&self) -> StoreResult<Vec<BuyerGroup>>;
    async fn find_buyer_group(&self, id: Uuid) -> StoreResult<Option<BuyerGroup>>;
    async fn find_buyer_group_by_name(&self, name: &str) -> StoreResult<Option<BuyerGroup>>;
    async fn update_buyer_group_max(
        &self,
        id: Uuid,
        max_tickets: i32,
        updated_by: &str,
    ) -> StoreResult<Option<BuyerGroup>>;
    async fn list_ticket_types(&self) -> StoreResult<Vec<TicketType>>;
    async fn find_ticket_type(&self, id: Uuid) -> StoreResult<Option<TicketType>>;
    /// Ticket types a group may buy from.
    async fn group_ticket_type_ids(&self, group_id: Uuid) -> StoreResult<Vec<Uuid>>;

    // buyers
    async fn find_buyer(&self, id: Uuid) -> StoreResult<Option<Buyer>>;
    async fn find_buyer_by_email(&self, email: &str) -> StoreResult<Option<Buyer>>;
    async fn insert_buyer(&self, buyer: NewBuyer) -> StoreResult<Buyer>;
    async fn set_buyer_verified(&self, id: Uuid) -> StoreResult<Buyer>;
    async fn update_buyer_contact(&self, id: Uuid, contact: &ContactDetails)
        -> StoreResult<Buyer>;
    async fn update_buyer_group_and_name(
        &self,
        id: Uuid,
        group_id: Uuid,
        name: &str,
    ) -> StoreResult<Buyer>;
    async fn set_buyer_max_tickets(
        &self,
        id: Uuid,
        max_tickets: Option<i32>,
    ) -> StoreResult<Option<Buyer>>;
    async fn list_buyers(&self) -> StoreResult<Vec<BuyerOverview>>;

    // passwordless login
    async fn insert_verification_token(
        &self,
        identifier: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    /// Deletes the token and reports whether it existed and was still valid at `now`.
    async fn take_verification_token(
        &self,
        identifier: &str,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    // staff
    async fn find_staff_account(&self, username: &str) -> StoreResult<Option<StaffAccount>>;
    async fn insert_staff_account(
        &self,
        username: &str,
        password_hash: &str,
        group_name: &str,
    ) -> StoreResult<StaffAccount>;

    // delivery methods
    async fn list_delivery_methods(&self) -> StoreResult<Vec<DeliveryMethod>>;
    async fn update_delivery_surcharge(
        &self,
        id: Uuid,
        surcharge: Decimal,
        updated_by: &str,
    ) -> StoreResult<Option<DeliveryMethod>>;

    // contingents
    async fn list_reserves(&self) -> StoreResult<Vec<TicketReserve>>;
    async fn find_reserve(&self, id: Uuid) -> StoreResult<Option<TicketReserve>>;
    async fn reserve_delivery_methods(&self, reserve_id: Uuid)
        -> StoreResult<Vec<DeliveryMethod>>;
    /// Units on paid tickets of this reserve.
    async fn sold_units(&self, reserve_id: Uuid) -> StoreResult<i64>;
    async fn insert_reserve(&self, input: &ReserveInput, updated_by: &str)
        -> StoreResult<TicketReserve>;
    async fn update_reserve(
        &self,
        id: Uuid,
        input: &ReserveInput,
        updated_by: &str,
    ) -> StoreResult<Option<TicketReserve>>;

    // sold tickets
    async fn code_exists(&self, code: &str) -> StoreResult<bool>;
    async fn count_tickets_for_buyer(&self, buyer_id: Uuid) -> StoreResult<i64>;
    async fn insert_sold_ticket(&self, ticket: NewSoldTicket) -> StoreResult<SoldTicket>;
    async fn set_checkout_session(&self, ticket_id: Uuid, session_id: &str) -> StoreResult<()>;
    async fn delete_sold_ticket(&self, ticket_id: Uuid) -> StoreResult<()>;
    async fn find_sold_ticket(&self, id: Uuid) -> StoreResult<Option<SoldTicket>>;
    async fn find_ticket_by_code(&self, code: &str) -> StoreResult<Option<SoldTicket>>;
    async fn tickets_for_buyer(&self, buyer_id: Uuid) -> StoreResult<Vec<SoldTicket>>;
    async fn list_sold_tickets(&self) -> StoreResult<Vec<SoldTicket>>;
    /// Flips an unpaid ticket to paid, which counts its quantity as sold. Returns
    /// `None` when the ticket is missing or was already paid.
    async fn mark_ticket_paid(
        &self,
        ticket_id: Uuid,
        payment_reference: &str,
    ) -> StoreResult<Option<SoldTicket>>;
    async fn mark_ticket_sent(&self, ticket_id: Uuid) -> StoreResult<Option<SoldTicket>>;
}
