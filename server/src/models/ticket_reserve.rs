use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketType {
    pub id: Uuid,
    pub name: String,
}

/// A contingent. `amount` is its total size; paid tickets count against it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketReserve {
    pub id: Uuid,
    pub name: String,
    pub amount: i32,
    pub price: Decimal,
    pub type_id: Uuid,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveInput {
    pub name: String,
    pub amount: i32,
    pub price: Decimal,
    pub type_id: Uuid,
    pub delivery_method_ids: Vec<Uuid>,
}
