use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One purchase: `quantity` tickets from a single reserve, sharing one code.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SoldTicket {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub reserve_id: Uuid,
    pub quantity: i32,
    pub delivery_method: String,
    pub code: String,
    pub paid: bool,
    pub sent: bool,
    pub payment_reference: Option<String>,
    pub checkout_session_id: Option<String>,
    pub price_paid: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSoldTicket {
    pub buyer_id: Uuid,
    pub reserve_id: Uuid,
    pub quantity: i32,
    pub delivery_method: String,
    pub code: String,
    pub price_paid: Decimal,
}
