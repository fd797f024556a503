use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Buyer {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub verified: bool,
    pub group_id: Uuid,
    /// Per-buyer purchase cap; `None` falls back to the group's limit.
    pub max_tickets: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBuyer {
    pub email: String,
    pub name: Option<String>,
    pub group_id: Uuid,
    pub verified: bool,
}

/// Contact form submitted with a purchase. Which fields are required depends on the
/// chosen delivery method.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactDetails {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// Row of the admin buyer list.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BuyerOverview {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub verified: bool,
    pub group_name: String,
    pub max_tickets: Option<i32>,
    pub ticket_count: i64,
}
