use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Default group for buyers who sign in without being imported.
pub const PUBLIC_GROUP: &str = "Öffentlich";
/// Target group of the CSV alumni import.
pub const ALUMNI_GROUP: &str = "Absolventen";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BuyerGroup {
    pub id: Uuid,
    pub name: String,
    pub max_tickets: i32,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}
