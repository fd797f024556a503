use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SystemSettings {
    pub sales_enabled: bool,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}
