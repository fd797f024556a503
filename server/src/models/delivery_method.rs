use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeliveryMethod {
    pub id: Uuid,
    pub name: String,
    pub surcharge: Decimal,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryMethod {
    pub fn kind(&self) -> Option<DeliveryKind> {
        DeliveryKind::classify(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryKind {
    Shipping,
    Pickup,
}

impl DeliveryKind {
    /// Delivery methods are typed by name: anything containing "versand" ships,
    /// anything containing "abholung" is collected in person.
    pub fn classify(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.contains("versand") {
            Some(DeliveryKind::Shipping)
        } else if name.contains("abholung") {
            Some(DeliveryKind::Pickup)
        } else {
            None
        }
    }
}
