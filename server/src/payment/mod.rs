use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::utils::error::AppError;

pub mod stripe;
pub mod webhook;

pub use stripe::StripeClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub name: String,
    pub unit_amount_cents: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub customer_email: String,
    pub currency: String,
    pub line_items: Vec<LineItem>,
    /// Copied onto the session and read back on confirmation.
    pub metadata: BTreeMap<String, String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct CheckoutSessionStatus {
    pub id: String,
    pub paid: bool,
    pub payment_reference: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Hosted checkout provider.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, AppError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSessionStatus, AppError>;
}

pub fn to_cents(amount: Decimal) -> Result<i64, AppError> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| AppError::InternalServerError(format!("Betrag {amount} ist ungültig.")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_cents_rounds_half_cents() {
        assert_eq!(to_cents(Decimal::new(3550, 2)).unwrap(), 3550);
        assert_eq!(to_cents(Decimal::new(12, 0)).unwrap(), 1200);
        assert_eq!(to_cents(Decimal::new(19995, 3)).unwrap(), 2000);
    }
}
