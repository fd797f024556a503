#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use ballticket_server::auth::Provider;
use ballticket_server::config::Config;
use ballticket_server::mail::{Mailer, OutgoingMail};
use ballticket_server::models::{
    DeliveryMethod, NewBuyer, ReserveInput, TicketReserve, PUBLIC_GROUP,
};
use ballticket_server::payment::{
    CheckoutRequest, CheckoutSession, CheckoutSessionStatus, PaymentProvider,
};
use ballticket_server::routes::create_routes;
use ballticket_server::state::AppState;
use ballticket_server::store::{MemoryStore, Store};
use ballticket_server::utils::error::AppError;

/// Checkout provider that keeps sessions in memory. Sessions start unpaid.
#[derive(Default)]
pub struct FakePayments {
    sessions: Mutex<HashMap<String, CheckoutSessionStatus>>,
    pub requests: Mutex<Vec<CheckoutRequest>>,
    pub fail_next: Mutex<bool>,
}

impl FakePayments {
    pub async fn pay(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(session_id).expect("unknown session");
        session.paid = true;
        session.payment_reference = Some(format!("pi_{session_id}"));
    }
}

#[async_trait]
impl PaymentProvider for FakePayments {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, AppError> {
        if std::mem::take(&mut *self.fail_next.lock().await) {
            return Err(AppError::ExternalServiceError("checkout down".into()));
        }
        self.requests.lock().await.push(request.clone());
        let mut sessions = self.sessions.lock().await;
        let id = format!("cs_test_{}", sessions.len() + 1);
        sessions.insert(
            id.clone(),
            CheckoutSessionStatus {
                id: id.clone(),
                paid: false,
                payment_reference: None,
                metadata: request.metadata.clone(),
            },
        );
        Ok(CheckoutSession {
            url: format!("https://checkout.test/{id}"),
            id,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSessionStatus, AppError> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("no such session".into()))
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingMail>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), AppError> {
        self.sent.lock().await.push(mail.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub payments: Arc<FakePayments>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let payments = Arc::new(FakePayments::default());
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::new(config, store.clone(), payments.clone(), mailer.clone());
        Self {
            state,
            store,
            payments,
            mailer,
        }
    }

    pub fn router(&self) -> Router {
        create_routes(self.state.clone())
    }

    pub fn buyer_token(&self, email: &str, group: &str) -> String {
        self.state
            .sessions
            .issue(email, Provider::Email, group, Utc::now())
            .unwrap()
    }

    pub fn staff_token(&self, username: &str, group: &str) -> String {
        self.state
            .sessions
            .issue(username, Provider::Credentials, group, Utc::now())
            .unwrap()
    }

    pub async fn add_public_buyer(&self, email: &str) -> String {
        let group = self
            .store
            .find_buyer_group_by_name(PUBLIC_GROUP)
            .await
            .unwrap()
            .unwrap();
        self.store
            .insert_buyer(NewBuyer {
                email: email.into(),
                name: None,
                group_id: group.id,
                verified: true,
            })
            .await
            .unwrap();
        self.buyer_token(email, PUBLIC_GROUP)
    }

    /// Opens the sale and creates one public contingent with a pickup method.
    pub async fn open_shop(&self, amount: i32) -> (TicketReserve, DeliveryMethod) {
        self.store.set_sales_enabled(true, "test").await.unwrap();
        let ticket_type = self.store.add_ticket_type("Ball", &[PUBLIC_GROUP]).await;
        let pickup = self
            .store
            .add_delivery_method("Abholung in der Schule", Decimal::ZERO)
            .await;
        let reserve = self
            .store
            .insert_reserve(
                &ReserveInput {
                    name: "Abendkasse".into(),
                    amount,
                    price: Decimal::new(3500, 2),
                    type_id: ticket_type.id,
                    delivery_method_ids: vec![pickup.id],
                },
                "test",
            )
            .await
            .unwrap();
        (reserve, pickup)
    }

    /// Attaches a shipping method with a surcharge to the reserve.
    pub async fn add_shipping(
        &self,
        reserve: &TicketReserve,
        pickup: &DeliveryMethod,
    ) -> DeliveryMethod {
        let shipping = self
            .store
            .add_delivery_method("Versand (DHL)", Decimal::new(450, 2))
            .await;
        self.store
            .update_reserve(
                reserve.id,
                &ReserveInput {
                    name: reserve.name.clone(),
                    amount: reserve.amount,
                    price: reserve.price,
                    type_id: reserve.type_id,
                    delivery_method_ids: vec![pickup.id, shipping.id],
                },
                "test",
            )
            .await
            .unwrap();
        shipping
    }
}

pub async fn send(
    router: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

pub fn shipping_body(reserve_id: Uuid, method_id: Uuid, quantity: i32) -> Value {
    serde_json::json!({
        "reserve_id": reserve_id,
        "quantity": quantity,
        "delivery_method_id": method_id,
        "contact": {
            "name": "Anna Muster",
            "phone": "+49 170 1234567",
            "street": "Schulweg 1",
            "postal_code": "12345",
            "city": "Musterstadt",
            "country": "Deutschland"
        }
    })
}

pub fn purchase_body(reserve_id: Uuid, method_id: Uuid, quantity: i32) -> Value {
    serde_json::json!({
        "reserve_id": reserve_id,
        "quantity": quantity,
        "delivery_method_id": method_id,
        "contact": { "name": "Anna Muster", "phone": "+49 170 1234567" }
    })
}
