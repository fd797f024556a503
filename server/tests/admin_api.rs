mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use rust_decimal::Decimal;
use serde_json::json;
use tower::ServiceExt;

use ballticket_server::config::Config;
use ballticket_server::models::{NewSoldTicket, ALUMNI_GROUP};
use ballticket_server::services::auth::ensure_bootstrap_admin;
use ballticket_server::store::Store;
use common::{send, TestApp};

#[tokio::test]
async fn test_bootstrap_admin_can_log_in() {
    let mut config = Config::default();
    config.bootstrap_admin = Some(("chef".into(), "sehr-geheim-42".into()));
    let app = TestApp::with_config(config);
    ensure_bootstrap_admin(&app.state).await.unwrap();
    ensure_bootstrap_admin(&app.state).await.unwrap();

    let (status, _) = send(
        app.router(),
        Method::POST,
        "/api/auth/staff/login",
        None,
        Some(json!({ "username": "chef", "password": "falsch" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        app.router(),
        Method::POST,
        "/api/auth/staff/login",
        None,
        Some(json!({ "username": "chef", "password": "sehr-geheim-42" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = send(
        app.router(),
        Method::GET,
        "/api/auth/permissions",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["permissions"]["settings"], true);
    assert_eq!(body["data"]["permissions"]["deliveryMethods"], true);
}

#[tokio::test]
async fn test_section_permissions_are_enforced() {
    let app = TestApp::new();
    let versand = app.staff_token("paul", "Versand");
    let (status, _) = send(
        app.router(),
        Method::GET,
        "/api/admin/contingents",
        Some(&versand),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        app.router(),
        Method::GET,
        "/api/admin/tickets",
        Some(&versand),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let buyer = app.buyer_token("anna@example.org", "Öffentlich");
    let (status, _) = send(
        app.router(),
        Method::GET,
        "/api/admin/tickets",
        Some(&buyer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_amount_edit_below_sold_is_rejected() {
    let app = TestApp::new();
    let (reserve, pickup) = app.open_shop(10).await;
    let ticket = app
        .store
        .insert_sold_ticket(NewSoldTicket {
            buyer_id: uuid::Uuid::new_v4(),
            reserve_id: reserve.id,
            quantity: 3,
            delivery_method: pickup.name.clone(),
            code: "HJKL2345".into(),
            price_paid: Decimal::new(10500, 2),
        })
        .await
        .unwrap();
    app.store.mark_ticket_paid(ticket.id, "pi_1").await.unwrap();

    let orga = app.staff_token("olga", "Orga");
    let uri = format!("/api/admin/contingents/{}", reserve.id);
    let edit = |amount: i32| {
        json!({
            "name": "Abendkasse",
            "amount": amount,
            "price": "35.00",
            "type_id": reserve.type_id,
            "delivery_method_ids": [pickup.id],
        })
    };

    let (status, body) = send(app.router(), Method::PUT, &uri, Some(&orga), Some(edit(2))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("(3)"));

    let (status, body) = send(app.router(), Method::PUT, &uri, Some(&orga), Some(edit(3))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["amount"], 3);
    assert_eq!(body["data"]["sold"], 3);
    assert_eq!(body["data"]["remaining"], 0);
    assert_eq!(body["data"]["updated_by"], "olga");
}

#[tokio::test]
async fn test_mark_sent_notifies_pickup_buyer() {
    let mut config = Config::default();
    config.pickup_dates = vec!["Mo 10.06. 12-14 Uhr".into()];
    let app = TestApp::with_config(config);
    let (reserve, pickup) = app.open_shop(10).await;
    app.add_public_buyer("anna@example.org").await;
    let buyer = app
        .store
        .find_buyer_by_email("anna@example.org")
        .await
        .unwrap()
        .unwrap();
    let ticket = app
        .store
        .insert_sold_ticket(NewSoldTicket {
            buyer_id: buyer.id,
            reserve_id: reserve.id,
            quantity: 1,
            delivery_method: pickup.name.clone(),
            code: "QRST6789".into(),
            price_paid: Decimal::new(3500, 2),
        })
        .await
        .unwrap();

    let kasse = app.staff_token("karl", "Kasse");
    let uri = format!("/api/admin/tickets/{}/sent", ticket.id);
    let (status, _) = send(app.router(), Method::POST, &uri, Some(&kasse), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.store.mark_ticket_paid(ticket.id, "pi_1").await.unwrap();
    let (status, body) = send(app.router(), Method::POST, &uri, Some(&kasse), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ticket"]["sent"], true);
    assert_eq!(body["data"]["notified"], true);

    let mails = app.mailer.sent.lock().await;
    assert_eq!(mails.len(), 1);
    assert!(mails[0].body.contains("QRST6789"));
    assert!(mails[0].body.contains("Mo 10.06. 12-14 Uhr"));
    drop(mails);

    let (status, body) = send(
        app.router(),
        Method::GET,
        "/api/admin/tickets/code/qrst6789",
        Some(&kasse),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["buyer_email"], "anna@example.org");
}

#[tokio::test]
async fn test_sales_kill_switch() {
    let app = TestApp::new();
    let admin = app.staff_token("admin", "Admin");
    let (status, body) = send(
        app.router(),
        Method::PUT,
        "/api/admin/settings",
        Some(&admin),
        Some(json!({ "sales_enabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["sales_enabled"], true);
    assert_eq!(body["data"]["updated_by"], "admin");

    let (_, info) = send(app.router(), Method::GET, "/api/shop/info", None, None).await;
    assert_eq!(info["data"]["sale"]["open"], true);
}

#[tokio::test]
async fn test_csv_import_reports_lines() {
    let app = TestApp::new();
    let orga = app.staff_token("olga", "Orga");
    let csv = "email,name\nanna@schule.de,Anna\nben@schule.de;Ben\n";

    let request = || {
        Request::builder()
            .method(Method::POST)
            .uri("/api/admin/import")
            .header(header::AUTHORIZATION, format!("Bearer {orga}"))
            .header(header::CONTENT_TYPE, "text/csv")
            .body(Body::from(csv))
            .unwrap()
    };

    let response = app.router().oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"]["created"], 1);
    assert_eq!(
        body["data"]["errors"][0],
        "Zeile 3: Semikolon als Trennzeichen erkannt, bitte Komma verwenden."
    );

    let response = app.router().oneshot(request()).await.unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"]["created"], 0);
    assert_eq!(body["data"]["skipped"], 1);

    let anna = app
        .store
        .find_buyer_by_email("anna@schule.de")
        .await
        .unwrap()
        .unwrap();
    let group = app.store.find_buyer_group(anna.group_id).await.unwrap().unwrap();
    assert_eq!(group.name, ALUMNI_GROUP);
}
