use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{admin, auth, health_check, payments, shop};
use crate::state::AppState;

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/email", post(auth::request_email_login))
        .route("/email/verify", post(auth::verify_email_login))
        .route("/staff/login", post(auth::staff_login))
        .route("/permissions", get(auth::permissions))
}

fn shop_routes() -> Router<AppState> {
    Router::new()
        .route("/info", get(shop::shop_info))
        .route("/offers", get(shop::offers))
        .route("/purchase", post(shop::start_purchase))
        .route("/confirm", get(shop::confirm))
        .route("/tickets", get(shop::my_tickets))
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/contingents",
            get(admin::list_contingents).post(admin::create_contingent),
        )
        .route("/contingents/:id", put(admin::update_contingent))
        .route("/ticket-types", get(admin::list_ticket_types))
        .route("/delivery-methods", get(admin::list_delivery_methods))
        .route("/delivery-methods/:id", put(admin::update_delivery_method))
        .route("/buyer-groups", get(admin::list_buyer_groups))
        .route("/buyer-groups/:id", put(admin::update_buyer_group))
        .route("/buyers", get(admin::list_buyers))
        .route("/buyers/:id", put(admin::update_buyer))
        .route("/tickets", get(admin::list_tickets))
        .route("/tickets/code/:code", get(admin::ticket_by_code))
        .route("/tickets/:id/sent", post(admin::mark_ticket_sent))
        .route(
            "/settings",
            get(admin::get_settings).put(admin::update_settings),
        )
        .route("/import", post(admin::import_buyers))
}

pub fn create_routes(state: AppState) -> Router {
    let production = state.config.production;
    let cors = create_cors_layer(&state.config.allowed_origins);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes())
        .nest("/api/shop", shop_routes())
        .route("/api/payments/webhook", post(payments::webhook))
        .nest("/api/admin", admin_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(production))
        .layer(cors)
}
