use crate::application::BankService;
use crate::web::handlers::*;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn create_router(service: Arc<BankService>) -> Router {
    Router::new()
        .route("/api/v1/accounts", post(open_account))
        .route("/api/v1/accounts/lookup", get(lookup_account_id))
        .route("/api/v1/accounts/{id}", get(get_account))
        .route("/api/v1/accounts/{id}/balance", get(get_balance))
        .route("/api/v1/accounts/{id}/deposit", put(deposit))
        .route("/api/v1/accounts/{id}/withdraw", put(withdraw))
        .route("/api/v1/accounts/{id}/close", put(close_account))
        .route(
            "/api/v1/accounts/{id}/overdraft-limit",
            get(get_overdraft_limit).put(set_overdraft_limit),
        )
        .route(
            "/api/v1/accounts/{id}/validate-password",
            post(validate_password),
        )
        .route("/api/v1/accounts/{id}/password", put(change_password))
        .route("/api/v1/transfers", post(transfer))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .with_state(service)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
