// src/routes.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    config::AppState,
    docs::ApiDoc,
    handlers,
    middleware::webhook_token::{esign_token_guard, gateway_token_guard},
};

pub fn app(app_state: AppState) -> Router {
    // Webhooks: cada provedor com seu próprio token
    let gateway_webhook = Router::new()
        .route("/payment-gateway", post(handlers::webhooks::payment_gateway_webhook))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            gateway_token_guard,
        ));

    let esign_webhook = Router::new()
        .route("/esignature", post(handlers::webhooks::esignature_webhook))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            esign_token_guard,
        ));

    let contract_routes = Router::new()
        .route("/", post(handlers::contracts::create_contract))
        .route("/{id}", get(handlers::contracts::get_contract))
        .route("/{id}/advance", post(handlers::contracts::advance_contract))
        .route("/{id}/activate", post(handlers::contracts::activate_contract))
        .route("/{id}/cancel", post(handlers::contracts::cancel_contract))
        .route("/{id}/payment-orders", get(handlers::contracts::list_payment_orders))
        .route("/{id}/artifacts", post(handlers::contracts::register_artifact));

    let payment_order_routes = Router::new()
        .route("/{id}/charge", post(handlers::payment_orders::issue_charge))
        .route("/{id}/payout/retry", post(handlers::payment_orders::retry_payout));

    let landlord_routes = Router::new()
        .route("/{id}/sub-account", post(handlers::landlords::provision_sub_account))
        .route("/{id}/payout-key", put(handlers::landlords::register_payout_key))
        .route("/{id}/balance", get(handlers::landlords::get_balance));

    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .nest("/webhooks", gateway_webhook.merge(esign_webhook))
        .nest("/api/contracts", contract_routes)
        .nest("/api/payment-orders", payment_order_routes)
        .nest("/api/landlords", landlord_routes)
        .route("/api/scheduler/{job}", post(handlers::scheduler::run_daily_job))
        .with_state(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
