// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use crate::handlers;
use crate::models;
use crate::services;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Webhooks ---
        handlers::webhooks::payment_gateway_webhook,
        handlers::webhooks::esignature_webhook,

        // --- Contracts ---
        handlers::contracts::create_contract,
        handlers::contracts::get_contract,
        handlers::contracts::advance_contract,
        handlers::contracts::activate_contract,
        handlers::contracts::cancel_contract,
        handlers::contracts::list_payment_orders,
        handlers::contracts::register_artifact,

        // --- Payment Orders ---
        handlers::payment_orders::issue_charge,
        handlers::payment_orders::retry_payout,

        // --- Landlords ---
        handlers::landlords::provision_sub_account,
        handlers::landlords::register_payout_key,
        handlers::landlords::get_balance,

        // --- Scheduler ---
        handlers::scheduler::run_daily_job,
    ),
    components(
        schemas(
            // --- Contracts ---
            models::contract::ContractStatus,
            models::contract::Contract,
            models::contract::NewContract,
            models::sub_account::ContractArtifact,
            services::contract_service::Activation,
            services::contract_service::Cancellation,

            // --- Payments ---
            models::payment::PaymentOrderStatus,
            models::payment::BillingType,
            models::payment::TransferStatus,
            models::payment::PaymentOrder,
            models::payment::Charge,
            models::payment::Transfer,
            services::payout_service::PayoutOutcome,

            // --- Landlords ---
            models::sub_account::PayeeSubAccount,
            services::sub_account_service::LandlordProfile,

            // --- Scheduler ---
            services::scheduler_service::DailyReport,

            // --- Payloads ---
            handlers::contracts::AdvanceContractPayload,
            handlers::contracts::RegisterArtifactPayload,
            handlers::payment_orders::IssueChargePayload,
            handlers::landlords::PayoutKeyPayload,
            handlers::landlords::BalanceResponse,
        )
    ),
    tags(
        (name = "Webhooks", description = "Eventos do gateway de pagamentos e da assinatura eletrônica"),
        (name = "Contracts", description = "Ciclo de vida do contrato de locação"),
        (name = "Payment Orders", description = "Cobranças e repasses das parcelas"),
        (name = "Landlords", description = "Subcontas e chaves de repasse dos proprietários"),
        (name = "Scheduler", description = "Jobs diários (vencimento, pré-emissão, expiração)")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "gateway_token",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("asaas-access-token"))),
        );
        components.add_security_scheme(
            "esign_token",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("x-esign-token"))),
        );
    }
}
