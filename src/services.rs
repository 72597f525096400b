pub mod artifact_service;
pub mod charge_service;
pub mod contract_service;
pub mod notification_service;
pub mod payout_service;
pub mod queue_service;
pub mod reconciler_service;
pub mod scheduler_service;
pub mod sub_account_service;
