pub mod contracts;
pub mod landlords;
pub mod payment_orders;
pub mod scheduler;
pub mod webhooks;
