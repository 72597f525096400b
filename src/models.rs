pub mod contract;
pub mod job;
pub mod notification;
pub mod payment;
pub mod sub_account;
pub mod webhook;
