pub mod job_repo;
pub mod ledger_store;
pub mod memory_ledger;
pub mod notification_repo;
pub mod pg_ledger;

pub use job_repo::{InMemoryJobQueue, JobQueue, PgJobQueue};
pub use ledger_store::LedgerStore;
pub use memory_ledger::InMemoryLedgerStore;
pub use notification_repo::{NotificationSink, PgNotificationSink, TracingNotificationSink};
pub use pg_ledger::PgLedgerStore;
