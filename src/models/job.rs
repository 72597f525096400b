// src/models/job.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    notification::{Escalation, Notification},
    payment::BillingType,
    webhook::{GatewayEvent, SignatureEvent},
};

/// Efeito colateral enfileirado depois que a transição de estado já foi gravada.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    ProcessGatewayEvent { event: GatewayEvent },
    ProcessSignatureEvent { event: SignatureEvent },
    InitiatePayout { payment_order_id: Uuid },
    IssueCharge {
        payment_order_id: Uuid,
        #[serde(default)]
        billing_type: Option<BillingType>,
    },
    Notify { notification: Notification },
    Escalate { escalation: Escalation },
}

impl Job {
    /// Nome curto para os logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Job::ProcessGatewayEvent { .. } => "process_gateway_event",
            Job::ProcessSignatureEvent { .. } => "process_signature_event",
            Job::InitiatePayout { .. } => "initiate_payout",
            Job::IssueCharge { .. } => "issue_charge",
            Job::Notify { .. } => "notify",
            Job::Escalate { .. } => "escalate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_state", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Running,
    Done,
    // Dead-letter: esgotou as tentativas ou falhou de forma definitiva
    Dead,
}

/// Job retirado da fila para execução.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedJob {
    pub id: Uuid,
    pub key: String,
    pub job: Job,
    // Já inclui a tentativa atual
    pub attempts: i32,
    pub run_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn jobs_are_tagged_by_type() {
        let id = Uuid::new_v4();
        let value = serde_json::to_value(Job::InitiatePayout { payment_order_id: id }).unwrap();
        assert_eq!(value, json!({ "type": "initiate_payout", "payment_order_id": id }));

        let back: Job = serde_json::from_value(json!({ "type": "issue_charge", "payment_order_id": id })).unwrap();
        assert_eq!(back, Job::IssueCharge { payment_order_id: id, billing_type: None });
    }
}
