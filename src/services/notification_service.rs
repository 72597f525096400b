// src/services/notification_service.rs

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{JobQueue, NotificationSink},
    models::{
        job::Job,
        notification::{Escalation, Notification},
    },
};

/// Notificações e escalonamentos. Quem muda estado só enfileira;
/// a entrega acontece no worker, depois do commit.
#[derive(Clone)]
pub struct NotificationService {
    sink: Arc<dyn NotificationSink>,
    queue: Arc<dyn JobQueue>,
    admin_ids: Arc<Vec<Uuid>>,
}

impl NotificationService {
    pub fn new(sink: Arc<dyn NotificationSink>, queue: Arc<dyn JobQueue>, admin_ids: Vec<Uuid>) -> Self {
        Self { sink, queue, admin_ids: Arc::new(admin_ids) }
    }

    /// Enfileira uma notificação. `scope` identifica entidade + status alvo
    /// (ex.: `{parcela}:PAID:{versão}`); repetir o mesmo escopo não duplica.
    pub async fn enqueue(&self, scope: &str, notification: Notification) -> Result<bool, AppError> {
        let key = format!("notify:{}", scope);
        let queued = self.queue.enqueue(&key, &Job::Notify { notification }).await?;
        if !queued {
            tracing::debug!(job_key = %key, "Notificação já enfileirada");
        }
        Ok(queued)
    }

    pub async fn enqueue_escalation(&self, scope: &str, escalation: Escalation) -> Result<bool, AppError> {
        let key = format!("escalate:{}", scope);
        tracing::error!(
            kind = ?escalation.kind,
            landlord_id = ?escalation.landlord_id,
            payment_order_id = ?escalation.payment_order_id,
            amount = ?escalation.amount,
            reason = %escalation.reason,
            "Escalonando para os administradores"
        );
        self.queue.enqueue(&key, &Job::Escalate { escalation }).await
    }

    /// Entrega efetiva (chamada pelo worker).
    pub async fn deliver(&self, notification: &Notification) -> Result<(), AppError> {
        self.sink
            .notify(
                notification.user_id,
                &notification.title,
                &notification.message,
                notification.action_link.as_deref(),
            )
            .await
    }

    /// Desdobra o escalonamento em uma notificação por administrador, cada uma
    /// com a chave `{chave do escalonamento}:{admin}`. Uma entrega que falha é
    /// repetida sozinha, sem reenviar para quem já recebeu.
    pub async fn escalate(&self, escalation_key: &str, escalation: &Escalation) -> Result<usize, AppError> {
        if self.admin_ids.is_empty() {
            tracing::error!(kind = ?escalation.kind, message = %escalation.message(), "Nenhum administrador configurado para receber o escalonamento");
            return Ok(0);
        }

        let message = escalation.message();
        let mut queued = 0;
        for admin_id in self.admin_ids.iter() {
            let notification = Notification::new(*admin_id, escalation.title(), message.clone());
            let key = admin_delivery_key(escalation_key, *admin_id);
            if self.queue.enqueue(&key, &Job::Notify { notification }).await? {
                queued += 1;
            }
        }
        Ok(queued)
    }
}

pub fn admin_delivery_key(escalation_key: &str, admin_id: Uuid) -> String {
    format!("{}:{}", escalation_key, admin_id)
}

/// Entrega de escalonamento para um administrador. Se ela mesma esgotar as
/// tentativas, não gera outro escalonamento.
pub fn is_escalation_delivery(job_key: &str) -> bool {
    job_key.starts_with("escalate:")
}
