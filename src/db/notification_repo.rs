// src/db/notification_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::error::AppError;

/// Destino das notificações in-app. Chamado apenas pelo worker da fila.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        action_link: Option<&str>,
    ) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct PgNotificationSink {
    pool: PgPool,
}

impl PgNotificationSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSink for PgNotificationSink {
    async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        action_link: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (user_id, title, message, action_link)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(message)
        .bind(action_link)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Só registra no log. Usado com `STORAGE_BACKEND=memory`.
#[derive(Clone, Default)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        action_link: Option<&str>,
    ) -> Result<(), AppError> {
        tracing::info!(%user_id, title, message, action_link, "Notificação");
        Ok(())
    }
}
