// src/services/artifact_service.rs

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{common::error::AppError, db::LedgerStore, models::sub_account::ContractArtifact};

/// Interface exposta para o fluxo de documentos (PDF / assinatura).
/// A renderização fica do lado de lá; aqui só registramos o artefato com validade.
#[async_trait]
pub trait DocumentCollaborator: Send + Sync {
    async fn generate_contract_artifact(&self, contract_id: Uuid, storage_key: &str) -> Result<ContractArtifact, AppError>;
}

#[derive(Clone)]
pub struct ArtifactRegistry {
    store: Arc<dyn LedgerStore>,
    ttl_days: i64,
}

impl ArtifactRegistry {
    pub fn new(store: Arc<dyn LedgerStore>, ttl_days: i64) -> Self {
        Self { store, ttl_days: ttl_days.max(1) }
    }
}

#[async_trait]
impl DocumentCollaborator for ArtifactRegistry {
    async fn generate_contract_artifact(&self, contract_id: Uuid, storage_key: &str) -> Result<ContractArtifact, AppError> {
        if storage_key.trim().is_empty() {
            return Err(AppError::InvalidPayload("storageKey vazio".to_string()));
        }
        if self.store.get_contract(contract_id).await?.is_none() {
            return Err(AppError::NotFound(format!("contrato {}", contract_id)));
        }

        let expires_at = Utc::now() + Duration::days(self.ttl_days);
        let artifact = self.store.register_artifact(contract_id, storage_key, expires_at).await?;
        tracing::info!(%contract_id, storage_key, %expires_at, "Artefato do contrato registrado");
        Ok(artifact)
    }
}
