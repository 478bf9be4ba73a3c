//! Persistent record of how users reacted to proposals.
//!
//! Records are content-addressed by `(user_id, target_id, action)`, so writing
//! the same interaction twice lands on the same id. "Has the user already
//! dismissed this?" is answered by recomputing the record and response ids and
//! looking them up directly; no scan or secondary index is involved.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::interaction::{
    ActionStatus, InteractionAction, InteractionRecord, InteractionResponse,
};
use crate::models::proposal::ProposalRef;
use crate::store::{load, persist, ObjectId, ObjectStore, StoreError};

pub struct InteractionLedger {
    objects: Arc<dyn ObjectStore>,
}

impl InteractionLedger {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }

    /// Returns only after the record has been persisted.
    pub async fn record(
        &self,
        user_id: Uuid,
        target_id: &ObjectId,
        action: InteractionAction,
        conversation_id: &str,
    ) -> Result<ObjectId, StoreError> {
        let record = InteractionRecord {
            user_id,
            target_id: target_id.clone(),
            action,
            conversation_id: conversation_id.to_string(),
            created_at: Utc::now(),
        };
        let identity = InteractionRecord::identity(user_id, target_id, action);
        let receipt = persist(self.objects.as_ref(), &identity, &record).await?;

        info!(
            "Recorded {} of {target_id} by user {user_id} as {}",
            action.as_str(),
            receipt.id
        );
        Ok(receipt.id)
    }

    pub async fn respond(
        &self,
        record_id: &ObjectId,
        success: bool,
        metadata: Option<Value>,
    ) -> Result<ObjectId, StoreError> {
        let response = InteractionResponse {
            record_id: record_id.clone(),
            success,
            executed_at: Utc::now(),
            metadata,
        };
        let receipt = persist(
            self.objects.as_ref(),
            &InteractionResponse::identity(record_id),
            &response,
        )
        .await?;
        Ok(receipt.id)
    }

    /// Record then respond. The record id is returned only once both are stored.
    pub async fn record_with_response(
        &self,
        user_id: Uuid,
        target_id: &ObjectId,
        action: InteractionAction,
        conversation_id: &str,
        metadata: Option<Value>,
    ) -> Result<ObjectId, StoreError> {
        let record_id = self
            .record(user_id, target_id, action, conversation_id)
            .await?;
        self.respond(&record_id, true, metadata).await?;
        Ok(record_id)
    }

    /// An action counts as performed only once its record and a successful
    /// response are both stored. Both ids are recomputed, never scanned.
    pub async fn has_action(
        &self,
        user_id: Uuid,
        target_id: &ObjectId,
        action: InteractionAction,
    ) -> ActionStatus {
        let record_id = self
            .objects
            .compute_deterministic_id(&InteractionRecord::identity(user_id, target_id, action));
        match self.completed(&record_id).await {
            Ok(true) => ActionStatus::Performed,
            Ok(false) => ActionStatus::NotPerformed,
            Err(e) => {
                warn!(
                    "Could not check {} of {target_id} for user {user_id}: {e}",
                    action.as_str()
                );
                ActionStatus::Unknown
            }
        }
    }

    async fn completed(&self, record_id: &ObjectId) -> Result<bool, StoreError> {
        if self.objects.get_by_id(record_id).await?.is_none() {
            return Ok(false);
        }
        let response_id = self
            .objects
            .compute_deterministic_id(&InteractionResponse::identity(record_id));
        let response = load::<InteractionResponse>(self.objects.as_ref(), &response_id).await?;
        Ok(response.is_some_and(|r| r.success))
    }

    /// Writes the proposal reference an interaction points at. Idempotent.
    pub async fn materialize_proposal(&self, proposal: &ProposalRef) -> Result<ObjectId, StoreError> {
        let receipt = persist(self.objects.as_ref(), &proposal.identity_fields(), proposal).await?;
        Ok(receipt.id)
    }
}
