//! Storage seams. The proposal engine reads and writes only through these
//! two traits; each backend provides one adapter.

pub mod identity;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub use identity::{deterministic_id, IdentityFields, ObjectId, ObjectKind};

use crate::models::subject::{MessageExcerpt, Subject, TimeRange};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("object {id} is corrupt: {reason}")]
    Corrupt { id: ObjectId, reason: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Latest version of a stored object.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub id: ObjectId,
    pub version: i32,
    pub body: Value,
}

#[derive(Debug, Clone)]
pub struct StoreReceipt {
    pub id: ObjectId,
    pub version_id: Uuid,
    pub version: i32,
}

/// Content-addressed, versioned object store.
///
/// `store` never overwrites: writing an id that already exists appends a new
/// version, and `get_by_id` returns the highest one.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn store(&self, identity: &IdentityFields, body: Value) -> Result<StoreReceipt, StoreError>;

    async fn get_by_id(&self, id: &ObjectId) -> Result<Option<StoredObject>, StoreError>;

    /// Pure; never touches the backend.
    fn compute_deterministic_id(&self, identity: &IdentityFields) -> ObjectId {
        deterministic_id(identity)
    }
}

/// Read access to the subjects the analysis pipeline extracted per conversation.
#[async_trait]
pub trait SubjectStore: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<String>, StoreError>;

    async fn get_subjects(&self, conversation_id: &str) -> Result<Vec<Subject>, StoreError>;

    /// Messages of `conversation_id` sent inside any of `ranges`, oldest first.
    async fn messages_in_ranges(
        &self,
        conversation_id: &str,
        ranges: &[TimeRange],
    ) -> Result<Vec<MessageExcerpt>, StoreError>;
}

pub async fn persist<T: Serialize + Sync>(
    store: &dyn ObjectStore,
    identity: &IdentityFields,
    value: &T,
) -> Result<StoreReceipt, StoreError> {
    let body = serde_json::to_value(value)?;
    store.store(identity, body).await
}

pub async fn load<T: DeserializeOwned>(
    store: &dyn ObjectStore,
    id: &ObjectId,
) -> Result<Option<T>, StoreError> {
    let Some(object) = store.get_by_id(id).await? else {
        return Ok(None);
    };
    serde_json::from_value(object.body)
        .map(Some)
        .map_err(|e| StoreError::Corrupt {
            id: object.id,
            reason: e.to_string(),
        })
}
