#![allow(dead_code)]

//! In-process adapters. Back `STORE_BACKEND=memory` and the unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::models::subject::{MessageExcerpt, Subject, TimeRange};
use crate::store::{
    IdentityFields, ObjectId, ObjectKind, ObjectStore, StoreError, StoreReceipt, StoredObject,
    SubjectStore,
};

#[derive(Default)]
pub struct MemoryObjectStore {
    versions: Mutex<HashMap<ObjectId, Vec<StoredObject>>>,
    offline: AtomicBool,
    rejected_kind: Mutex<Option<ObjectKind>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the backend going away: every call fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fails writes of one object kind while reads and other writes succeed.
    pub fn reject_writes_of(&self, kind: Option<ObjectKind>) {
        *self
            .rejected_kind
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = kind;
    }

    pub fn version_count(&self, id: &ObjectId) -> usize {
        self.versions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map_or(0, Vec::len)
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn store(&self, identity: &IdentityFields, body: Value) -> Result<StoreReceipt, StoreError> {
        self.check_online()?;
        let rejected = *self
            .rejected_kind
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if rejected == Some(identity.kind()) {
            return Err(StoreError::Unavailable(format!(
                "writes of {} are rejected",
                identity.kind().as_str()
            )));
        }
        let id = self.compute_deterministic_id(identity);
        let mut versions = self.versions.lock().unwrap_or_else(PoisonError::into_inner);
        let history = versions.entry(id.clone()).or_default();
        let version = history.last().map_or(0, |o| o.version) + 1;
        let version_id = Uuid::new_v4();
        history.push(StoredObject {
            id: id.clone(),
            version,
            body,
        });
        Ok(StoreReceipt {
            id,
            version_id,
            version,
        })
    }

    async fn get_by_id(&self, id: &ObjectId) -> Result<Option<StoredObject>, StoreError> {
        self.check_online()?;
        Ok(self
            .versions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .and_then(|history| history.last().cloned()))
    }
}

#[derive(Default)]
pub struct MemorySubjectStore {
    subjects: Mutex<BTreeMap<String, Vec<Subject>>>,
    messages: Mutex<HashMap<String, Vec<MessageExcerpt>>>,
    offline: AtomicBool,
}

impl MemorySubjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subject(&self, subject: Subject) {
        self.subjects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(subject.conversation_id.clone())
            .or_default()
            .push(subject);
    }

    pub fn add_message(&self, conversation_id: &str, message: MessageExcerpt) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(conversation_id.to_string())
            .or_default()
            .push(message);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory subject store is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SubjectStore for MemorySubjectStore {
    async fn list_conversations(&self) -> Result<Vec<String>, StoreError> {
        self.check_online()?;
        Ok(self
            .subjects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }

    async fn get_subjects(&self, conversation_id: &str) -> Result<Vec<Subject>, StoreError> {
        self.check_online()?;
        Ok(self
            .subjects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn messages_in_ranges(
        &self,
        conversation_id: &str,
        ranges: &[TimeRange],
    ) -> Result<Vec<MessageExcerpt>, StoreError> {
        self.check_online()?;
        let messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        let mut hits: Vec<MessageExcerpt> = messages
            .get(conversation_id)
            .map(|all| {
                all.iter()
                    .filter(|m| ranges.iter().any(|r| r.start <= m.sent_at && m.sent_at <= r.end))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        hits.sort_by_key(|m| m.sent_at);
        Ok(hits)
    }
}
