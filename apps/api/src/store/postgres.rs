//! Postgres adapters.
//!
//! Objects live in one append-only `object_versions` table. Writes always
//! INSERT the next version of an id; rows are never UPDATEd.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::subject::{MessageExcerpt, Subject, TimeRange};
use crate::store::{
    IdentityFields, ObjectId, ObjectStore, StoreError, StoreReceipt, StoredObject, SubjectStore,
};

#[derive(Debug, FromRow)]
struct ObjectVersionRow {
    object_id: String,
    version: i32,
    body: Value,
}

impl From<ObjectVersionRow> for StoredObject {
    fn from(row: ObjectVersionRow) -> Self {
        StoredObject {
            id: ObjectId::new(row.object_id),
            version: row.version,
            body: row.body,
        }
    }
}

#[derive(Clone)]
pub struct PgObjectStore {
    pool: PgPool,
}

impl PgObjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ObjectStore for PgObjectStore {
    async fn store(&self, identity: &IdentityFields, body: Value) -> Result<StoreReceipt, StoreError> {
        let id = self.compute_deterministic_id(identity);
        let version_id = Uuid::new_v4();

        // Next version is computed in the same statement; the (object_id, version)
        // unique constraint rejects a concurrent writer instead of double-counting.
        let version: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO object_versions (version_id, object_id, kind, version, body)
            SELECT $1, $2, $3, COALESCE(MAX(version), 0) + 1, $4
            FROM object_versions
            WHERE object_id = $2
            RETURNING version
            "#,
        )
        .bind(version_id)
        .bind(id.as_str())
        .bind(identity.kind().as_str())
        .bind(&body)
        .fetch_one(&self.pool)
        .await?;

        debug!("Stored {} {id} version {version}", identity.kind().as_str());

        Ok(StoreReceipt {
            id,
            version_id,
            version,
        })
    }

    async fn get_by_id(&self, id: &ObjectId) -> Result<Option<StoredObject>, StoreError> {
        let row: Option<ObjectVersionRow> = sqlx::query_as(
            r#"
            SELECT object_id, version, body
            FROM object_versions
            WHERE object_id = $1
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(StoredObject::from))
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: String,
    author: Option<String>,
    body: String,
    sent_at: DateTime<Utc>,
}

/// Reads subjects written by the analysis pipeline into the shared object table.
#[derive(Clone)]
pub struct PgSubjectStore {
    pool: PgPool,
}

impl PgSubjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubjectStore for PgSubjectStore {
    async fn list_conversations(&self) -> Result<Vec<String>, StoreError> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT DISTINCT body->>'conversation_id'
            FROM object_versions
            WHERE kind = 'subject' AND body->>'conversation_id' IS NOT NULL
            ORDER BY 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_subjects(&self, conversation_id: &str) -> Result<Vec<Subject>, StoreError> {
        let bodies: Vec<(String, Value)> = sqlx::query_as(
            r#"
            SELECT DISTINCT ON (object_id) object_id, body
            FROM object_versions
            WHERE kind = 'subject' AND body->>'conversation_id' = $1
            ORDER BY object_id, version DESC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        // A malformed subject is the pipeline's problem; skip it rather than fail the scan.
        let mut subjects = Vec::with_capacity(bodies.len());
        for (object_id, body) in bodies {
            match serde_json::from_value::<Subject>(body) {
                Ok(subject) => subjects.push(subject),
                Err(e) => warn!("Skipping malformed subject {object_id}: {e}"),
            }
        }
        Ok(subjects)
    }

    async fn messages_in_ranges(
        &self,
        conversation_id: &str,
        ranges: &[TimeRange],
    ) -> Result<Vec<MessageExcerpt>, StoreError> {
        let mut excerpts: Vec<MessageExcerpt> = Vec::new();
        for range in ranges {
            let rows: Vec<MessageRow> = sqlx::query_as(
                r#"
                SELECT id, author, body, sent_at
                FROM conversation_messages
                WHERE conversation_id = $1 AND sent_at BETWEEN $2 AND $3
                ORDER BY sent_at ASC
                "#,
            )
            .bind(conversation_id)
            .bind(range.start)
            .bind(range.end)
            .fetch_all(&self.pool)
            .await?;

            excerpts.extend(rows.into_iter().map(|r| MessageExcerpt {
                message_id: r.id,
                author: r.author,
                body: r.body,
                sent_at: r.sent_at,
            }));
        }

        // Ranges may overlap.
        excerpts.sort_by(|a, b| {
            a.sent_at
                .cmp(&b.sent_at)
                .then_with(|| a.message_id.cmp(&b.message_id))
        });
        excerpts.dedup_by(|a, b| a.message_id == b.message_id);
        Ok(excerpts)
    }
}
