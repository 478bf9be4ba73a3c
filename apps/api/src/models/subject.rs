use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{IdentityFields, ObjectId, ObjectKind};

/// A span of a conversation in which a subject was being discussed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A subject extracted from a conversation by the analysis pipeline.
/// Read-only to this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: ObjectId,
    pub conversation_id: String,
    pub keyword_ids: Vec<ObjectId>,
    pub description: Option<String>,
    pub time_ranges: Vec<TimeRange>,
    pub message_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl Subject {
    /// Subjects are scoped to their conversation: identical keyword sets in two
    /// conversations are two distinct subjects.
    pub fn identity<I, S>(conversation_id: &str, terms: I) -> IdentityFields
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        IdentityFields::new(ObjectKind::Subject)
            .text("conversation_id", conversation_id)
            .set(
                "keyword_terms",
                terms.into_iter().map(|t| Keyword::normalize(t.as_ref())),
            )
    }

    /// Human-readable label: the description if the pipeline produced one,
    /// otherwise the first few keyword terms.
    pub fn display_name(&self, terms: &[String]) -> String {
        match self.description.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => d.to_string(),
            _ => terms
                .iter()
                .take(3)
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
    pub term: String,
    pub frequency: u32,
    pub subject_refs: Vec<ObjectId>,
}

impl Keyword {
    pub fn normalize(term: &str) -> String {
        term.trim().to_lowercase()
    }

    pub fn identity(term: &str) -> IdentityFields {
        IdentityFields::new(ObjectKind::Keyword).text("term", Keyword::normalize(term))
    }
}

/// A message shown alongside a shared subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageExcerpt {
    pub message_id: String,
    pub author: Option<String>,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}
