//! Shared fixtures for proposal tests: in-memory stores and subject seeding.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::subject::{Keyword, Subject, TimeRange};
use crate::proposals::cache::ProposalCache;
use crate::proposals::generator::ProposalGenerator;
use crate::proposals::service::ProposalService;
use crate::store::memory::{MemoryObjectStore, MemorySubjectStore};
use crate::store::persist;

pub struct Fixture {
    pub objects: Arc<MemoryObjectStore>,
    pub subjects: Arc<MemorySubjectStore>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(MemoryObjectStore::new()),
            subjects: Arc::new(MemorySubjectStore::new()),
        }
    }

    pub fn generator(&self) -> ProposalGenerator {
        ProposalGenerator::new(self.subjects.clone(), self.objects.clone())
    }

    pub fn service(&self) -> ProposalService {
        ProposalService::new(
            self.subjects.clone(),
            self.objects.clone(),
            ProposalCache::new(Duration::from_secs(60), NonZeroUsize::new(50).unwrap()),
        )
    }
}

/// Persists the keywords and the subject object without registering the
/// subject with its conversation.
pub async fn build_subject(
    fx: &Fixture,
    conversation_id: &str,
    terms: &[&str],
    created_at: DateTime<Utc>,
) -> Subject {
    let subject_id = Subject::identity(conversation_id, terms.iter()).object_id();

    let mut keyword_ids = Vec::with_capacity(terms.len());
    for term in terms {
        let keyword = Keyword {
            term: Keyword::normalize(term),
            frequency: 1,
            subject_refs: vec![subject_id.clone()],
        };
        let receipt = persist(fx.objects.as_ref(), &Keyword::identity(term), &keyword)
            .await
            .unwrap();
        keyword_ids.push(receipt.id);
    }

    let subject = Subject {
        id: subject_id,
        conversation_id: conversation_id.to_string(),
        keyword_ids,
        description: None,
        time_ranges: vec![TimeRange {
            start: created_at,
            end: created_at + chrono::Duration::hours(1),
        }],
        message_count: 3,
        created_at,
        last_seen_at: created_at,
    };
    persist(
        fx.objects.as_ref(),
        &Subject::identity(conversation_id, terms.iter()),
        &subject,
    )
    .await
    .unwrap();
    subject
}

pub async fn seed_subject(
    fx: &Fixture,
    conversation_id: &str,
    terms: &[&str],
    created_at: DateTime<Utc>,
) -> Subject {
    let subject = build_subject(fx, conversation_id, terms, created_at).await;
    fx.subjects.add_subject(subject.clone());
    subject
}
