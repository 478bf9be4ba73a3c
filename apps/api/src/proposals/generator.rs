//! Candidate generation: scans every other conversation's subjects for keyword
//! overlap with the current topic.
//!
//! Conversations are scanned concurrently; ordering is imposed afterwards by
//! the ranker. A subject whose keywords cannot be dereferenced is logged and
//! skipped, never fatal: partial results beat no results.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::models::proposal::{Candidate, ProposalConfig, ProposalRef};
use crate::models::subject::{Keyword, Subject};
use crate::proposals::recency::recency_boost;
use crate::proposals::similarity::{jaccard, matched_keywords};
use crate::store::{load, ObjectId, ObjectStore, StoreError, SubjectStore};

/// Keyword terms of a subject, plus any keyword refs that no longer resolve.
#[derive(Debug, Default)]
pub struct ResolvedTerms {
    pub terms: BTreeSet<String>,
    pub missing: Vec<ObjectId>,
}

pub async fn resolve_terms(
    objects: &dyn ObjectStore,
    subject: &Subject,
) -> Result<ResolvedTerms, StoreError> {
    let mut resolved = ResolvedTerms::default();
    for keyword_id in &subject.keyword_ids {
        match load::<Keyword>(objects, keyword_id).await? {
            Some(keyword) => {
                let term = Keyword::normalize(&keyword.term);
                if !term.is_empty() {
                    resolved.terms.insert(term);
                }
            }
            None => resolved.missing.push(keyword_id.clone()),
        }
    }
    Ok(resolved)
}

pub struct ProposalGenerator {
    subjects: Arc<dyn SubjectStore>,
    objects: Arc<dyn ObjectStore>,
}

impl ProposalGenerator {
    pub fn new(subjects: Arc<dyn SubjectStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { subjects, objects }
    }

    pub async fn generate(
        &self,
        conversation_id: &str,
        current_terms: &BTreeSet<String>,
        config: &ProposalConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<Candidate>, AppError> {
        if current_terms.is_empty() {
            return Ok(Vec::new());
        }

        let conversations = self.subjects.list_conversations().await?;
        let current_terms = Arc::new(current_terms.clone());
        let mut scans = JoinSet::new();

        for past_conversation in conversations {
            if past_conversation == conversation_id {
                continue;
            }
            let scan = ConversationScan {
                subjects: self.subjects.clone(),
                objects: self.objects.clone(),
                current_conversation: conversation_id.to_string(),
                past_conversation,
                current_terms: current_terms.clone(),
                min_jaccard: config.min_jaccard,
                recency_window_ms: config.recency_window_ms,
                now,
            };
            scans.spawn(scan.run());
        }

        let mut candidates = Vec::new();
        while let Some(joined) = scans.join_next().await {
            let found = joined.map_err(|e| {
                AppError::Computation(format!("conversation scan task failed: {e}"))
            })?;
            candidates.extend(found);
        }

        debug!(
            "Generated {} candidates for conversation {conversation_id}",
            candidates.len()
        );
        Ok(candidates)
    }
}

/// Owned inputs for scanning one past conversation on its own task.
struct ConversationScan {
    subjects: Arc<dyn SubjectStore>,
    objects: Arc<dyn ObjectStore>,
    current_conversation: String,
    past_conversation: String,
    current_terms: Arc<BTreeSet<String>>,
    min_jaccard: f64,
    recency_window_ms: i64,
    now: DateTime<Utc>,
}

impl ConversationScan {
    async fn run(self) -> Vec<Candidate> {
        let subjects = match self.subjects.get_subjects(&self.past_conversation).await {
            Ok(subjects) => subjects,
            Err(e) => {
                warn!(
                    "Skipping conversation {}: could not load subjects: {e}",
                    self.past_conversation
                );
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        for subject in subjects {
            if subject.conversation_id == self.current_conversation {
                continue;
            }
            if let Some(candidate) = self.evaluate(&subject).await {
                candidates.push(candidate);
            }
        }
        candidates
    }

    async fn evaluate(&self, subject: &Subject) -> Option<Candidate> {
        let resolved = match resolve_terms(self.objects.as_ref(), subject).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("Skipping subject {}: {e}", subject.id);
                return None;
            }
        };
        if !resolved.missing.is_empty() {
            warn!(
                "Skipping subject {}: {} keyword(s) missing",
                subject.id,
                resolved.missing.len()
            );
            return None;
        }
        if resolved.terms.is_empty() {
            return None;
        }

        let jaccard_score = jaccard(self.current_terms.iter(), resolved.terms.iter());
        if jaccard_score < self.min_jaccard {
            return None;
        }

        let recency_score = recency_boost(subject.created_at, self.now, self.recency_window_ms);
        let terms: Vec<String> = resolved.terms.iter().cloned().collect();
        let proposal_id =
            ProposalRef::identity(&self.current_conversation, &subject.id, None).object_id();

        Some(Candidate {
            proposal_id,
            past_subject_id: subject.id.clone(),
            source_conversation_id: subject.conversation_id.clone(),
            past_subject_name: subject.display_name(&terms),
            description: subject.description.clone(),
            matched_keywords: matched_keywords(self.current_terms.iter(), resolved.terms.iter()),
            jaccard_score,
            recency_score,
            relevance_score: 0.0,
            subject_created_at: subject.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposals::similarity::normalize_terms;
    use crate::proposals::test_support::{build_subject, seed_subject, Fixture};
    use chrono::Duration;
    use uuid::Uuid;

    fn config(min_jaccard: f64) -> ProposalConfig {
        ProposalConfig {
            min_jaccard,
            ..ProposalConfig::default_for(Uuid::nil())
        }
    }

    #[tokio::test]
    async fn test_empty_current_terms_short_circuits() {
        let fx = Fixture::new();
        seed_subject(&fx, "past", &["pizza"], Utc::now()).await;
        let generator = fx.generator();

        let got = generator
            .generate("current", &BTreeSet::new(), &config(0.0), Utc::now())
            .await
            .unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn test_pizza_candidate_scores() {
        let fx = Fixture::new();
        let now = Utc::now();
        seed_subject(&fx, "past", &["pizza", "dough"], now - Duration::days(1)).await;
        let generator = fx.generator();

        let got = generator
            .generate(
                "current",
                &normalize_terms(["pizza", "oven"]),
                &config(0.2),
                now,
            )
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert!((got[0].jaccard_score - 0.333).abs() < 0.001);
        assert!((got[0].recency_score - 0.967).abs() < 0.001);
        assert_eq!(got[0].matched_keywords, vec!["pizza".to_string()]);
        assert_eq!(got[0].source_conversation_id, "past");
    }

    #[tokio::test]
    async fn test_below_min_jaccard_is_dropped() {
        let fx = Fixture::new();
        seed_subject(&fx, "past", &["pizza", "dough"], Utc::now()).await;
        let generator = fx.generator();

        let got = generator
            .generate(
                "current",
                &normalize_terms(["pizza", "oven"]),
                &config(0.5),
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn test_current_conversation_never_proposed() {
        let fx = Fixture::new();
        seed_subject(&fx, "current", &["pizza", "oven"], Utc::now()).await;
        let generator = fx.generator();

        let got = generator
            .generate(
                "current",
                &normalize_terms(["pizza", "oven"]),
                &config(0.0),
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn test_missing_keyword_skips_only_that_subject() {
        let fx = Fixture::new();
        let now = Utc::now();
        seed_subject(&fx, "past-a", &["pizza", "oven"], now).await;
        let mut broken = build_subject(&fx, "past-b", &["pizza"], now).await;
        broken.keyword_ids.push(ObjectId::new("dangling"));
        fx.subjects.add_subject(broken);
        let generator = fx.generator();

        let got = generator
            .generate("current", &normalize_terms(["pizza", "oven"]), &config(0.0), now)
            .await
            .unwrap();
        let sources: Vec<_> = got.iter().map(|c| c.source_conversation_id.as_str()).collect();
        assert_eq!(sources, vec!["past-a"]);
    }

    #[tokio::test]
    async fn test_subject_without_keywords_is_skipped() {
        let fx = Fixture::new();
        let now = Utc::now();
        seed_subject(&fx, "past-a", &["pizza"], now).await;
        seed_subject(&fx, "past-empty", &[], now).await;
        let generator = fx.generator();

        // min_jaccard 0 would admit a zero-overlap subject; the empty one must still be skipped.
        let got = generator
            .generate("current", &normalize_terms(["pizza"]), &config(0.0), now)
            .await
            .unwrap();
        let sources: Vec<_> = got.iter().map(|c| c.source_conversation_id.as_str()).collect();
        assert_eq!(sources, vec!["past-a"]);
    }

    #[tokio::test]
    async fn test_listing_failure_surfaces_storage_error() {
        let fx = Fixture::new();
        fx.subjects.set_offline(true);
        let generator = fx.generator();

        let got = generator
            .generate("current", &normalize_terms(["pizza"]), &config(0.0), Utc::now())
            .await;
        assert!(matches!(got, Err(AppError::Storage(_))));
    }

    #[tokio::test]
    async fn test_proposal_id_is_deterministic() {
        let fx = Fixture::new();
        let now = Utc::now();
        let subject = seed_subject(&fx, "past", &["pizza"], now).await;
        let generator = fx.generator();
        let terms = normalize_terms(["pizza"]);

        let first = generator.generate("current", &terms, &config(0.0), now).await.unwrap();
        let second = generator.generate("current", &terms, &config(0.0), now).await.unwrap();
        assert_eq!(first[0].proposal_id, second[0].proposal_id);
        assert_eq!(
            first[0].proposal_id,
            ProposalRef::identity("current", &subject.id, None).object_id()
        );
    }
}
