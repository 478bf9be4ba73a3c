//! TTL + LRU memoization of ranked, filtered proposal lists.
//!
//! Expiry is checked lazily on read; there is no background sweep.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::models::proposal::Candidate;
use crate::store::ObjectId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    user_id: Uuid,
    conversation_id: String,
    subject_ids: Vec<ObjectId>,
}

impl CacheKey {
    /// Subject order does not matter: ids are sorted and deduplicated.
    pub fn new(user_id: Uuid, conversation_id: &str, subject_ids: &[ObjectId]) -> Self {
        let mut subject_ids = subject_ids.to_vec();
        subject_ids.sort_unstable();
        subject_ids.dedup();
        Self {
            user_id,
            conversation_id: conversation_id.to_string(),
            subject_ids,
        }
    }
}

struct CacheEntry {
    candidates: Vec<Candidate>,
    inserted_at: Instant,
}

pub struct ProposalCache {
    ttl: Duration,
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
}

impl ProposalCache {
    pub fn new(ttl: Duration, capacity: NonZeroUsize) -> Self {
        Self {
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<Candidate>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = match entries.get(key) {
            None => return None,
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
        };
        if expired {
            debug!(
                "Proposal cache entry expired for conversation {}",
                key.conversation_id
            );
            entries.pop(key);
            return None;
        }
        entries.get(key).map(|entry| entry.candidates.clone())
    }

    pub fn set(&self, key: CacheKey, candidates: Vec<Candidate>) {
        let entry = CacheEntry {
            candidates,
            inserted_at: Instant::now(),
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key, entry);
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Finds a still-fresh candidate by proposal id without touching LRU order.
    pub fn find_candidate(&self, proposal_id: &ObjectId) -> Option<Candidate> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() < self.ttl)
            .flat_map(|(_, entry)| entry.candidates.iter())
            .find(|c| &c.proposal_id == proposal_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candidate(id: &str) -> Candidate {
        Candidate {
            proposal_id: ObjectId::new(id),
            past_subject_id: ObjectId::new(format!("s-{id}")),
            source_conversation_id: "past".to_string(),
            past_subject_name: id.to_string(),
            description: None,
            matched_keywords: vec!["pizza".to_string()],
            jaccard_score: 0.5,
            recency_score: 0.5,
            relevance_score: 0.5,
            subject_created_at: Utc::now(),
        }
    }

    fn cache(ttl_secs: u64, capacity: usize) -> ProposalCache {
        ProposalCache::new(
            Duration::from_secs(ttl_secs),
            NonZeroUsize::new(capacity).unwrap(),
        )
    }

    #[test]
    fn test_key_is_order_independent() {
        let user = Uuid::new_v4();
        let a = CacheKey::new(user, "c1", &[ObjectId::new("s2"), ObjectId::new("s1")]);
        let b = CacheKey::new(user, "c1", &[ObjectId::new("s1"), ObjectId::new("s2")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_separates_users() {
        let ids = [ObjectId::new("s1")];
        assert_ne!(
            CacheKey::new(Uuid::new_v4(), "c1", &ids),
            CacheKey::new(Uuid::new_v4(), "c1", &ids)
        );
    }

    #[test]
    fn test_key_does_not_merge_across_field_boundaries() {
        let a = CacheKey::new(Uuid::nil(), "x", &[ObjectId::new("y|z")]);
        let b = CacheKey::new(Uuid::nil(), "x|y", &[ObjectId::new("z")]);
        assert_ne!(a, b);

        let c = CacheKey::new(Uuid::nil(), "c1", &[ObjectId::new("a,b")]);
        let d = CacheKey::new(Uuid::nil(), "c1", &[ObjectId::new("a"), ObjectId::new("b")]);
        assert_ne!(c, d);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_set_before_ttl() {
        let cache = cache(60, 10);
        let key = CacheKey::new(Uuid::nil(), "c1", &[ObjectId::new("s1")]);
        let stored = vec![candidate("p1")];
        cache.set(key.clone(), stored.clone());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get(&key), Some(stored));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_miss_and_evicted() {
        let cache = cache(60, 10);
        let key = CacheKey::new(Uuid::nil(), "c1", &[ObjectId::new("s1")]);
        cache.set(key.clone(), vec![candidate("p1")]);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lru_eviction_on_overflow() {
        let cache = cache(60, 2);
        let k1 = CacheKey::new(Uuid::nil(), "c1", &[]);
        let k2 = CacheKey::new(Uuid::nil(), "c2", &[]);
        let k3 = CacheKey::new(Uuid::nil(), "c3", &[]);

        cache.set(k1.clone(), vec![candidate("p1")]);
        cache.set(k2.clone(), vec![candidate("p2")]);
        // Touch k1 so k2 becomes least recently used.
        assert!(cache.get(&k1).is_some());
        cache.set(k3.clone(), vec![candidate("p3")]);

        assert!(cache.get(&k1).is_some());
        assert!(cache.get(&k2).is_none());
        assert!(cache.get(&k3).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_drops_everything() {
        let cache = cache(60, 10);
        cache.set(CacheKey::new(Uuid::nil(), "c1", &[]), vec![candidate("p1")]);
        cache.set(CacheKey::new(Uuid::nil(), "c2", &[]), vec![candidate("p2")]);
        cache.clear();
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_candidate_skips_expired() {
        let cache = cache(60, 10);
        cache.set(CacheKey::new(Uuid::nil(), "c1", &[]), vec![candidate("p1")]);
        assert!(cache.find_candidate(&ObjectId::new("p1")).is_some());

        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(cache.find_candidate(&ObjectId::new("p1")).is_none());
    }
}
