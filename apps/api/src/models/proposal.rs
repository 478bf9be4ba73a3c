use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::store::{IdentityFields, ObjectId, ObjectKind};

pub const MAX_PROPOSALS_LIMIT: u32 = 50;
const DEFAULT_RECENCY_WINDOW_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Per-user ranking configuration. Each update is persisted as a new version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProposalConfig {
    pub owner: Uuid,
    pub match_weight: f64,
    pub recency_weight: f64,
    pub recency_window_ms: i64,
    pub min_jaccard: f64,
    pub max_proposals: u32,
    pub updated_at: DateTime<Utc>,
}

impl ProposalConfig {
    pub fn default_for(owner: Uuid) -> Self {
        Self {
            owner,
            match_weight: 0.7,
            recency_weight: 0.3,
            recency_window_ms: DEFAULT_RECENCY_WINDOW_MS,
            min_jaccard: 0.2,
            max_proposals: 10,
            updated_at: Utc::now(),
        }
    }

    pub fn identity(owner: Uuid) -> IdentityFields {
        IdentityFields::new(ObjectKind::ProposalConfig).text("owner", owner.to_string())
    }

    /// Applies a partial update. Rejects the whole patch if any field is out of bounds.
    pub fn merge(&self, patch: &ProposalConfigPatch, now: DateTime<Utc>) -> Result<Self, AppError> {
        let merged = Self {
            owner: self.owner,
            match_weight: patch.match_weight.unwrap_or(self.match_weight),
            recency_weight: patch.recency_weight.unwrap_or(self.recency_weight),
            recency_window_ms: patch.recency_window_ms.unwrap_or(self.recency_window_ms),
            min_jaccard: patch.min_jaccard.unwrap_or(self.min_jaccard),
            max_proposals: patch.max_proposals.unwrap_or(self.max_proposals),
            updated_at: now,
        };
        merged.validate()?;
        Ok(merged)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        for (name, value) in [
            ("match_weight", self.match_weight),
            ("recency_weight", self.recency_weight),
            ("min_jaccard", self.min_jaccard),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AppError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.recency_window_ms <= 0 {
            return Err(AppError::InvalidConfig(format!(
                "recency_window_ms must be positive, got {}",
                self.recency_window_ms
            )));
        }
        if !(1..=MAX_PROPOSALS_LIMIT).contains(&self.max_proposals) {
            return Err(AppError::InvalidConfig(format!(
                "max_proposals must be within [1, {MAX_PROPOSALS_LIMIT}], got {}",
                self.max_proposals
            )));
        }
        Ok(())
    }
}

/// Partial config update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalConfigPatch {
    pub match_weight: Option<f64>,
    pub recency_weight: Option<f64>,
    pub recency_window_ms: Option<i64>,
    pub min_jaccard: Option<f64>,
    pub max_proposals: Option<u32>,
}

/// Request-scoped proposal produced by generation and ranking. Never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub proposal_id: ObjectId,
    pub past_subject_id: ObjectId,
    pub source_conversation_id: String,
    pub past_subject_name: String,
    pub description: Option<String>,
    pub matched_keywords: Vec<String>,
    pub jaccard_score: f64,
    pub recency_score: f64,
    /// Zero until the ranker has scored the candidate.
    pub relevance_score: f64,
    pub subject_created_at: DateTime<Utc>,
}

/// Persisted reference to a proposal, written only when an interaction points at it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalRef {
    pub conversation_id: String,
    pub past_subject_id: ObjectId,
    pub current_subject_id: Option<ObjectId>,
    pub matched_keywords: Vec<String>,
    pub relevance_score: f64,
    pub source_conversation_id: String,
    pub past_subject_name: String,
    pub created_at: DateTime<Utc>,
}

impl ProposalRef {
    pub fn identity(
        conversation_id: &str,
        past_subject_id: &ObjectId,
        current_subject_id: Option<&ObjectId>,
    ) -> IdentityFields {
        IdentityFields::new(ObjectKind::Proposal)
            .text("conversation_id", conversation_id)
            .text("past_subject_id", past_subject_id.as_str())
            .optional_text("current_subject_id", current_subject_id.map(ObjectId::as_str))
    }

    pub fn from_candidate(conversation_id: &str, candidate: &Candidate, now: DateTime<Utc>) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            past_subject_id: candidate.past_subject_id.clone(),
            current_subject_id: None,
            matched_keywords: candidate.matched_keywords.clone(),
            relevance_score: candidate.relevance_score,
            source_conversation_id: candidate.source_conversation_id.clone(),
            past_subject_name: candidate.past_subject_name.clone(),
            created_at: now,
        }
    }

    pub fn identity_fields(&self) -> IdentityFields {
        Self::identity(
            &self.conversation_id,
            &self.past_subject_id,
            self.current_subject_id.as_ref(),
        )
    }
}
