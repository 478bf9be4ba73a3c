//! Composite scoring and deterministic ordering of candidates.

use std::cmp::Ordering;

use crate::models::proposal::{Candidate, ProposalConfig};

/// `match_weight * jaccard + recency_weight * recency`
pub fn relevance_score(jaccard_score: f64, recency_score: f64, config: &ProposalConfig) -> f64 {
    config.match_weight * jaccard_score + config.recency_weight * recency_score
}

/// Scores, sorts and truncates. The whole pool is sorted before truncation so
/// the cut always keeps the global top `max_proposals`.
///
/// Order: relevance desc, then recency desc, then past subject id asc.
pub fn rank(mut candidates: Vec<Candidate>, config: &ProposalConfig) -> Vec<Candidate> {
    for candidate in &mut candidates {
        candidate.relevance_score =
            relevance_score(candidate.jaccard_score, candidate.recency_score, config);
    }

    candidates.sort_by(compare);
    candidates.truncate(config.max_proposals as usize);
    candidates
}

fn compare(a: &Candidate, b: &Candidate) -> Ordering {
    b.relevance_score
        .total_cmp(&a.relevance_score)
        .then_with(|| b.recency_score.total_cmp(&a.recency_score))
        .then_with(|| a.past_subject_id.cmp(&b.past_subject_id))
}
