//! Keyword-set overlap between the current conversation and a past subject.

use std::collections::BTreeSet;

use crate::models::subject::Keyword;

pub fn normalize_terms<I, S>(terms: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    terms
        .into_iter()
        .map(|t| Keyword::normalize(t.as_ref()))
        .filter(|t| !t.is_empty())
        .collect()
}

/// `|a ∩ b| / |a ∪ b|` over normalized terms.
///
/// Two empty sets score 0, not 1: no evidence is no match.
pub fn jaccard<A, B, S, T>(a: A, b: B) -> f64
where
    A: IntoIterator<Item = S>,
    B: IntoIterator<Item = T>,
    S: AsRef<str>,
    T: AsRef<str>,
{
    let a = normalize_terms(a);
    let b = normalize_terms(b);
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(&b).count();
    intersection as f64 / union as f64
}

/// Sorted intersection, used for display and for the persisted proposal reference.
pub fn matched_keywords<A, B, S, T>(a: A, b: B) -> Vec<String>
where
    A: IntoIterator<Item = S>,
    B: IntoIterator<Item = T>,
    S: AsRef<str>,
    T: AsRef<str>,
{
    let a = normalize_terms(a);
    let b = normalize_terms(b);
    a.intersection(&b).cloned().collect()
}
