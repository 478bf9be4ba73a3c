// Related-topic proposals.
// Implements: keyword matching, recency scoring, ranking, caching, interaction ledger.
// All persistence goes through the store traits; nothing here talks to a backend directly.

pub mod cache;
pub mod generator;
pub mod handlers;
pub mod ledger;
pub mod ranker;
pub mod recency;
pub mod service;
pub mod similarity;

#[cfg(test)]
pub mod test_support;
