use std::sync::Arc;

use crate::config::Config;
use crate::proposals::service::ProposalService;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    #[allow(dead_code)]
    pub config: Config,
    /// One service instance per process; owns the proposal cache and session set.
    pub proposals: Arc<ProposalService>,
}
