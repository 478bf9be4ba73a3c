use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::proposal::ProposalConfigPatch;
use crate::proposals::service::{
    ConfigUpdate, ConfigView, DismissOutcome, ShareOutcome, TopicProposals, ViewOutcome,
};
use crate::state::AppState;
use crate::store::ObjectId;

#[derive(Deserialize)]
pub struct TopicQuery {
    pub user_id: Uuid,
    pub conversation_id: String,
    /// Comma-separated subject ids. Resolved from the conversation when absent.
    pub subject_ids: Option<String>,
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct ConfigUpdateRequest {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub patch: ProposalConfigPatch,
}

#[derive(Deserialize)]
pub struct InteractionRequest {
    pub user_id: Uuid,
    pub conversation_id: String,
    pub past_subject_id: ObjectId,
}

#[derive(Deserialize)]
pub struct ShareRequest {
    pub user_id: Uuid,
    pub conversation_id: String,
    pub past_subject_id: ObjectId,
    #[serde(default)]
    pub include_messages: bool,
}

#[derive(Deserialize)]
pub struct ViewRequest {
    pub user_id: Uuid,
    pub conversation_id: String,
}

/// GET /api/v1/proposals
pub async fn handle_get_proposals(
    State(state): State<AppState>,
    Query(params): Query<TopicQuery>,
) -> Result<Json<TopicProposals>, AppError> {
    let subject_ids = params
        .subject_ids
        .as_deref()
        .map(parse_subject_ids)
        .filter(|ids| !ids.is_empty());
    let result = state
        .proposals
        .get_for_topic(
            params.user_id,
            &params.conversation_id,
            subject_ids,
            params.force_refresh,
        )
        .await?;
    Ok(Json(result))
}

/// GET /api/v1/proposals/config
pub async fn handle_get_config(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<ConfigView>, AppError> {
    Ok(Json(state.proposals.get_config(params.user_id).await?))
}

/// PATCH /api/v1/proposals/config
pub async fn handle_update_config(
    State(state): State<AppState>,
    Json(req): Json<ConfigUpdateRequest>,
) -> Result<Json<ConfigUpdate>, AppError> {
    let update = state
        .proposals
        .update_config(req.user_id, &req.patch)
        .await?;
    Ok(Json(update))
}

/// POST /api/v1/proposals/:proposal_id/dismiss
pub async fn handle_dismiss(
    State(state): State<AppState>,
    Path(proposal_id): Path<String>,
    Json(req): Json<InteractionRequest>,
) -> Result<Json<DismissOutcome>, AppError> {
    let outcome = state
        .proposals
        .dismiss(
            req.user_id,
            &ObjectId::new(proposal_id),
            &req.conversation_id,
            &req.past_subject_id,
        )
        .await?;
    Ok(Json(outcome))
}

/// POST /api/v1/proposals/:proposal_id/share
pub async fn handle_share(
    State(state): State<AppState>,
    Path(proposal_id): Path<String>,
    Json(req): Json<ShareRequest>,
) -> Result<Json<ShareOutcome>, AppError> {
    let outcome = state
        .proposals
        .share(
            req.user_id,
            &ObjectId::new(proposal_id),
            &req.conversation_id,
            &req.past_subject_id,
            req.include_messages,
        )
        .await?;
    Ok(Json(outcome))
}

/// POST /api/v1/proposals/:proposal_id/view
pub async fn handle_view(
    State(state): State<AppState>,
    Path(proposal_id): Path<String>,
    Json(req): Json<ViewRequest>,
) -> Result<Json<ViewOutcome>, AppError> {
    let outcome = state
        .proposals
        .view(req.user_id, &ObjectId::new(proposal_id), &req.conversation_id)
        .await?;
    Ok(Json(outcome))
}

fn parse_subject_ids(raw: &str) -> Vec<ObjectId> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ObjectId::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subject_ids_trims_and_skips_blanks() {
        let ids = parse_subject_ids(" a, ,b,");
        assert_eq!(ids, vec![ObjectId::new("a"), ObjectId::new("b")]);
    }

    #[test]
    fn test_parse_subject_ids_empty() {
        assert!(parse_subject_ids("").is_empty());
    }

    #[test]
    fn test_config_update_request_flattens_patch() {
        let req: ConfigUpdateRequest = serde_json::from_value(serde_json::json!({
            "user_id": Uuid::nil(),
            "max_proposals": 3
        }))
        .unwrap();
        assert_eq!(req.patch.max_proposals, Some(3));
        assert!(req.patch.match_weight.is_none());
    }
}
