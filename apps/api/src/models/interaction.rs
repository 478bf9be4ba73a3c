use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::store::{IdentityFields, ObjectId, ObjectKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionAction {
    View,
    Dismiss,
    Share,
}

impl InteractionAction {
    pub const ALL: [InteractionAction; 3] = [
        InteractionAction::View,
        InteractionAction::Dismiss,
        InteractionAction::Share,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionAction::View => "view",
            InteractionAction::Dismiss => "dismiss",
            InteractionAction::Share => "share",
        }
    }

    /// Dismissed and shared proposals are not offered again.
    pub fn hides_proposal(&self) -> bool {
        matches!(self, InteractionAction::Dismiss | InteractionAction::Share)
    }
}

/// A user's reaction to a proposal. The id is fully determined by
/// `(user_id, target_id, action)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub user_id: Uuid,
    pub target_id: ObjectId,
    pub action: InteractionAction,
    pub conversation_id: String,
    pub created_at: DateTime<Utc>,
}

impl InteractionRecord {
    pub fn identity(user_id: Uuid, target_id: &ObjectId, action: InteractionAction) -> IdentityFields {
        IdentityFields::new(ObjectKind::InteractionRecord)
            .text("user_id", user_id.to_string())
            .text("target_id", target_id.as_str())
            .text("action", action.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionResponse {
    pub record_id: ObjectId,
    pub success: bool,
    pub executed_at: DateTime<Utc>,
    pub metadata: Option<Value>,
}

impl InteractionResponse {
    pub fn identity(record_id: &ObjectId) -> IdentityFields {
        IdentityFields::new(ObjectKind::InteractionResponse).text("record_id", record_id.as_str())
    }
}

/// Outcome of an "already acted on?" lookup. `Unknown` means the store could
/// not be reached; callers treat it as not yet performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Performed,
    NotPerformed,
    Unknown,
}

impl ActionStatus {
    pub fn is_performed(&self) -> bool {
        matches!(self, ActionStatus::Performed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_identity_is_deterministic() {
        let user = Uuid::new_v4();
        let target = ObjectId::new("p1");
        let a = InteractionRecord::identity(user, &target, InteractionAction::Dismiss);
        let b = InteractionRecord::identity(user, &target, InteractionAction::Dismiss);
        assert_eq!(a.object_id(), b.object_id());
    }

    #[test]
    fn test_action_changes_identity() {
        let user = Uuid::new_v4();
        let target = ObjectId::new("p1");
        assert_ne!(
            InteractionRecord::identity(user, &target, InteractionAction::Dismiss).object_id(),
            InteractionRecord::identity(user, &target, InteractionAction::Share).object_id()
        );
    }

    #[test]
    fn test_unknown_is_not_performed() {
        assert!(!ActionStatus::Unknown.is_performed());
        assert!(ActionStatus::Performed.is_performed());
    }

    #[test]
    fn test_view_does_not_hide() {
        assert!(!InteractionAction::View.hides_proposal());
        assert!(InteractionAction::Dismiss.hides_proposal());
    }
}
