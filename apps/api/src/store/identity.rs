//! Content-addressed identity.
//!
//! An object's id is a SHA-256 digest over a canonical JSON encoding of the
//! fields that define it. Keys are sorted (serde_json's default map is a
//! BTreeMap) and set-valued fields are sorted and deduplicated before hashing,
//! so the same logical object always resolves to the same id.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 object identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Subject,
    Keyword,
    ProposalConfig,
    Proposal,
    InteractionRecord,
    InteractionResponse,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Subject => "subject",
            ObjectKind::Keyword => "keyword",
            ObjectKind::ProposalConfig => "proposal_config",
            ObjectKind::Proposal => "proposal",
            ObjectKind::InteractionRecord => "interaction_record",
            ObjectKind::InteractionResponse => "interaction_response",
        }
    }
}

/// The subset of an object's fields that determines its id.
#[derive(Debug, Clone)]
pub struct IdentityFields {
    kind: ObjectKind,
    fields: Map<String, Value>,
}

impl IdentityFields {
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            fields: Map::new(),
        }
    }

    pub fn text(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields
            .insert(key.to_string(), Value::String(value.into()));
        self
    }

    /// Absent values are omitted entirely, so `None` and a missing field hash the same.
    pub fn optional_text(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.text(key, v),
            None => self,
        }
    }

    pub fn set<I, S>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sorted: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        self.fields.insert(
            key.to_string(),
            Value::Array(sorted.into_iter().map(Value::String).collect()),
        );
        self
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Stable byte encoding hashed into the object id.
    pub fn canonical(&self) -> String {
        let mut root = Map::new();
        root.insert("fields".to_string(), Value::Object(self.fields.clone()));
        root.insert(
            "kind".to_string(),
            Value::String(self.kind.as_str().to_string()),
        );
        Value::Object(root).to_string()
    }

    pub fn object_id(&self) -> ObjectId {
        deterministic_id(self)
    }
}

pub fn deterministic_id(identity: &IdentityFields) -> ObjectId {
    let mut hasher = Sha256::new();
    hasher.update(identity.canonical().as_bytes());
    ObjectId(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_fields_same_id() {
        let a = IdentityFields::new(ObjectKind::InteractionRecord)
            .text("user_id", "u1")
            .text("target_id", "p1")
            .text("action", "dismiss");
        let b = IdentityFields::new(ObjectKind::InteractionRecord)
            .text("action", "dismiss")
            .text("target_id", "p1")
            .text("user_id", "u1");
        assert_eq!(a.object_id(), b.object_id());
    }

    #[test]
    fn test_set_order_does_not_matter() {
        let a = IdentityFields::new(ObjectKind::Subject).set("keywords", ["oven", "pizza"]);
        let b = IdentityFields::new(ObjectKind::Subject).set("keywords", ["pizza", "oven", "pizza"]);
        assert_eq!(a.object_id(), b.object_id());
    }

    #[test]
    fn test_kind_is_part_of_identity() {
        let a = IdentityFields::new(ObjectKind::Proposal).text("x", "1");
        let b = IdentityFields::new(ObjectKind::Keyword).text("x", "1");
        assert_ne!(a.object_id(), b.object_id());
    }

    #[test]
    fn test_none_is_omitted() {
        let a = IdentityFields::new(ObjectKind::Proposal)
            .text("conversation_id", "c1")
            .optional_text("current_subject_id", None);
        let b = IdentityFields::new(ObjectKind::Proposal).text("conversation_id", "c1");
        assert_eq!(a.object_id(), b.object_id());
    }

    #[test]
    fn test_id_is_sha256_hex() {
        let id = IdentityFields::new(ObjectKind::Keyword)
            .text("term", "pizza")
            .object_id();
        assert_eq!(id.as_str().len(), 64);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
