use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Immutable, per-request identity derived from a verified bearer token (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    pub org_id: String,
    #[serde(default)]
    pub scopes: HashSet<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub issued_at: Option<i64>,
    pub expires_at: Option<i64>,
}

impl AuthContext {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}

/// A persisted message (§3). `org_id`, `conversation_id`, `sender_id` are
/// immutable after insertion; only `content`/`updated_at`/`is_deleted` change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub org_id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
    pub is_deleted: bool,
}
