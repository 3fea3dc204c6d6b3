use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct CheckRequest<'a> {
    pub org_id: &'a str,
    pub user_id: &'a str,
    pub permission: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckResponse {
    pub allowed: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub groups: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckGroupRequest<'a> {
    pub org_id: &'a str,
    pub user_id: &'a str,
    pub group_id: &'a str,
    pub permission: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckGroupResponse {
    pub allowed: bool,
}

/// Conversation metadata, used only on the socket upgrade path (§4.9).
#[derive(Debug, Clone, Deserialize)]
pub struct GroupInfo {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub organization_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupMember {
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
}
