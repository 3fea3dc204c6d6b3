use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chat_auth::Decision;
use chat_core::types::{AuthContext, Message};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::http::error::ApiError;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Deserialize)]
pub struct CreateMessageBody {
    pub content: String,
}

#[derive(Deserialize)]
pub struct UpdateMessageBody {
    pub content: String,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Serialize)]
pub struct ListResponse {
    pub messages: Vec<Message>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
}

pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    Path(cid): Path<String>,
    headers: HeaderMap,
    Json(body): Json<CreateMessageBody>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let ctx = authenticate(&state, &headers)?;
    require_permission(&state, &ctx, "chat:write", Some(&cid)).await?;

    let message = state
        .engine
        .create(&cid, &ctx.org_id, &ctx.user_id, &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    Path(cid): Path<String>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let ctx = authenticate(&state, &headers)?;
    require_permission(&state, &ctx, "chat:read", Some(&cid)).await?;

    let page = q.page.unwrap_or(1);
    let page_size = q.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page < 1 {
        return Err(ApiError::Validation("page must be >= 1".to_string()));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(ApiError::Validation(format!(
            "page_size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }

    let (messages, total) = state.engine.list(&cid, &ctx.org_id, page, page_size)?;
    let has_more = (page as u64) * (page_size as u64) < total;
    Ok(Json(ListResponse {
        messages,
        total,
        page,
        page_size,
        has_more,
    }))
}

pub async fn update_handler(
    State(state): State<Arc<AppState>>,
    Path((cid, mid)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<UpdateMessageBody>,
) -> Result<Json<Message>, ApiError> {
    let ctx = authenticate(&state, &headers)?;
    require_permission(&state, &ctx, "chat:write", Some(&cid)).await?;

    let message = state
        .engine
        .update(&mid, &cid, &ctx.org_id, &ctx.user_id, &body.content)
        .await?;
    Ok(Json(message))
}

pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path((cid, mid)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let ctx = authenticate(&state, &headers)?;
    require_permission(&state, &ctx, "chat:write", Some(&cid)).await?;

    // Auxiliary check (§4.5): failure just means no admin bypass, it does
    // not fail the request the way the primary `chat:write` check does.
    let is_admin = matches!(
        state.resolver.check(&ctx.org_id, &ctx.user_id, "chat:admin", Some(&cid)).await,
        Decision::Allowed { .. }
    );

    state
        .engine
        .delete(&mid, &cid, &ctx.org_id, &ctx.user_id, is_admin)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthContext, ApiError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(chat_auth::ValidationError::Missing)?;
    Ok(chat_auth::validate(token, &state.jwt_secret)?)
}

async fn require_permission(
    state: &AppState,
    ctx: &AuthContext,
    permission: &str,
    resource_id: Option<&str>,
) -> Result<(), ApiError> {
    match state.resolver.check(&ctx.org_id, &ctx.user_id, permission, resource_id).await {
        Decision::Allowed { .. } => Ok(()),
        Decision::Denied => Err(ApiError::PermissionDenied),
        Decision::Unavailable => Err(ApiError::ServiceUnavailable),
    }
}
