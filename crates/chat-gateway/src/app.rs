use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, put},
    Router,
};
use chat_asclient::AsHttpClient;
use chat_auth::PermissionResolver;
use chat_breaker::{BreakerConfig, CircuitBreaker};
use chat_cache::{Cache, InMemoryCache};
use chat_core::config::AppConfig;
use chat_engine::MessageEngine;
use chat_hub::SocketHub;
use chat_identity::ServiceIdentityManager;
use chat_store::{db::init_db, MessageStore};
use rusqlite::Connection;

/// Shared state handed to every Axum handler as `Arc<AppState>`.
pub struct AppState {
    pub config: AppConfig,
    pub jwt_secret: Vec<u8>,
    pub resolver: PermissionResolver,
    pub breaker: Arc<CircuitBreaker>,
    pub engine: MessageEngine,
    pub hub: Arc<SocketHub>,
}

impl AppState {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let jwt_secret = config.jwt.secret_key.clone().into_bytes();

        let as_client = Arc::new(AsHttpClient::new(config.auth_api.url.clone()));
        let identity = Arc::new(ServiceIdentityManager::new(
            as_client.clone(),
            config.service_identity.token_url.clone(),
            config.service_identity.client_id.clone(),
            config.service_identity.client_secret.clone(),
            config.service_identity.scope.clone(),
        ));
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let breaker = Arc::new(CircuitBreaker::new(
            cache.clone(),
            BreakerConfig {
                threshold: config.circuit_breaker.threshold,
                cool_down: Duration::from_secs(config.circuit_breaker.cool_down_secs),
                half_open_max_calls: config.circuit_breaker.half_open_max_calls,
            },
        ));
        let resolver = PermissionResolver::new(
            cache,
            breaker.clone(),
            as_client,
            identity,
            config.cache.clone(),
            config.auth.fail_open,
        );

        if let Some(parent) = Path::new(&config.store.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&config.store.path)?;
        init_db(&conn)?;
        let store = Arc::new(MessageStore::new(conn));
        let hub = Arc::new(SocketHub::new());
        let engine = MessageEngine::new(store, hub.clone());

        Ok(Self {
            config,
            jwt_secret,
            resolver,
            breaker,
            engine,
            hub,
        })
    }
}

/// Assemble the full Axum router. Chat routes are mounted under the
/// configured path prefix (§6); paths listed in `gateway.public_paths`
/// bypass the Token Validator entirely.
pub fn build_router(state: Arc<AppState>) -> Router {
    let prefix = state.config.gateway.prefix.trim_matches('/').to_string();
    let messages_path = format!("/{prefix}/conversations/{{cid}}/messages");
    let message_path = format!("/{prefix}/conversations/{{cid}}/messages/{{mid}}");
    let ws_path = format!("/{prefix}/ws/{{conversation_id}}");

    // The WebSocket route authenticates via a query-string token, not a
    // bearer header (§4.6), so it is wired up outside this gate.
    let rest_routes = Router::new()
        .route(
            &messages_path,
            get(crate::http::messages::list_handler).post(crate::http::messages::create_handler),
        )
        .route(
            &message_path,
            put(crate::http::messages::update_handler).delete(crate::http::messages::delete_handler),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), reject_missing_bearer));

    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .merge(rest_routes)
        .route(&ws_path, get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Enforces the `gateway.public_paths` allow-list (§4.1) ahead of every
/// REST handler: requests to a public path pass straight through, everything
/// else must carry a bearer token before the handler's own authentication
/// runs. Does not itself validate the token — that stays in each handler.
async fn reject_missing_bearer(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let path = request.uri().path();
    if chat_auth::public_path::is_public_path(path, &state.config.gateway.public_paths) {
        return next.run(request).await;
    }
    let has_bearer = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer "));
    if !has_bearer {
        return crate::http::error::ApiError::AuthFailure(chat_auth::ValidationError::Missing).into_response();
    }
    next.run(request).await
}
