use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};

/// A minimal stand-in for the Authorization Service (§4.9), run as a real
/// HTTP server on a loopback port so `AsHttpClient` exercises an actual
/// network round trip. Every `(org_id, user_id, permission)` triple is
/// allowed by default; tests override specific triples with `deny`/`allow`.
pub struct FakeAs {
    pub base_url: String,
    rules: Arc<DashMap<String, bool>>,
}

#[derive(Deserialize)]
struct CheckBody {
    org_id: String,
    user_id: String,
    permission: String,
}

async fn check_handler(
    State(rules): State<Arc<DashMap<String, bool>>>,
    Json(body): Json<CheckBody>,
) -> Json<Value> {
    let key = format!("{}:{}:{}", body.org_id, body.user_id, body.permission);
    let allowed = rules.get(&key).map(|v| *v).unwrap_or(true);
    Json(json!({ "allowed": allowed }))
}

async fn token_handler() -> Json<Value> {
    Json(json!({ "access_token": "fake-service-token", "expires_in": 3600 }))
}

impl FakeAs {
    pub async fn start() -> Self {
        let rules: Arc<DashMap<String, bool>> = Arc::new(DashMap::new());
        let app = Router::new()
            .route("/authorization/check", post(check_handler))
            .route("/oauth/token", post(token_handler))
            .with_state(rules.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{addr}"),
            rules,
        }
    }

    pub fn deny(&self, org_id: &str, user_id: &str, permission: &str) {
        self.rules.insert(format!("{org_id}:{user_id}:{permission}"), false);
    }

    pub fn allow(&self, org_id: &str, user_id: &str, permission: &str) {
        self.rules.insert(format!("{org_id}:{user_id}:{permission}"), true);
    }
}
