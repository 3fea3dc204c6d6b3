use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "0.0.0.0";
/// HS256 secrets shorter than this are rejected at startup — see §4.1.
pub const MIN_JWT_SECRET_BYTES: usize = 32;

/// Top-level config (chat.toml + CHAT_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    pub jwt: JwtConfig,
    pub auth_api: AuthApiConfig,
    pub service_identity: ServiceIdentityConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub auth: AuthPolicyConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Path prefix under which the chat routes are mounted (e.g. "api/v1").
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Path prefixes that bypass the Token Validator entirely (health, docs, …).
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            prefix: default_prefix(),
            public_paths: default_public_paths(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret_key: String,
    #[serde(default = "default_jwt_algorithm")]
    pub algorithm: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthApiConfig {
    pub url: String,
    #[serde(default = "default_auth_api_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceIdentityConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    #[serde(default = "default_service_scope")]
    pub scope: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_ttl_read")]
    pub ttl_read_secs: u64,
    #[serde(default = "default_ttl_write")]
    pub ttl_write_secs: u64,
    #[serde(default = "default_ttl_admin")]
    pub ttl_admin_secs: u64,
    #[serde(default = "default_ttl_denied")]
    pub ttl_denied_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_read_secs: default_ttl_read(),
            ttl_write_secs: default_ttl_write(),
            ttl_admin_secs: default_ttl_admin(),
            ttl_denied_secs: default_ttl_denied(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_cb_threshold")]
    pub threshold: u32,
    #[serde(default = "default_cb_cool_down")]
    pub cool_down_secs: u64,
    #[serde(default = "default_cb_half_open_max_calls")]
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: default_cb_threshold(),
            cool_down_secs: default_cb_cool_down(),
            half_open_max_calls: default_cb_half_open_max_calls(),
        }
    }
}

/// The resolver's behavior when the AS is unreachable. Fail-closed is the
/// production default; fail-open is a debug-time escape hatch only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthPolicyConfig {
    #[serde(default)]
    pub fail_open: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_prefix() -> String {
    "api/v1".to_string()
}
fn default_public_paths() -> Vec<String> {
    vec!["/health".to_string()]
}
fn default_jwt_algorithm() -> String {
    "HS256".to_string()
}
fn default_auth_api_timeout() -> u64 {
    10
}
fn default_service_scope() -> String {
    "service".to_string()
}
fn default_ttl_read() -> u64 {
    300
}
fn default_ttl_write() -> u64 {
    60
}
fn default_ttl_admin() -> u64 {
    30
}
fn default_ttl_denied() -> u64 {
    120
}
fn default_cb_threshold() -> u32 {
    5
}
fn default_cb_cool_down() -> u64 {
    30
}
fn default_cb_half_open_max_calls() -> u32 {
    3
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.chat-backend/messages.db", home)
}
fn bool_true() -> bool {
    true
}

impl AppConfig {
    /// Load config from a TOML file with CHAT_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. CHAT_CONFIG env var
    ///   3. ./chat.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("CHAT_CONFIG").ok())
            .unwrap_or_else(|| "chat.toml".to_string());

        let config: AppConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CHAT_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Startup-time invariant checks. Misconfiguration must fail the process,
    /// not a random request mid-flight.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.jwt.secret_key.len() < MIN_JWT_SECRET_BYTES {
            return Err(crate::error::CoreError::Config(format!(
                "jwt.secret_key must be at least {} bytes, got {}",
                MIN_JWT_SECRET_BYTES,
                self.jwt.secret_key.len()
            )));
        }
        Ok(())
    }
}
