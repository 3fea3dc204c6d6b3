//! Permission Resolver (§4.2). Authorizes a single (org, user, permission,
//! resource?) tuple via cache → circuit breaker → Authorization Service,
//! with tiered TTL caching of the outcome.

use std::sync::Arc;
use std::time::Duration;

use chat_asclient::AsHttpClient;
use chat_breaker::{CallDecision, CircuitBreaker};
use chat_cache::Cache;
use chat_core::config::CacheConfig;
use chat_identity::ServiceIdentityManager;
use tracing::{info, warn};

/// Where an [`Decision::Allowed`] outcome came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    Cache,
    AuthApi,
    FailOpen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed { source: DecisionSource, cached: bool },
    Denied,
    Unavailable,
}

pub struct PermissionResolver {
    cache: Arc<dyn Cache>,
    breaker: Arc<CircuitBreaker>,
    as_client: Arc<AsHttpClient>,
    identity: Arc<ServiceIdentityManager>,
    cache_config: CacheConfig,
    fail_open: bool,
}

impl PermissionResolver {
    pub fn new(
        cache: Arc<dyn Cache>,
        breaker: Arc<CircuitBreaker>,
        as_client: Arc<AsHttpClient>,
        identity: Arc<ServiceIdentityManager>,
        cache_config: CacheConfig,
        fail_open: bool,
    ) -> Self {
        Self {
            cache,
            breaker,
            as_client,
            identity,
            cache_config,
            fail_open,
        }
    }

    pub async fn check(
        &self,
        org_id: &str,
        user_id: &str,
        permission: &str,
        resource_id: Option<&str>,
    ) -> Decision {
        let key = build_key(org_id, user_id, permission, resource_id);

        if self.cache_config.enabled {
            if let Some(raw) = self.cache.get(&key) {
                return match raw.as_str() {
                    "1" => Decision::Allowed {
                        source: DecisionSource::Cache,
                        cached: true,
                    },
                    _ => Decision::Denied,
                };
            }
        }

        if self.breaker.allow_call() == CallDecision::Blocked {
            return self.fail_policy();
        }

        let service_token = match self.identity.get_service_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "failed to acquire service token for permission check");
                self.breaker.record_failure();
                return self.fail_policy();
            }
        };

        let allowed = match self
            .as_client
            .check_permission(&service_token, org_id, user_id, permission)
            .await
        {
            Ok(resp) => {
                self.breaker.record_success();
                resp.allowed
            }
            Err(e) => {
                warn!(error = %e, org_id, user_id, permission, "Authorization Service call failed");
                self.breaker.record_failure();
                return self.fail_policy();
            }
        };

        if self.cache_config.enabled {
            let ttl = ttl_for(permission, allowed, &self.cache_config);
            self.cache.set(&key, if allowed { "1" } else { "0" }, ttl);
        }

        if allowed {
            Decision::Allowed {
                source: DecisionSource::AuthApi,
                cached: false,
            }
        } else {
            Decision::Denied
        }
    }

    /// Invalidate every cached decision for a user within an org — call this
    /// when an external event signals their permissions changed (§4.2).
    pub fn invalidate_user(&self, org_id: &str, user_id: &str) {
        self.cache
            .invalidate_pattern(&format!("auth:permission:{}:{}:*", org_id, user_id));
    }

    fn fail_policy(&self) -> Decision {
        if self.fail_open {
            info!("Authorization Service unavailable, failing open (degraded decision)");
            Decision::Allowed {
                source: DecisionSource::FailOpen,
                cached: false,
            }
        } else {
            Decision::Unavailable
        }
    }
}

fn build_key(org_id: &str, user_id: &str, permission: &str, resource_id: Option<&str>) -> String {
    match resource_id {
        Some(rid) => format!("auth:permission:{}:{}:{}:{}", org_id, user_id, permission, rid),
        None => format!("auth:permission:{}:{}:{}", org_id, user_id, permission),
    }
}

/// Tiered TTL derived from the permission name and outcome (§4.2 step 4).
fn ttl_for(permission: &str, allowed: bool, cfg: &CacheConfig) -> Duration {
    if !allowed {
        return Duration::from_secs(cfg.ttl_denied_secs);
    }
    if permission.ends_with(":read") {
        Duration::from_secs(cfg.ttl_read_secs)
    } else if permission.ends_with(":create")
        || permission.ends_with(":update")
        || permission.ends_with(":send_message")
        || permission.ends_with(":write")
    {
        Duration::from_secs(cfg.ttl_write_secs)
    } else if permission.ends_with(":delete")
        || permission.ends_with(":manage_members")
        || permission.ends_with(":admin")
    {
        Duration::from_secs(cfg.ttl_admin_secs)
    } else {
        Duration::from_secs(cfg.ttl_write_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_tiers_match_permission_shape() {
        let cfg = CacheConfig {
            enabled: true,
            ttl_read_secs: 300,
            ttl_write_secs: 60,
            ttl_admin_secs: 30,
            ttl_denied_secs: 120,
        };
        assert_eq!(ttl_for("chat:read", true, &cfg), Duration::from_secs(300));
        assert_eq!(ttl_for("chat:write", true, &cfg), Duration::from_secs(60));
        assert_eq!(ttl_for("chat:send_message", true, &cfg), Duration::from_secs(60));
        assert_eq!(ttl_for("chat:admin", true, &cfg), Duration::from_secs(30));
        assert_eq!(ttl_for("chat:delete", true, &cfg), Duration::from_secs(30));
        assert_eq!(ttl_for("chat:unknown_shape", true, &cfg), Duration::from_secs(60));
        assert_eq!(ttl_for("chat:read", false, &cfg), Duration::from_secs(120));
    }

    #[test]
    fn cache_key_includes_resource_id_only_when_present() {
        assert_eq!(
            build_key("o1", "u1", "chat:read", None),
            "auth:permission:o1:u1:chat:read"
        );
        assert_eq!(
            build_key("o1", "u1", "chat:read", Some("c1")),
            "auth:permission:o1:u1:chat:read:c1"
        );
    }
}
