//! Circuit Breaker protecting the Authorization Service (§4.3).
//!
//! States: `closed` (pass-through) → `open` (block) → `half-open` (probe).
//! Persisted in the shared [`Cache`] under a fixed key so horizontally
//! scaled replicas converge; absence of a shared cache (or a cache miss)
//! degrades the breaker to per-process state, which is always kept locally
//! regardless.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chat_cache::Cache;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const BREAKER_CACHE_KEY: &str = "circuit:auth_api:state";
/// Persisted snapshots outlive any single TTL tier; a long TTL just bounds
/// how stale an abandoned key can get.
const BREAKER_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub threshold: u32,
    pub cool_down: Duration,
    pub half_open_max_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            cool_down: Duration::from_secs(30),
            half_open_max_calls: 3,
        }
    }
}

/// What the caller should do for this attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDecision {
    Proceed,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    state: CircuitState,
    failure_count: u32,
    last_failure_epoch_ms: Option<i64>,
}

struct LocalState {
    snapshot: Snapshot,
    half_open_inflight: u32,
}

#[derive(Default)]
struct Metrics {
    closed_to_open: AtomicU64,
    open_to_half_open: AtomicU64,
    half_open_to_closed: AtomicU64,
    half_open_to_open: AtomicU64,
}

pub struct CircuitBreaker {
    cache: Arc<dyn Cache>,
    config: BreakerConfig,
    local: Mutex<LocalState>,
    metrics: Metrics,
}

/// Read-only view of breaker state for diagnostics and tests.
#[derive(Debug, Clone, Copy)]
pub struct BreakerStatus {
    pub state: CircuitState,
    pub failure_count: u32,
}

impl CircuitBreaker {
    pub fn new(cache: Arc<dyn Cache>, config: BreakerConfig) -> Self {
        Self {
            cache,
            config,
            local: Mutex::new(LocalState {
                snapshot: Snapshot {
                    state: CircuitState::Closed,
                    failure_count: 0,
                    last_failure_epoch_ms: None,
                },
                half_open_inflight: 0,
            }),
            metrics: Metrics::default(),
        }
    }

    /// Ask whether a call to the AS should proceed right now. Drives the
    /// `open` → `half-open` transition when the cool-down has elapsed.
    pub fn allow_call(&self) -> CallDecision {
        let mut local = self.local.lock().unwrap();
        self.sync_from_cache(&mut local);

        match local.snapshot.state {
            CircuitState::Closed => CallDecision::Proceed,
            CircuitState::Open => {
                let elapsed_ok = local
                    .snapshot
                    .last_failure_epoch_ms
                    .map(|last| Utc::now().timestamp_millis() - last >= self.config.cool_down.as_millis() as i64)
                    .unwrap_or(true);
                if elapsed_ok {
                    self.transition_to_half_open(&mut local);
                    local.half_open_inflight += 1;
                    self.persist(&local.snapshot);
                    CallDecision::Proceed
                } else {
                    CallDecision::Blocked
                }
            }
            CircuitState::HalfOpen => {
                if local.half_open_inflight < self.config.half_open_max_calls {
                    local.half_open_inflight += 1;
                    CallDecision::Proceed
                } else {
                    CallDecision::Blocked
                }
            }
        }
    }

    /// Record a successful AS call.
    pub fn record_success(&self) {
        let mut local = self.local.lock().unwrap();
        self.sync_from_cache(&mut local);

        match local.snapshot.state {
            CircuitState::Closed => {
                local.snapshot.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                local.half_open_inflight = local.half_open_inflight.saturating_sub(1);
                local.snapshot.state = CircuitState::Closed;
                local.snapshot.failure_count = 0;
                local.snapshot.last_failure_epoch_ms = None;
                self.metrics.half_open_to_closed.fetch_add(1, Ordering::Relaxed);
                info!("circuit breaker closed after successful probe");
            }
            CircuitState::Open => {}
        }
        self.persist(&local.snapshot);
    }

    /// Record a failed AS call (non-2xx, connection error, or timeout).
    pub fn record_failure(&self) {
        let mut local = self.local.lock().unwrap();
        self.sync_from_cache(&mut local);

        let now_ms = Utc::now().timestamp_millis();
        match local.snapshot.state {
            CircuitState::Closed => {
                local.snapshot.failure_count += 1;
                local.snapshot.last_failure_epoch_ms = Some(now_ms);
                if local.snapshot.failure_count >= self.config.threshold {
                    local.snapshot.state = CircuitState::Open;
                    self.metrics.closed_to_open.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        failures = local.snapshot.failure_count,
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                local.half_open_inflight = local.half_open_inflight.saturating_sub(1);
                local.snapshot.state = CircuitState::Open;
                local.snapshot.last_failure_epoch_ms = Some(now_ms);
                self.metrics.half_open_to_open.fetch_add(1, Ordering::Relaxed);
                warn!("circuit breaker re-opened after failed probe");
            }
            CircuitState::Open => {
                local.snapshot.last_failure_epoch_ms = Some(now_ms);
            }
        }
        self.persist(&local.snapshot);
    }

    pub fn status(&self) -> BreakerStatus {
        let mut local = self.local.lock().unwrap();
        self.sync_from_cache(&mut local);
        BreakerStatus {
            state: local.snapshot.state,
            failure_count: local.snapshot.failure_count,
        }
    }

    fn transition_to_half_open(&self, local: &mut LocalState) {
        local.snapshot.state = CircuitState::HalfOpen;
        local.half_open_inflight = 0;
        self.metrics.open_to_half_open.fetch_add(1, Ordering::Relaxed);
        info!("circuit breaker half-open, probing");
    }

    /// Pull the latest persisted snapshot so other replicas' transitions are
    /// observed; a cache miss (degraded or not shared) just keeps the local
    /// state as the source of truth.
    fn sync_from_cache(&self, local: &mut LocalState) {
        if let Some(raw) = self.cache.get(BREAKER_CACHE_KEY) {
            if let Ok(remote) = serde_json::from_str::<Snapshot>(&raw) {
                local.snapshot = remote;
            }
        }
    }

    fn persist(&self, snapshot: &Snapshot) {
        if let Ok(raw) = serde_json::to_string(snapshot) {
            self.cache.set(BREAKER_CACHE_KEY, &raw, BREAKER_CACHE_TTL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_cache::InMemoryCache;

    fn breaker(threshold: u32, cool_down: Duration, probes: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            Arc::new(InMemoryCache::new()),
            BreakerConfig {
                threshold,
                cool_down,
                half_open_max_calls: probes,
            },
        )
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let cb = breaker(3, Duration::from_secs(30), 1);
        for _ in 0..2 {
            assert_eq!(cb.allow_call(), CallDecision::Proceed);
            cb.record_failure();
        }
        assert_eq!(cb.status().state, CircuitState::Closed);
        assert_eq!(cb.allow_call(), CallDecision::Proceed);
        cb.record_failure();
        assert_eq!(cb.status().state, CircuitState::Open);
        assert_eq!(cb.allow_call(), CallDecision::Blocked);
    }

    #[test]
    fn half_open_probe_then_close_on_success() {
        let cb = breaker(1, Duration::from_millis(20), 1);
        assert_eq!(cb.allow_call(), CallDecision::Proceed);
        cb.record_failure();
        assert_eq!(cb.status().state, CircuitState::Open);
        assert_eq!(cb.allow_call(), CallDecision::Blocked);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cb.allow_call(), CallDecision::Proceed);
        assert_eq!(cb.status().state, CircuitState::HalfOpen);
        // probe budget exhausted
        assert_eq!(cb.allow_call(), CallDecision::Blocked);

        cb.record_success();
        assert_eq!(cb.status().state, CircuitState::Closed);
        assert_eq!(cb.status().failure_count, 0);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = breaker(1, Duration::from_millis(10), 2);
        cb.allow_call();
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(cb.allow_call(), CallDecision::Proceed);
        cb.record_failure();
        assert_eq!(cb.status().state, CircuitState::Open);
    }

    #[test]
    fn success_in_closed_state_resets_counter() {
        let cb = breaker(3, Duration::from_secs(30), 1);
        cb.allow_call();
        cb.record_failure();
        cb.allow_call();
        cb.record_success();
        assert_eq!(cb.status().failure_count, 0);
    }
}
