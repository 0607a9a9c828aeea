//! Per-client request rate limiting.
//!
//! [`RateLimiter`] is the seam the chat handler depends on; the default
//! [`FixedWindowLimiter`] keeps its table in process memory, so limits reset on
//! restart and are not shared between instances. Deployments running more than
//! one proxy instance should implement [`RateLimiter`] over a shared counter
//! store instead.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

/// How often expired windows are swept out of the table.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Decides whether a client may issue another request.
#[async_trait]
pub trait RateLimiter: Send + Sync + 'static {
    /// Record one request from `client_key`; returns `false` if it must be rejected.
    async fn allow(&self, client_key: &str) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct WindowRecord {
    count: u32,
    reset_at: Instant,
}

#[derive(Debug)]
struct LimiterState {
    records: HashMap<String, WindowRecord>,
    last_sweep: Instant,
}

/// Fixed-window counter: `capacity` requests per key per `window`.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    capacity: u32,
    window: Duration,
    max_keys: usize,
    sweep_interval: Duration,
    state: Mutex<LimiterState>,
}

impl FixedWindowLimiter {
    pub fn new(capacity: u32, window: Duration, max_keys: usize) -> Self {
        Self {
            capacity,
            window,
            max_keys: max_keys.max(1),
            sweep_interval: SWEEP_INTERVAL.min(window.max(Duration::from_secs(1))),
            state: Mutex::new(LimiterState {
                records: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Check-and-increment for `client_key` as of `now`.
    pub fn check_at(&self, client_key: &str, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());

        if now.saturating_duration_since(state.last_sweep) >= self.sweep_interval {
            state.records.retain(|_, r| now <= r.reset_at);
            state.last_sweep = now;
        }

        if let Some(record) = state.records.get_mut(client_key) {
            if now <= record.reset_at {
                if record.count >= self.capacity {
                    return false;
                }
                record.count += 1;
                return true;
            }
            // Window elapsed: start over below.
        } else if state.records.len() >= self.max_keys {
            state.records.retain(|_, r| now <= r.reset_at);
            state.last_sweep = now;
            if state.records.len() >= self.max_keys {
                evict_soonest(&mut state.records);
            }
        }

        let allowed = self.capacity > 0;
        state.records.insert(
            client_key.to_owned(),
            WindowRecord {
                count: u32::from(allowed),
                reset_at: now + self.window,
            },
        );
        allowed
    }

    /// Number of client keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.records.len())
            .unwrap_or_else(|err| err.into_inner().records.len())
    }
}

fn evict_soonest(records: &mut HashMap<String, WindowRecord>) {
    let victim = records
        .iter()
        .min_by_key(|(_, r)| r.reset_at)
        .map(|(k, _)| k.clone());
    if let Some(key) = victim {
        debug!(client = %key, "rate-limit table full; evicting oldest window");
        records.remove(&key);
    }
}

#[async_trait]
impl RateLimiter for FixedWindowLimiter {
    async fn allow(&self, client_key: &str) -> bool {
        self.check_at(client_key, Instant::now())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn limiter() -> FixedWindowLimiter {
        FixedWindowLimiter::new(30, Duration::from_secs(60), 1_000)
    }

    #[test]
    fn thirtieth_allowed_thirty_first_rejected() {
        let rl = limiter();
        let t0 = Instant::now();
        for i in 1..=30 {
            assert!(rl.check_at("1.2.3.4", t0), "request {i} should pass");
        }
        assert!(!rl.check_at("1.2.3.4", t0), "request 31 should be rejected");
        assert!(!rl.check_at("1.2.3.4", t0 + Duration::from_secs(59)));
    }

    #[test]
    fn window_expiry_grants_fresh_budget() {
        let rl = limiter();
        let t0 = Instant::now();
        for _ in 0..31 {
            rl.check_at("k", t0);
        }
        let later = t0 + Duration::from_secs(61);
        for i in 1..=30 {
            assert!(rl.check_at("k", later), "request {i} of new window should pass");
        }
        assert!(!rl.check_at("k", later));
    }

    #[test]
    fn keys_are_counted_independently() {
        let rl = FixedWindowLimiter::new(1, Duration::from_secs(60), 100);
        let t0 = Instant::now();
        assert!(rl.check_at("a", t0));
        assert!(!rl.check_at("a", t0));
        assert!(rl.check_at("b", t0));
    }

    #[test]
    fn table_never_exceeds_max_keys() {
        let rl = FixedWindowLimiter::new(5, Duration::from_secs(60), 3);
        let t0 = Instant::now();
        for i in 0..10 {
            assert!(rl.check_at(&format!("client-{i}"), t0 + Duration::from_millis(i)));
        }
        assert_eq!(rl.tracked_keys(), 3);
    }

    #[test]
    fn expired_windows_are_swept() {
        let rl = FixedWindowLimiter::new(5, Duration::from_secs(10), 100);
        let t0 = Instant::now();
        rl.check_at("a", t0);
        rl.check_at("b", t0);
        assert_eq!(rl.tracked_keys(), 2);
        rl.check_at("c", t0 + Duration::from_secs(30));
        assert_eq!(rl.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn trait_object_allows_first_request() {
        let rl: std::sync::Arc<dyn RateLimiter> = std::sync::Arc::new(limiter());
        assert!(rl.allow("unknown").await);
    }
}
