//! Fixed-window request counting backed by the cache store.
//!
//! Windows are aligned to multiples of the period (`floor(now / period) *
//! period`), and the counter key is scoped to the window start, so rollover is
//! deterministic regardless of when the first request arrived. Atomicity comes
//! from the store's add-and-return increment; the gateway holds no locks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheError, CacheStore, Clock};
use crate::config::{RateLimitConfig, RateRule};
use crate::permissions::Role;

/// Fixed set of rate classes, each with its own (limit, period) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateClass {
    Default,
    Anonymous,
    Authenticated,
    Admin,
}

impl RateClass {
    pub fn name(&self) -> &'static str {
        match self {
            RateClass::Default => "default",
            RateClass::Anonymous => "anonymous",
            RateClass::Authenticated => "authenticated",
            RateClass::Admin => "admin",
        }
    }

    /// Class for an authenticated caller: admins get the admin quota,
    /// everyone else the authenticated one.
    pub fn for_role(role: Role) -> RateClass {
        match role {
            Role::Admin => RateClass::Admin,
            _ => RateClass::Authenticated,
        }
    }
}

impl fmt::Display for RateClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a rate-limit check, exposed to clients via response headers.
#[derive(Debug, Clone)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Unix second at which the current window ends.
    pub reset_at: u64,
    pub used: u64,
}

/// Fixed-window per-identity request counter.
pub struct RateLimiter {
    store: CacheStore,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: CacheStore, clock: Arc<dyn Clock>, config: RateLimitConfig) -> Self {
        Self { store, clock, config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn rule(&self, class: RateClass) -> RateRule {
        match class {
            RateClass::Default => self.config.default,
            RateClass::Anonymous => self.config.anonymous,
            RateClass::Authenticated => self.config.authenticated,
            RateClass::Admin => self.config.admin,
        }
    }

    /// Count this request against (identifier, class) and decide admission.
    ///
    /// Rejected requests are still counted. A `CacheError` means the store is
    /// unreachable; the caller degrades to "not limited, but log it".
    pub async fn check(
        &self,
        identifier: &str,
        class: RateClass,
    ) -> Result<RateDecision, CacheError> {
        let rule = self.rule(class);
        let period = rule.period_secs.max(1);

        let now = self.clock.now_unix();
        let window_start = now / period * period;
        let reset_at = window_start + period;

        let key = self.store.key(&[
            "ratelimit",
            class.name(),
            identifier,
            &window_start.to_string(),
        ]);

        let used = match self.store.increment(&key, 1).await {
            Ok(used) => used,
            Err(CacheError::InvalidValue(msg)) => {
                // Corrupt counter: reset the window rather than failing the
                // request.
                tracing::warn!(key, "resetting corrupt rate counter: {}", msg);
                self.store.delete(&[key.clone()]).await?;
                self.store.increment(&key, 1).await?
            }
            Err(e) => return Err(e),
        };
        let used = used.max(0) as u64;

        // First request in the window owns setting the expiry. The key is
        // window-scoped, so a lost TTL only leaks a key, never extends a window.
        if used == 1 {
            if let Err(e) = self.store.expire(&key, Duration::from_secs(period)).await {
                tracing::warn!(key, "failed to set rate counter TTL: {}", e);
            }
        }

        Ok(RateDecision {
            allowed: used <= rule.limit,
            limit: rule.limit,
            remaining: rule.limit.saturating_sub(used),
            reset_at,
            used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ManualClock, MemoryBackend};
    use crate::config::RateLimitConfig;

    fn limiter(limit: u64, period_secs: u64) -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let backend = Arc::new(MemoryBackend::new(clock.clone()));
        let store = CacheStore::new(backend, "ecohub", 3600);
        let rule = RateRule { limit, period_secs };
        let config = RateLimitConfig {
            enabled: true,
            default: rule,
            anonymous: rule,
            authenticated: rule,
            admin: rule,
        };
        (clock.clone(), RateLimiter::new(store, clock, config))
    }

    #[tokio::test]
    async fn limit_three_allows_three_then_rejects() {
        let (_clock, limiter) = limiter(3, 60);
        let mut allowed = Vec::new();
        for _ in 0..4 {
            let decision = limiter.check("user:1", RateClass::Default).await.unwrap();
            allowed.push(decision.allowed);
        }
        assert_eq!(allowed, vec![true, true, true, false]);
    }

    #[tokio::test]
    async fn rejected_requests_are_still_counted() {
        let (_clock, limiter) = limiter(2, 60);
        for _ in 0..3 {
            let _ = limiter.check("user:1", RateClass::Default).await.unwrap();
        }
        let decision = limiter.check("user:1", RateClass::Default).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.used, 4);
        assert_eq!(decision.remaining, 0);
    }

    #[tokio::test]
    async fn window_rollover_resets_the_count() {
        let (clock, limiter) = limiter(3, 60);
        for _ in 0..4 {
            let _ = limiter.check("user:1", RateClass::Default).await.unwrap();
        }

        clock.advance(60);
        let decision = limiter.check("user:1", RateClass::Default).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.used, 1);
    }

    #[tokio::test]
    async fn reset_at_is_the_window_boundary() {
        let (clock, limiter) = limiter(10, 60);
        clock.set(1_000_010); // 10s into a window
        let decision = limiter.check("ip:10.0.0.1", RateClass::Anonymous).await.unwrap();
        assert_eq!(decision.reset_at, 1_000_020);
        assert_eq!(decision.limit, 10);
        assert_eq!(decision.remaining, 9);
    }

    #[tokio::test]
    async fn identifiers_are_tracked_independently() {
        let (_clock, limiter) = limiter(1, 60);
        assert!(limiter.check("user:1", RateClass::Default).await.unwrap().allowed);
        assert!(limiter.check("user:2", RateClass::Default).await.unwrap().allowed);
        assert!(!limiter.check("user:1", RateClass::Default).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn corrupt_counter_resets_instead_of_failing() {
        let (_clock, limiter) = limiter(3, 60);
        // First request establishes the window-scoped key
        let first = limiter.check("user:1", RateClass::Default).await.unwrap();
        assert_eq!(first.used, 1);

        // Clobber the counter with a non-numeric value
        let key = limiter.store.key(&[
            "ratelimit",
            "default",
            "user:1",
            &(1_000_000u64 / 60 * 60).to_string(),
        ]);
        limiter
            .store
            .set(&key, &serde_json::Value::String("garbage".into()), None)
            .await;

        let decision = limiter.check("user:1", RateClass::Default).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.used, 1);
    }

    #[test]
    fn role_maps_to_class() {
        assert_eq!(RateClass::for_role(Role::Admin), RateClass::Admin);
        assert_eq!(RateClass::for_role(Role::Manager), RateClass::Authenticated);
        assert_eq!(RateClass::for_role(Role::Guest), RateClass::Authenticated);
    }
}
