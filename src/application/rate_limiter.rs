//! Rate limit orchestration.
//!
//! For every request: resolve the policy for the path, derive the counter
//! key, count the request, and decide. The request is always counted before
//! the decision is made, so a denied request still occupies a slot in the
//! window.
//!
//! Counting failures never reject traffic. If the store (after its own
//! fallback) still fails, the request is let through as `DegradedAllowed`.

use std::sync::Arc;

use crate::domain::rate_limit::{Decision, PolicyTable, RequestContext};
use crate::ports::{Clock, CounterStore, StoreError};

/// Decides whether requests may proceed.
pub struct RateLimiter {
    policies: PolicyTable,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Creates a limiter. `clock` drives retry hints and fail-open reset
    /// times, and should be the clock `store` counts with.
    pub fn new(
        policies: PolicyTable,
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            policies,
            store,
            clock,
        }
    }

    /// Counts the request and returns the verdict.
    pub async fn check(&self, request: &RequestContext<'_>) -> Decision {
        let policy = self.policies.resolve(request.path());
        let key = policy.key_strategy().key(policy.name(), request);

        match self
            .store
            .increment_and_count(&key, policy.window().seconds())
            .await
        {
            Ok(snapshot) => {
                let decision = Decision::counted(policy, snapshot.count, snapshot.reset_at_ms);
                if !decision.allowed() {
                    tracing::debug!(
                        key = %key,
                        policy = %policy.name(),
                        count = snapshot.count,
                        limit = policy.request_limit(),
                        "Rate limit exceeded"
                    );
                }
                decision
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    key = %key,
                    policy = %policy.name(),
                    "Rate limit check failed, allowing request"
                );
                Decision::degraded(policy, self.now_ms())
            }
        }
    }

    /// Clears the counter for `key`, e.g. to unblock a client.
    pub async fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.store.reset(key).await?;
        tracing::info!(key = %key, "Rate limit counter reset");
        Ok(())
    }

    /// The policy table in use.
    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// Current time in Unix milliseconds, as seen by this limiter.
    pub fn now_ms(&self) -> u64 {
        self.clock.now().as_unix_millis()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policies", &self.policies.len())
            .field("store", &self.store.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::rate_limiter::testing::FlakyStore;
    use crate::adapters::rate_limiter::{InMemoryCounterStore, StoreSelector};
    use crate::domain::rate_limit::{DecisionOutcome, KeyStrategyKind, Policy, WindowSpec};
    use crate::ports::StoreKind;
    use http::HeaderMap;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    const START_MS: u64 = 1_700_000_000_000;

    fn policy(name: &str, limit: u32, window: &str) -> Policy {
        Policy::new(name, limit, WindowSpec::parse(window).unwrap()).unwrap()
    }

    fn table() -> PolicyTable {
        PolicyTable::new(policy("default", 100, "1m"))
            .with_route("/api/contact", policy("contact", 3, "1m"))
            .unwrap()
            .with_route("/api/admin/*", policy("admin", 10, "1h"))
            .unwrap()
            .with_route("/api/admin/export", policy("export", 1, "1h"))
            .unwrap()
    }

    struct Harness {
        limiter: RateLimiter,
        clock: ManualClock,
        distributed: Arc<FlakyStore>,
        selector: StoreSelector,
    }

    fn harness() -> Harness {
        let clock = ManualClock::at_millis(START_MS);
        let local = Arc::new(InMemoryCounterStore::with_clock(Arc::new(clock.clone())));
        let distributed = Arc::new(FlakyStore::with_clock(Arc::new(clock.clone())));
        let selector = StoreSelector::new(
            Some(Arc::clone(&distributed) as Arc<dyn CounterStore>),
            local,
        );
        let limiter = RateLimiter::new(
            table(),
            Arc::new(selector.clone()),
            Arc::new(clock.clone()),
        );

        Harness {
            limiter,
            clock,
            distributed,
            selector,
        }
    }

    fn local_limiter(table: PolicyTable) -> (RateLimiter, ManualClock) {
        let clock = ManualClock::at_millis(START_MS);
        let store = Arc::new(InMemoryCounterStore::with_clock(Arc::new(clock.clone())));
        let limiter = RateLimiter::new(table, store, Arc::new(clock.clone()));
        (limiter, clock)
    }

    fn from_ip(headers: &mut HeaderMap, ip: &str) {
        headers.insert("x-forwarded-for", ip.parse().unwrap());
    }

    #[tokio::test]
    async fn contact_form_allows_three_then_denies() {
        let h = harness();
        let mut headers = HeaderMap::new();
        from_ip(&mut headers, "1.2.3.4");
        let request = RequestContext::new("/api/contact", &headers);

        let mut remaining = Vec::new();
        for _ in 0..3 {
            let decision = h.limiter.check(&request).await;
            assert_eq!(decision.outcome, DecisionOutcome::Allowed);
            assert_eq!(decision.limit, 3);
            remaining.push(decision.remaining);
        }
        assert_eq!(remaining, vec![2, 1, 0]);

        let denied = h.limiter.check(&request).await;
        assert_eq!(denied.outcome, DecisionOutcome::Denied);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.policy_descriptor, "3;w=1m");
        assert_eq!(denied.reset_at_ms, START_MS + 60_000);

        let retry = denied.retry_after_secs(h.limiter.now_ms());
        assert!(retry > 0 && retry <= 60, "retry after {retry}");
        assert_eq!(h.distributed.calls(), 4);
    }

    #[tokio::test]
    async fn distributed_reset_times_follow_the_shared_clock() {
        let h = harness();
        let headers = HeaderMap::new();
        let request = RequestContext::new("/api/contact", &headers);

        let first = h.limiter.check(&request).await;
        assert_eq!(first.reset_at_ms, START_MS + 60_000);

        h.clock.advance(Duration::from_secs(61));

        let after_window = h.limiter.check(&request).await;
        assert_eq!(after_window.remaining, 2);
        assert_eq!(after_window.reset_at_ms, START_MS + 121_000);
    }

    #[tokio::test]
    async fn clients_are_counted_separately() {
        let h = harness();
        let mut first = HeaderMap::new();
        from_ip(&mut first, "1.2.3.4");
        let mut second = HeaderMap::new();
        from_ip(&mut second, "5.6.7.8");

        for _ in 0..3 {
            h.limiter.check(&RequestContext::new("/api/contact", &first)).await;
        }

        let other = h.limiter.check(&RequestContext::new("/api/contact", &second)).await;
        assert!(other.allowed());
        assert_eq!(other.remaining, 2);
    }

    #[tokio::test]
    async fn exact_route_beats_wildcard() {
        let h = harness();
        let headers = HeaderMap::new();

        let export = h.limiter.check(&RequestContext::new("/api/admin/export", &headers)).await;
        assert_eq!(export.policy_name, "export");
        assert_eq!(export.limit, 1);

        let users = h.limiter.check(&RequestContext::new("/api/admin/users", &headers)).await;
        assert_eq!(users.policy_name, "admin");
        assert_eq!(users.limit, 10);

        let other = h.limiter.check(&RequestContext::new("/about", &headers)).await;
        assert_eq!(other.policy_name, "default");
    }

    #[tokio::test]
    async fn signin_limit_is_not_shadowed_by_api_wildcard() {
        let table = PolicyTable::new(policy("default", 1000, "1m"))
            .with_route("/api/*", policy("api", 100, "1m"))
            .unwrap()
            .with_route("/api/auth/signin", policy("signin", 5, "15m"))
            .unwrap();
        let (limiter, _clock) = local_limiter(table);
        let mut headers = HeaderMap::new();
        from_ip(&mut headers, "1.2.3.4");
        let signin = RequestContext::new("/api/auth/signin", &headers);
        let other = RequestContext::new("/api/other", &headers);

        for _ in 0..5 {
            assert!(limiter.check(&signin).await.allowed());
            assert!(limiter.check(&other).await.allowed());
        }

        assert!(!limiter.check(&signin).await.allowed());
        let other_decision = limiter.check(&other).await;
        assert!(other_decision.allowed());
        assert_eq!(other_decision.remaining, 94);
    }

    #[tokio::test]
    async fn window_reset_allows_again() {
        let (limiter, clock) = local_limiter(table());
        let headers = HeaderMap::new();
        let request = RequestContext::new("/api/contact", &headers)
            .with_remote_addr(Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));

        for _ in 0..3 {
            assert!(limiter.check(&request).await.allowed());
        }
        assert!(!limiter.check(&request).await.allowed());

        clock.advance(Duration::from_secs(61));

        let decision = limiter.check(&request).await;
        assert!(decision.allowed());
        assert_eq!(decision.remaining, 2);
    }

    #[tokio::test]
    async fn unhealthy_distributed_store_keeps_enforcing_locally() {
        let h = harness();
        let mut headers = HeaderMap::new();
        from_ip(&mut headers, "1.2.3.4");
        let request = RequestContext::new("/api/contact", &headers);

        h.distributed.set_healthy(false);
        assert_eq!(h.selector.mode(), StoreKind::Local);

        for _ in 0..3 {
            assert!(h.limiter.check(&request).await.allowed());
        }
        assert!(!h.limiter.check(&request).await.allowed());
        assert_eq!(h.distributed.calls(), 0);

        h.distributed.set_healthy(true);
        assert_eq!(h.selector.mode(), StoreKind::Distributed);
        assert!(h.limiter.check(&request).await.allowed());
        assert_eq!(h.distributed.calls(), 1);
    }

    #[tokio::test]
    async fn failing_distributed_store_still_limits_through_fallback() {
        let h = harness();
        h.distributed.set_failing(true);
        let headers = HeaderMap::new();
        let request = RequestContext::new("/api/contact", &headers);

        for _ in 0..3 {
            let decision = h.limiter.check(&request).await;
            assert_eq!(decision.outcome, DecisionOutcome::Allowed);
        }
        assert_eq!(h.limiter.check(&request).await.outcome, DecisionOutcome::Denied);
    }

    #[tokio::test]
    async fn store_failure_fails_open() {
        let store = Arc::new(FlakyStore::healthy());
        store.set_failing(true);
        let clock = ManualClock::at_millis(START_MS);
        let limiter = RateLimiter::new(table(), store, Arc::new(clock));
        let headers = HeaderMap::new();
        let request = RequestContext::new("/api/contact", &headers);

        for _ in 0..10 {
            let decision = limiter.check(&request).await;
            assert_eq!(decision.outcome, DecisionOutcome::DegradedAllowed);
            assert!(decision.allowed());
            assert_eq!(decision.remaining, 3);
            assert_eq!(decision.reset_at_ms, START_MS + 60_000);
        }
    }

    #[tokio::test]
    async fn global_strategy_shares_one_counter() {
        let table = PolicyTable::new(policy("default", 100, "1m"))
            .with_route(
                "/api/search",
                policy("search", 2, "1m").with_key_strategy(KeyStrategyKind::Global.strategy()),
            )
            .unwrap();
        let (limiter, _clock) = local_limiter(table);

        let mut a = HeaderMap::new();
        from_ip(&mut a, "1.1.1.1");
        let mut b = HeaderMap::new();
        from_ip(&mut b, "2.2.2.2");

        assert!(limiter.check(&RequestContext::new("/api/search", &a)).await.allowed());
        assert!(limiter.check(&RequestContext::new("/api/search", &b)).await.allowed());
        assert!(!limiter.check(&RequestContext::new("/api/search", &a)).await.allowed());
    }

    #[tokio::test]
    async fn user_strategy_counts_by_principal() {
        let table = PolicyTable::new(policy("default", 100, "1m"))
            .with_route(
                "/api/profile",
                policy("profile", 1, "1m").with_key_strategy(KeyStrategyKind::User.strategy()),
            )
            .unwrap();
        let (limiter, _clock) = local_limiter(table);
        let mut headers = HeaderMap::new();
        from_ip(&mut headers, "1.1.1.1");

        let alice = RequestContext::new("/api/profile", &headers).with_principal(Some("alice"));
        let bob = RequestContext::new("/api/profile", &headers).with_principal(Some("bob"));

        assert!(limiter.check(&alice).await.allowed());
        assert!(limiter.check(&bob).await.allowed());
        assert!(!limiter.check(&alice).await.allowed());
    }

    #[tokio::test]
    async fn reset_unblocks_a_client() {
        let (limiter, _clock) = local_limiter(table());
        let mut headers = HeaderMap::new();
        from_ip(&mut headers, "1.2.3.4");
        let request = RequestContext::new("/api/contact", &headers);

        for _ in 0..4 {
            limiter.check(&request).await;
        }
        assert!(!limiter.check(&request).await.allowed());

        limiter.reset("contact:1.2.3.4:/api/contact").await.unwrap();

        assert!(limiter.check(&request).await.allowed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_allow_exactly_the_limit() {
        let table = PolicyTable::new(policy("burst", 20, "1m"));
        let (limiter, _clock) = local_limiter(table);
        let limiter = Arc::new(limiter);

        let mut handles = Vec::new();
        for _ in 0..50 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                let headers = HeaderMap::new();
                limiter
                    .check(&RequestContext::new("/burst", &headers))
                    .await
                    .allowed()
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 20);
    }

    #[test]
    fn policies_exposes_the_table() {
        let (limiter, _clock) = local_limiter(table());
        assert_eq!(limiter.policies().len(), 3);
        assert_eq!(limiter.policies().default_policy().name(), "default");
    }
}
