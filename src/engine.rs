//! Admission decision engine.
//!
//! The engine is the single entry point callers use before a gated
//! operation. It picks a backend once, at construction, and keeps it for its
//! lifetime; a shared backend that fails during a call is handled according
//! to the configured [`FailureMode`].

use std::sync::Arc;
use tracing::{info, trace, warn};

use crate::config::{FailureMode, Settings};
use crate::error::{QuotaError, Result};
use crate::ratelimit::{
    BackendKind, Category, Clock, CounterBackend, CounterKey, Decision, Identifier, LocalBackend,
    Policy, PolicyRegistry, RedisBackend, SystemClock,
};

/// Decides whether a caller may run an operation of a given category.
pub struct AdmissionEngine {
    /// Effective policy table
    registry: PolicyRegistry,
    /// Process-local counters; also the fail-open fallback
    local: Arc<LocalBackend>,
    /// Shared counters, when configured and reachable at startup
    shared: Option<Arc<dyn CounterBackend>>,
    /// Handling of shared backend failures
    failure_mode: FailureMode,
    /// Time source
    clock: Arc<dyn Clock>,
}

impl AdmissionEngine {
    /// Create an engine that counts locally.
    pub fn new(registry: PolicyRegistry, local: Arc<LocalBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            local,
            shared: None,
            failure_mode: FailureMode::default(),
            clock,
        }
    }

    /// Count through a shared backend instead of the local table.
    pub fn with_shared(mut self, shared: Arc<dyn CounterBackend>) -> Self {
        self.shared = Some(shared);
        self
    }

    /// Set how shared backend failures are resolved.
    pub fn with_failure_mode(mut self, failure_mode: FailureMode) -> Self {
        self.failure_mode = failure_mode;
        self
    }

    /// Build an engine from settings using the system clock.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        Self::from_settings_with_clock(settings, Arc::new(SystemClock::new())).await
    }

    /// Build an engine from settings.
    ///
    /// Invalid policy overrides are an error. An unreachable shared backend is
    /// not: the engine logs it and runs on the local backend for its lifetime.
    ///
    /// `settings.failure_mode` only governs failures during a check. A shared
    /// backend that cannot be reached here leaves the engine on local counters
    /// even under [`FailureMode::Closed`].
    pub async fn from_settings_with_clock(
        settings: &Settings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let registry = PolicyRegistry::with_overrides(&settings.policies)?;
        let local = Arc::new(LocalBackend::with_sweep_interval(
            settings.local.sweep_interval(),
        ));
        let mut engine =
            Self::new(registry, local, clock).with_failure_mode(settings.failure_mode);

        if settings.shared.is_configured() {
            match RedisBackend::connect(&settings.shared).await {
                Ok(shared) => engine = engine.with_shared(Arc::new(shared)),
                Err(e) => warn!(
                    error = %e,
                    "Shared backend unavailable at startup, using local counters"
                ),
            }
        }

        info!(
            backend = %engine.backend_kind(),
            failure_mode = ?engine.failure_mode,
            "Admission engine initialized"
        );
        Ok(engine)
    }

    /// Count one request by `identifier` in `category` and decide it.
    ///
    /// Exceeding the quota yields `allowed == false`; this never fails.
    pub async fn check(&self, identifier: &Identifier, category: Category) -> Decision {
        let policy = self.registry.lookup(category);
        let key = CounterKey::new(category, identifier);
        let now_ms = self.clock.now_ms();

        trace!(key = %key, backend = %self.backend_kind(), "Admission check");

        let Some(shared) = &self.shared else {
            return self.local.check_at(&key, &policy, now_ms);
        };

        match shared.check(&key, &policy, now_ms).await {
            Ok(decision) => decision,
            Err(e) => self.degrade(&key, &policy, now_ms, e),
        }
    }

    /// Like [`check`](Self::check) but from raw names.
    ///
    /// Unknown categories use the default policy; an empty identifier is rejected.
    pub async fn check_named(&self, identifier: &str, category: &str) -> Result<Decision> {
        let identifier = Identifier::new(identifier)?;
        Ok(self.check(&identifier, Category::from_name(category)).await)
    }

    fn degrade(&self, key: &CounterKey, policy: &Policy, now_ms: u64, err: QuotaError) -> Decision {
        match self.failure_mode {
            FailureMode::Open => {
                warn!(key = %key, error = %err, "Shared backend failed, counting locally");
                self.local.check_at(key, policy, now_ms)
            }
            FailureMode::Closed => {
                warn!(key = %key, error = %err, "Shared backend failed, denying request");
                Decision::denied(policy.quota, now_ms.saturating_add(policy.window_ms()))
            }
        }
    }

    /// The backend selected at construction.
    pub fn backend_kind(&self) -> BackendKind {
        self.shared
            .as_ref()
            .map_or(BackendKind::Local, |shared| shared.kind())
    }

    /// The effective policy table.
    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// The local backend.
    pub fn local(&self) -> &Arc<LocalBackend> {
        &self.local
    }

    /// Current time according to the engine's clock, in epoch milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::mocks::ManualClock;
    use crate::response;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const T0: u64 = 1_700_000_000_000;

    fn local_engine(clock: &ManualClock) -> AdmissionEngine {
        AdmissionEngine::new(
            PolicyRegistry::new(),
            Arc::new(LocalBackend::new()),
            Arc::new(clock.clone()),
        )
    }

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    #[derive(Default)]
    struct FailingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CounterBackend for FailingBackend {
        async fn check(&self, _key: &CounterKey, _policy: &Policy, _now_ms: u64) -> Result<Decision> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(QuotaError::Timeout(Duration::from_millis(250)))
        }

        fn kind(&self) -> BackendKind {
            BackendKind::Redis
        }
    }

    /// Always admits as if seven requests were already counted.
    struct StubShared;

    #[async_trait]
    impl CounterBackend for StubShared {
        async fn check(&self, _key: &CounterKey, policy: &Policy, now_ms: u64) -> Result<Decision> {
            Ok(Decision::admitted(policy.quota, 7, now_ms + 1))
        }

        fn kind(&self) -> BackendKind {
            BackendKind::Redis
        }
    }

    #[tokio::test]
    async fn test_generate_scenario_end_to_end() {
        let clock = ManualClock::new(T0);
        let engine = local_engine(&clock);
        let user = id("user-42");

        for i in 1..=10u64 {
            let decision = engine.check(&user, Category::Generate).await;
            assert!(decision.allowed, "call {} should be allowed", i);
            assert_eq!(decision.remaining, 10 - i);
            assert_eq!(decision.limit, 10);
            clock.advance(Duration::from_secs(1));
        }

        let denied = engine.check(&user, Category::Generate).await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.reset_at, T0 + 60_000);

        let rejection = response::exceeded(&denied, engine.now_ms()).unwrap();
        assert!((1..=60).contains(&rejection.body.retry_after_seconds));

        clock.advance(Duration::from_secs(61));
        let decision = engine.check(&user, Category::Generate).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 9);
        assert_eq!(decision.reset_at, clock.now_ms() + 60_000);
    }

    #[tokio::test]
    async fn test_reset_at_unchanged_when_denied() {
        let clock = ManualClock::new(T0);
        let engine = local_engine(&clock);
        let user = id("user-1");

        let first = engine.check(&user, Category::Auth).await;
        for _ in 0..4 {
            clock.advance(Duration::from_secs(10));
            assert_eq!(engine.check(&user, Category::Auth).await.reset_at, first.reset_at);
        }
        clock.advance(Duration::from_secs(10));
        let denied = engine.check(&user, Category::Auth).await;
        assert!(!denied.allowed);
        assert_eq!(denied.reset_at, first.reset_at);
    }

    #[tokio::test]
    async fn test_identifier_and_category_isolation() {
        let clock = ManualClock::new(T0);
        let engine = local_engine(&clock);

        for _ in 0..5 {
            assert!(engine.check(&id("alice"), Category::Auth).await.allowed);
        }
        assert!(!engine.check(&id("alice"), Category::Auth).await.allowed);

        let bob = engine.check(&id("bob"), Category::Auth).await;
        assert!(bob.allowed);
        assert_eq!(bob.remaining, 4);

        let alice_read = engine.check(&id("alice"), Category::Read).await;
        assert!(alice_read.allowed);
        assert_eq!(alice_read.remaining, 299);
    }

    #[tokio::test]
    async fn test_check_named() {
        let clock = ManualClock::new(T0);
        let engine = local_engine(&clock);

        let decision = engine.check_named("user-42", "generate").await.unwrap();
        assert_eq!(decision.limit, 10);

        let decision = engine.check_named("user-42", "no-such-category").await.unwrap();
        assert_eq!(decision.limit, 60);

        assert!(matches!(
            engine.check_named("", "generate").await,
            Err(QuotaError::EmptyIdentifier)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_checks_admit_exactly_quota() {
        let clock = ManualClock::new(T0);
        let engine = Arc::new(local_engine(&clock));

        let tasks = (0..50).map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.check(&id("burst"), Category::Generate).await })
        });
        let decisions: Vec<Decision> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(decisions.iter().filter(|d| d.allowed).count(), 10);
        assert_eq!(decisions.iter().filter(|d| !d.allowed).count(), 40);
    }

    #[tokio::test]
    async fn test_shared_backend_preferred() {
        let clock = ManualClock::new(T0);
        let engine = local_engine(&clock).with_shared(Arc::new(StubShared));

        assert_eq!(engine.backend_kind(), BackendKind::Redis);
        let decision = engine.check(&id("u"), Category::Generate).await;
        assert_eq!(decision.remaining, 3);
        assert!(engine.local().is_empty());
    }

    #[tokio::test]
    async fn test_fail_open_counts_locally() {
        let clock = ManualClock::new(T0);
        let failing = Arc::new(FailingBackend::default());
        let engine = local_engine(&clock).with_shared(failing.clone());

        for _ in 0..10 {
            assert!(engine.check(&id("u"), Category::Generate).await.allowed);
        }
        assert!(!engine.check(&id("u"), Category::Generate).await.allowed);
        assert_eq!(failing.calls.load(Ordering::SeqCst), 11);
        assert_eq!(engine.local().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_closed_denies() {
        let clock = ManualClock::new(T0);
        let engine = local_engine(&clock)
            .with_shared(Arc::new(FailingBackend::default()))
            .with_failure_mode(FailureMode::Closed);

        let decision = engine.check(&id("u"), Category::Generate).await;
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.limit, 10);
        assert_eq!(decision.reset_at, T0 + 60_000);
        assert!(engine.local().is_empty());
    }

    #[tokio::test]
    async fn test_from_settings_without_shared_is_local() {
        let engine = AdmissionEngine::from_settings(&Settings::default())
            .await
            .unwrap();
        assert_eq!(engine.backend_kind(), BackendKind::Local);
    }

    #[tokio::test]
    async fn test_from_settings_unreachable_shared_falls_back_to_local() {
        let yaml = r#"
shared:
  url: redis://127.0.0.1:1/
  timeout_ms: 200
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        let engine = AdmissionEngine::from_settings(&settings).await.unwrap();

        assert_eq!(engine.backend_kind(), BackendKind::Local);
        assert!(engine.check(&id("u"), Category::Read).await.allowed);
    }

    #[tokio::test]
    async fn test_unreachable_shared_at_startup_ignores_fail_closed() {
        let yaml = r#"
shared:
  url: redis://127.0.0.1:1/
  timeout_ms: 200
failure_mode: closed
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        let engine = AdmissionEngine::from_settings(&settings).await.unwrap();

        assert_eq!(engine.backend_kind(), BackendKind::Local);
        let decision = engine.check(&id("u"), Category::Read).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 299);
    }

    #[tokio::test]
    async fn test_from_settings_applies_overrides() {
        let yaml = r#"
policies:
  generate:
    quota: 2
    window: 10s
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        let clock = ManualClock::new(T0);
        let engine = AdmissionEngine::from_settings_with_clock(&settings, Arc::new(clock.clone()))
            .await
            .unwrap();

        assert!(engine.check(&id("u"), Category::Generate).await.allowed);
        assert!(engine.check(&id("u"), Category::Generate).await.allowed);
        assert!(!engine.check(&id("u"), Category::Generate).await.allowed);

        clock.advance(Duration::from_secs(10));
        assert!(engine.check(&id("u"), Category::Generate).await.allowed);
    }

    #[tokio::test]
    async fn test_from_settings_rejects_bad_override() {
        let yaml = r#"
policies:
  nope:
    quota: 2
    window: 10s
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        let result = AdmissionEngine::from_settings(&settings).await;
        assert!(matches!(result, Err(QuotaError::Config(_))));
    }
}
