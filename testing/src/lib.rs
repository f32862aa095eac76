//! # Helpdesk Testing
//!
//! In-memory infrastructure for exercising the ticket pipeline without
//! Postgres, Redis or Kafka.
//!
//! This crate provides:
//! - [`InMemoryTicketStore`]: versioned store with conflict and failure injection
//! - [`InMemoryCache`]: TTL cache with failure and latency injection
//! - [`InMemoryEventBus`]: shared log with independent consumer groups and
//!   redelivery
//! - [`FixedClock`] and [`helpers::eventually`]
//!
//! ## Example
//!
//! ```ignore
//! use helpdesk_testing::{InMemoryCache, InMemoryEventBus, InMemoryTicketStore};
//!
//! #[tokio::test]
//! async fn create_publishes() {
//!     let store = Arc::new(InMemoryTicketStore::new());
//!     let cache = Arc::new(InMemoryCache::new());
//!     let bus = Arc::new(InMemoryEventBus::new());
//!     let service = TicketService::new(store, cache, bus.clone(), Arc::new(test_clock()));
//!
//!     service.create(request, owner).await?;
//!     assert_eq!(bus.events("ticket-events").len(), 1);
//! }
//! ```

pub mod cache;
pub mod event_bus;
pub mod store;

/// Mock implementations for testing.
pub mod mocks {
    use chrono::{DateTime, Utc};
    use helpdesk_core::environment::Clock;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use helpdesk_testing::mocks::FixedClock;
    /// use helpdesk_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use std::future::Future;
    use std::time::Duration;

    /// Poll `condition` every 10ms until it holds or `timeout` elapses.
    ///
    /// Returns whether the condition was eventually met. Used to wait on
    /// consumers running in background tasks.
    pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if condition().await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Install a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use cache::InMemoryCache;
pub use event_bus::InMemoryEventBus;
pub use mocks::{FixedClock, test_clock};
pub use store::InMemoryTicketStore;
