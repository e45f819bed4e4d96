//! # Boxoffice Testing
//!
//! Testing utilities and helpers for the boxoffice workspace.
//!
//! This crate provides:
//! - [`ManualClock`]: a clock tests move forward by hand
//! - [`LedgerTest`]: Given-When-Then harness for ledger reducers
//! - [`RecordingPaymentProcessor`]: mock processor with call recording and
//!   failure injection
//! - [`FlakyLedgerStore`]: store wrapper that fails on demand
//! - [`fixtures`]: builders for events, buyers and a wired [`TestBoxOffice`]
//! - [`properties`]: proptest strategies for domain values
//!
//! ## Example
//!
//! ```ignore
//! use boxoffice_testing::fixtures;
//!
//! #[tokio::test]
//! async fn test_offer_lapses() {
//!     let harness = fixtures::box_office();
//!     let event_id = harness.create_event(1).await;
//!
//!     harness.office.join_waitlist(event_id, fixtures::buyer(1)).await.unwrap();
//!     harness.clock.advance(chrono::Duration::minutes(30));
//!
//!     let availability = harness.office.get_availability(event_id).await.unwrap();
//!     assert_eq!(availability.remaining_tickets, 1);
//! }
//! ```

pub mod fixtures;
pub mod processor;
pub mod store;

use boxoffice_core::environment::Clock;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Arc, AtomicI64, Clock, DateTime, Duration, Ordering, Utc};

    /// Clock that only moves when told to.
    ///
    /// Clones share the same instant, so a test can hold one handle while the
    /// service under test holds another.
    ///
    /// # Example
    ///
    /// ```
    /// use boxoffice_testing::mocks::{ManualClock, test_time};
    /// use boxoffice_core::environment::Clock;
    /// use chrono::Duration;
    ///
    /// let clock = ManualClock::new(test_time());
    /// let before = clock.now();
    /// clock.advance(Duration::minutes(30));
    /// assert_eq!(clock.now() - before, Duration::minutes(30));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        millis: Arc<AtomicI64>,
    }

    impl ManualClock {
        /// Create a clock reading `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                millis: Arc::new(AtomicI64::new(time.timestamp_millis())),
            }
        }

        /// Move the clock forward (or back, for a negative duration)
        pub fn advance(&self, by: Duration) {
            self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
        }

        /// Jump to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            self.millis.store(time.timestamp_millis(), Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
        }
    }

    /// Instant every fixture starts from (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// A manual clock at [`test_time`]
    #[must_use]
    pub fn test_clock() -> ManualClock {
        ManualClock::new(test_time())
    }
}

/// Installs a `tracing` subscriber for test output (idempotent).
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Property-based testing strategies for domain values.
pub mod properties {
    use boxoffice_core::fees::FeeSchedule;
    use boxoffice_core::types::Money;
    use proptest::prelude::*;

    /// Amounts up to `max_cents`
    pub fn money(max_cents: u64) -> impl Strategy<Value = Money> {
        (0..=max_cents).prop_map(Money::from_cents)
    }

    /// Realistic processor pricing: up to 15% plus up to one dollar flat
    pub fn fee_schedule() -> impl Strategy<Value = FeeSchedule> {
        (0u32..=1_500, 0u64..=100).prop_map(|(rate_bps, flat_cents)| FeeSchedule::new(rate_bps, flat_cents))
    }
}

pub use fixtures::TestBoxOffice;
pub use ledger_test::LedgerTest;
pub use mocks::{ManualClock, test_clock, test_time};
pub use processor::RecordingPaymentProcessor;
pub use store::FlakyLedgerStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_shared_between_clones() {
        let clock = test_clock();
        let handle = clock.clone();

        handle.advance(Duration::seconds(90));

        assert_eq!(clock.now(), test_time() + Duration::seconds(90));
    }
}
