//! # Book Rental Testing
//!
//! Testing utilities and helpers for the book rental reducer architecture.
//!
//! This crate provides:
//! - Deterministic implementations of the Environment traits (clocks, ids)
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - Assertion helpers for effects
//!
//! ## Example
//!
//! ```ignore
//! use bookrental_testing::{ReducerTest, test_clock};
//!
//! ReducerTest::new(LendingReducer::new())
//!     .with_env(test_environment())
//!     .given_state(LendingState::default())
//!     .when_action(LendingAction::RegisterBook { .. })
//!     .then_state(|state| assert_eq!(state.books.len(), 1))
//!     .run();
//! ```

use bookrental_core::environment::{Clock, IdGenerator};
use chrono::{DateTime, NaiveDate, Utc};

pub mod reducer_test;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, NaiveDate, Utc};
    use chrono::Days;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
    use uuid::Uuid;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use bookrental_testing::mocks::FixedClock;
    /// use bookrental_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
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

        /// Create a fixed clock at midnight UTC of the given day
        #[must_use]
        pub fn on(day: NaiveDate) -> Self {
            Self::new(midnight(day))
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when a test moves it
    ///
    /// Clones share the same time, so a test can keep one handle and give
    /// another to the environment, then travel forward to make rentals
    /// overdue or let suspensions lapse.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        seconds: Arc<AtomicI64>,
    }

    impl ManualClock {
        /// Create a manual clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                seconds: Arc::new(AtomicI64::new(time.timestamp())),
            }
        }

        /// Create a manual clock starting at midnight UTC of the given day
        #[must_use]
        pub fn on(day: NaiveDate) -> Self {
            Self::new(midnight(day))
        }

        /// Move the clock forward by whole days
        pub fn advance_days(&self, days: u64) {
            let delta = i64::try_from(days.saturating_mul(86_400)).unwrap_or(i64::MAX);
            self.seconds.fetch_add(delta, Ordering::SeqCst);
        }

        /// Jump the clock to midnight UTC of `day`
        pub fn set_day(&self, day: NaiveDate) {
            self.seconds.store(midnight(day).timestamp(), Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::from_timestamp(self.seconds.load(Ordering::SeqCst), 0).unwrap_or_default()
        }
    }

    /// Predictable ids: `00000000-0000-0000-0000-000000000001`, `...02`, ...
    #[derive(Debug, Clone, Default)]
    pub struct SequentialIds {
        next: Arc<AtomicU64>,
    }

    impl SequentialIds {
        /// Create a generator whose first id ends in `1`
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl IdGenerator for SequentialIds {
        fn next_id(&self) -> Uuid {
            let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
            Uuid::from_u128(u128::from(n))
        }
    }

    /// Midnight UTC at the start of `day`
    fn midnight(day: NaiveDate) -> DateTime<Utc> {
        day.and_hms_opt(0, 0, 0)
            .map_or_else(DateTime::default, |time| time.and_utc())
    }

    /// The calendar day every default test clock sits on (2025-01-01)
    #[must_use]
    pub fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default()
    }

    /// Date `days` after [`test_date`]
    #[must_use]
    pub fn test_date_plus(days: u64) -> NaiveDate {
        test_date()
            .checked_add_days(Days::new(days))
            .unwrap_or_default()
    }

    /// Date `days` before [`test_date`]
    #[must_use]
    pub fn test_date_minus(days: u64) -> NaiveDate {
        test_date()
            .checked_sub_days(Days::new(days))
            .unwrap_or_default()
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::on(test_date())
    }
}

// Re-export commonly used items
pub use mocks::{
    FixedClock, ManualClock, SequentialIds, test_clock, test_date, test_date_minus,
    test_date_plus,
};
pub use reducer_test::{ReducerTest, assertions};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.today(), test_date());
    }

    #[test]
    fn test_manual_clock_shares_time_between_clones() {
        let clock = ManualClock::on(test_date());
        let handle = clock.clone();

        handle.advance_days(20);
        assert_eq!(clock.today(), test_date_plus(20));

        handle.set_day(test_date_minus(1));
        assert_eq!(clock.today(), test_date_minus(1));
    }

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIds::new();
        assert_eq!(ids.next_id(), uuid::Uuid::from_u128(1));
        assert_eq!(ids.clone().next_id(), uuid::Uuid::from_u128(2));
    }
}
