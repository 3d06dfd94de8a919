//! # EasyPark Testing
//!
//! Testing utilities and helpers for EasyPark.
//!
//! This crate provides:
//! - Mock implementations of environment traits (`FixedClock`, `ScriptedEntropy`)
//! - An in-memory [`Storage`](easypark_core::storage::Storage) backend with failure injection
//! - A Given-When-Then harness for reducers
//!
//! ## Example
//!
//! ```ignore
//! use easypark_testing::{test_clock, InMemoryStorage, ScriptedEntropy};
//!
//! #[tokio::test]
//! async fn test_booking_flow() {
//!     let storage = Arc::new(InMemoryStorage::new());
//!     let app = ParkingApp::with_environment(
//!         storage,
//!         Arc::new(test_clock()),
//!         Arc::new(ScriptedEntropy::new(vec![0, 1, 2, 3, 4, 5])),
//!         Config::for_tests(),
//!     );
//!     // ...
//! }
//! ```

mod storage_mocks;

pub use reducer_test::ReducerTest;
pub use storage_mocks::InMemoryStorage;

use chrono::{DateTime, Utc};
use easypark_core::environment::{Clock, Entropy};

/// Mock implementations of environment traits.
pub mod mocks {
    #![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

    use super::{Clock, DateTime, Entropy, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Returns the same time until explicitly advanced. Clones share the same
    /// underlying time, so a test can keep a handle and move time forward
    /// while a service holds another.
    ///
    /// # Example
    ///
    /// ```
    /// use easypark_testing::mocks::FixedClock;
    /// use easypark_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// assert_eq!(time1, clock.now());
    ///
    /// clock.advance(Duration::minutes(5));
    /// assert_eq!(clock.now() - time1, Duration::minutes(5));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock forward (or backward with a negative duration)
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.write().unwrap();
            *time += by;
        }

        /// Jump to an absolute time
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.write().unwrap() = to;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap()
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

    /// Entropy that replays a fixed script of picks
    ///
    /// Each call to [`Entropy::pick`] returns the next scripted value reduced
    /// modulo `bound`, cycling through the script forever.
    ///
    /// # Example
    ///
    /// ```
    /// use easypark_testing::mocks::ScriptedEntropy;
    /// use easypark_core::environment::Entropy;
    ///
    /// let entropy = ScriptedEntropy::new(vec![0, 1, 40]);
    /// assert_eq!(entropy.pick(36), 0);
    /// assert_eq!(entropy.pick(36), 1);
    /// assert_eq!(entropy.pick(36), 4);
    /// assert_eq!(entropy.pick(36), 0);
    /// ```
    #[derive(Debug)]
    pub struct ScriptedEntropy {
        script: Vec<usize>,
        cursor: AtomicUsize,
    }

    impl ScriptedEntropy {
        /// Create entropy replaying `script` (an empty script always picks 0)
        #[must_use]
        pub const fn new(script: Vec<usize>) -> Self {
            Self {
                script,
                cursor: AtomicUsize::new(0),
            }
        }

        /// Entropy that always picks the same value
        #[must_use]
        pub fn constant(value: usize) -> Self {
            Self::new(vec![value])
        }

        /// Number of picks made so far
        #[must_use]
        pub fn picks(&self) -> usize {
            self.cursor.load(Ordering::SeqCst)
        }
    }

    impl Entropy for ScriptedEntropy {
        fn pick(&self, bound: usize) -> usize {
            let position = self.cursor.fetch_add(1, Ordering::SeqCst);
            if bound == 0 || self.script.is_empty() {
                return 0;
            }
            self.script[position % self.script.len()] % bound
        }
    }
}

/// Install a test subscriber so `tracing` output shows up in failing tests.
///
/// Safe to call from every test; only the first call installs the subscriber.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, ScriptedEntropy, test_clock};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn test_fixed_clock_clones_share_time() {
        let clock = test_clock();
        let handle = clock.clone();
        handle.advance(Duration::hours(2));
        assert_eq!(clock.now(), handle.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T02:00:00+00:00");
    }

    #[test]
    fn test_scripted_entropy_cycles() {
        let entropy = ScriptedEntropy::new(vec![3, 7]);
        assert_eq!(entropy.pick(10), 3);
        assert_eq!(entropy.pick(10), 7);
        assert_eq!(entropy.pick(5), 3);
        assert_eq!(entropy.pick(0), 0);
        assert_eq!(entropy.picks(), 4);
    }

    #[test]
    fn test_empty_script_picks_zero() {
        let entropy = ScriptedEntropy::new(Vec::new());
        assert_eq!(entropy.pick(36), 0);
    }
}
