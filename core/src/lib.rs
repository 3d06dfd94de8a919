//! # EasyPark Core
//!
//! Core traits and types shared by the EasyPark crates.
//!
//! The domain logic is written as reducers over plain in-memory collections.
//! A service loads a collection from a [`storage::Storage`] backend, runs a
//! reducer over it and writes the collection back.
//!
//! ## Core Concepts
//!
//! - **State**: an in-memory collection (for example every reservation plus its id counter)
//! - **Action**: a command requested by a caller
//! - **Event**: a fact recorded by the reducer once the command was accepted
//! - **Reducer**: `(State, Action, Environment) → Result<Events, Error>`
//! - **Environment**: injected dependencies (`Clock`, `Entropy`)
//!
//! ## Example
//!
//! ```ignore
//! use easypark_core::reducer::Reducer;
//!
//! impl Reducer for TariffReducer {
//!     type State = TariffState;
//!     type Action = TariffAction;
//!     type Event = TariffEvent;
//!     type Environment = TariffEnvironment;
//!     type Error = ParkingError;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut TariffState,
//!         action: TariffAction,
//!         env: &TariffEnvironment,
//!     ) -> Result<SmallVec<[TariffEvent; 4]>, ParkingError> {
//!         // Business logic goes here
//!         Ok(smallvec![])
//!     }
//! }
//! ```

pub mod storage;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};

/// Reducer module - The core trait for business logic
///
/// Reducers validate a command against the current state, mutate the state in
/// place and return the events describing what changed. A rejected command
/// returns an error and must leave the state untouched.
pub mod reducer {
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The collection this reducer operates on
    /// - `Action`: The commands this reducer accepts
    /// - `Event`: The facts this reducer records
    /// - `Environment`: The injected dependencies this reducer needs
    /// - `Error`: Why a command was rejected
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The command type this reducer processes
        type Action;

        /// The event type this reducer emits
        type Event;

        /// The environment type with injected dependencies
        type Environment;

        /// The rejection type
        type Error;

        /// Reduce a command into state changes and recorded events
        ///
        /// 1. Validates the command
        /// 2. Updates state in place
        /// 3. Returns the recorded events
        ///
        /// # Errors
        ///
        /// Returns `Self::Error` when the command is rejected. The state is
        /// left unchanged in that case.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Result<SmallVec<[Self::Event; 4]>, Self::Error>;
    }
}

/// Environment module - Dependency injection traits
///
/// All sources of non-determinism (time, randomness) are abstracted behind
/// traits and injected through a reducer's environment.
pub mod environment {
    use chrono::{DateTime, Utc};
    use rand::Rng;

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use easypark_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Source of uniform random choices
    ///
    /// Used for reservation codes and space offsets. Tests inject a scripted
    /// implementation to make those values predictable.
    pub trait Entropy: Send + Sync {
        /// Pick an index in `0..bound`
        ///
        /// Implementations must return `0` when `bound` is `0`.
        fn pick(&self, bound: usize) -> usize;
    }

    /// Production entropy backed by the thread-local RNG
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ThreadEntropy;

    impl Entropy for ThreadEntropy {
        fn pick(&self, bound: usize) -> usize {
            if bound == 0 {
                return 0;
            }
            rand::thread_rng().gen_range(0..bound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{Clock, Entropy, SystemClock, ThreadEntropy};

    #[test]
    fn thread_entropy_stays_in_bounds() {
        let entropy = ThreadEntropy;
        for _ in 0..1_000 {
            assert!(entropy.pick(36) < 36);
        }
        assert_eq!(entropy.pick(0), 0);
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
