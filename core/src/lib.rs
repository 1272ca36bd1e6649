//! # Book Rental Core
//!
//! Core traits and types for the book rental reducer architecture.
//!
//! Every feature is expressed as a `Reducer`:
//!
//! - **State**: the domain aggregate owned by a store
//! - **Action**: every input to the reducer (commands and the events they produce)
//! - **Reducer**: `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: a description of a side effect, executed later by the runtime
//! - **Environment**: injected dependencies (clock, id generator, repositories)
//!
//! Reducers never perform I/O themselves. Anything that touches the outside
//! world (saving a rental) is returned as an
//! [`effect::Effect`] and run by `bookrental-runtime`.
//!
//! ## Example
//!
//! ```ignore
//! use bookrental_core::{effect::Effect, reducer::Reducer, SmallVec};
//!
//! impl Reducer for ShelfReducer {
//!     type State = ShelfState;
//!     type Action = ShelfAction;
//!     type Environment = ShelfEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut ShelfState,
//!         action: ShelfAction,
//!         env: &ShelfEnvironment,
//!     ) -> SmallVec<[Effect<ShelfAction>; 4]> {
//!         SmallVec::new()
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, NaiveDate, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Reducer module - the trait that holds all business logic
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// Most reducers produce zero to four effects per action, so the
        /// result is a `SmallVec` that stays on the stack in the common case.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - side effect descriptions
///
/// Effects are values, not execution. The runtime decides when and where
/// they run and feeds any action they produce back into the reducer.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what
    /// should happen, returned from reducers and executed by the Store.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Wrap an async block as an `Effect::Future`
        pub fn future<F>(fut: F) -> Self
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Effect::Future(Box::pin(fut))
        }

        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Whether this effect does nothing when executed
        #[must_use]
        pub fn is_none(&self) -> bool {
            match self {
                Effect::None => true,
                Effect::Parallel(effects) => effects.iter().all(Effect::is_none),
                Effect::Future(_) => false,
            }
        }
    }
}

/// Environment module - dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter, so reducers stay deterministic under test.
pub mod environment {
    use chrono::{DateTime, NaiveDate, Utc};
    use uuid::Uuid;

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - uses system clock
    /// let clock = SystemClock;
    ///
    /// // Test - fixed time for deterministic tests
    /// let clock = FixedClock::new(time);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;

        /// The current calendar day (UTC)
        fn today(&self) -> NaiveDate {
            self.now().date_naive()
        }
    }

    /// Wall-clock time source
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Issues identifiers for newly created aggregates
    ///
    /// Injected instead of a shared static counter so that id issuance is
    /// explicit, concurrent-safe, and predictable in tests.
    pub trait IdGenerator: Send + Sync {
        /// Issue a fresh identifier
        fn next_id(&self) -> Uuid;
    }

    /// Random (v4) identifiers
    #[derive(Debug, Clone, Copy, Default)]
    pub struct RandomIds;

    impl IdGenerator for RandomIds {
        fn next_id(&self) -> Uuid {
            Uuid::new_v4()
        }
    }
}
