//! Given-When-Then harness for reducers
//!
//! A test describes the starting state, one or more actions, and assertions
//! on the resulting state and on the effects the *last* action returned.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use bookrental_core::{effect::Effect, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// use bookrental_testing::ReducerTest;
///
/// ReducerTest::new(LendingReducer::new())
///     .with_env(test_environment())
///     .given_state(state_with_one_book())
///     .given_actions(vec![LendingAction::Rent { book_id, member_id }])
///     .when_action(LendingAction::Rent { book_id, member_id: other })
///     .then_state(|state| {
///         assert!(state.last_error.is_some());
///     })
///     .then_effects(assertions::assert_no_effects)
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    history: Vec<A>,
    action: Option<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            history: Vec::new(),
            action: None,
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Actions reduced before the action under test (Given)
    ///
    /// Their effects are discarded.
    #[must_use]
    pub fn given_actions(mut self, actions: Vec<A>) -> Self {
        self.history = actions;
        self
    }

    /// Set the action to test (When)
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.action = Some(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the effects of the action under test (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        let action = self.action.expect("Action must be set with when_action()");

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        for earlier in self.history {
            let _ = self.reducer.reduce(&mut state, earlier, &env);
        }

        let effects = self.reducer.reduce(&mut state, action, &env);

        for assertion in self.state_assertions {
            assertion(&state);
        }

        for assertion in self.effect_assertions {
            assertion(&effects);
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use bookrental_core::effect::Effect;

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if any effect would do something when executed.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().all(Effect::is_none),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert that effects contain at least one Future effect, at any depth
    ///
    /// # Panics
    ///
    /// Panics if no Future effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        fn contains_future<A>(effect: &Effect<A>) -> bool {
            match effect {
                Effect::Future(_) => true,
                Effect::Parallel(inner) => inner.iter().any(contains_future),
                Effect::None => false,
            }
        }

        assert!(
            effects.iter().any(contains_future),
            "Expected at least one Future effect, but none found"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookrental_core::{SmallVec, smallvec};

    #[derive(Clone, Debug)]
    struct ShelfState {
        on_shelf: u32,
    }

    #[derive(Clone, Debug)]
    enum ShelfAction {
        Shelve,
        Lend,
        Announce,
    }

    struct ShelfReducer;

    struct ShelfEnv;

    impl Reducer for ShelfReducer {
        type State = ShelfState;
        type Action = ShelfAction;
        type Environment = ShelfEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                ShelfAction::Shelve => {
                    state.on_shelf += 1;
                    smallvec![Effect::None]
                },
                ShelfAction::Lend => {
                    state.on_shelf = state.on_shelf.saturating_sub(1);
                    SmallVec::new()
                },
                ShelfAction::Announce => {
                    smallvec![Effect::merge(vec![Effect::future(async { None })])]
                },
            }
        }
    }

    #[test]
    fn test_reducer_test_shelve() {
        ReducerTest::new(ShelfReducer)
            .with_env(ShelfEnv)
            .given_state(ShelfState { on_shelf: 0 })
            .when_action(ShelfAction::Shelve)
            .then_state(|state| {
                assert_eq!(state.on_shelf, 1);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_given_actions_run_before_action_under_test() {
        ReducerTest::new(ShelfReducer)
            .with_env(ShelfEnv)
            .given_state(ShelfState { on_shelf: 0 })
            .given_actions(vec![ShelfAction::Shelve, ShelfAction::Shelve])
            .when_action(ShelfAction::Lend)
            .then_state(|state| {
                assert_eq!(state.on_shelf, 1);
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 0))
            .run();
    }

    #[test]
    fn test_nested_future_is_found() {
        ReducerTest::new(ShelfReducer)
            .with_env(ShelfEnv)
            .given_state(ShelfState { on_shelf: 0 })
            .when_action(ShelfAction::Announce)
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }
}
