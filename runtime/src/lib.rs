//! # Book Rental Runtime
//!
//! The Store runtime that owns a reducer's state and executes its effects.
//!
//! ## Core Components
//!
//! - **Store**: holds state behind a `RwLock`, runs the reducer, executes effects
//! - **Effect Executor**: runs effect descriptions and feeds produced actions back
//! - **`EffectHandle`**: lets a caller wait until the effects of one action finish
//!
//! Every action is reduced while holding the state write lock, so two actions
//! never interleave: the lock is the unit of work for a command.
//!
//! ## Example
//!
//! ```ignore
//! use bookrental_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Send an action
//! store.send(Action::DoSomething).await?;
//!
//! // Read state
//! let value = store.state(|s| s.some_field).await;
//! ```

use bookrental_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// Returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timed out waiting for effects of an action to complete
        #[error("Timed out waiting for effects to complete")]
        Timeout,
    }
}

pub use error::StoreError;

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] so a caller can wait until every effect
/// spawned by that action has finished (for example, until a rental has
/// been written to its repository).
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(Action::Start).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// // All effects from Action::Start are now complete
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    /// Create a new handle together with the tracking context used by the executor
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (_tx, rx) = watch::channel(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Number of effects from this action still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                // Every tracker is gone, nothing left to wait for
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires first.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: effect tracking context passed through effect execution
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    /// Increment the effect counter (effect started)
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the effect counter (effect completed)
    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Counter reached zero, notify waiters
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements the effect counter on drop
///
/// The counter is decremented even if the effect panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, DecrementGuard, Duration, Effect,
        EffectHandle, EffectTracking, Ordering, Reducer, RwLock, StoreError,
    };

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
        A: Send + 'static,
        S: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Send an action to the store
        ///
        /// Reduces the action under the state write lock, then starts its
        /// effects. Returns once the reducer has run; effects continue in the
        /// background and can be awaited through the returned handle.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            let ((), handle) = self.send_and_inspect(action, |_| ()).await?;
            Ok(handle)
        }

        /// Send an action and read state before the write lock is released
        ///
        /// `inspect` observes exactly the state this action produced; no other
        /// action can run between the reducer and the inspection. This is how
        /// request/response callers read the outcome of their own command.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        pub async fn send_and_inspect<F, T>(
            &self,
            action: A,
            inspect: F,
        ) -> Result<(T, EffectHandle), StoreError>
        where
            F: FnOnce(&S) -> T,
        {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.commands.total").increment(1);

            let (handle, tracking) = EffectHandle::new();

            let (output, effects) = {
                let mut state = self.state.write().await;
                tracing::trace!("Acquired write lock on state");

                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                tracing::trace!("Reducer completed, returned {} effects", effects.len());

                (inspect(&*state), effects)
            };

            for effect in effects {
                self.execute_effect_internal(effect, tracking.clone());
            }

            Ok((output, handle))
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let book_count = store.state(|s| s.books.len()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Whether [`Store::shutdown`] has been called
        #[must_use]
        pub fn is_shutting_down(&self) -> bool {
            self.shutdown.load(Ordering::Acquire)
        }

        /// Stop accepting actions and wait for running effects to drain
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] with the number of effects
        /// still running if they do not finish within `timeout`.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Store shutdown initiated");
            self.shutdown.store(true, Ordering::Release);

            let drained = tokio::time::timeout(timeout, async {
                while self.pending_effects.load(Ordering::SeqCst) > 0 {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await;

            match drained {
                Ok(()) => {
                    tracing::info!("Store shutdown completed");
                    Ok(())
                },
                Err(_) => {
                    let remaining = self.pending_effects.load(Ordering::SeqCst);
                    tracing::warn!(remaining, "Store shutdown timed out");
                    Err(StoreError::ShutdownTimeout(remaining))
                },
            }
        }

        /// Start tracking one spawned effect, globally and for its action
        fn begin_effect(&self, tracking: &EffectTracking) -> (DecrementGuard, AtomicCounterGuard) {
            tracking.increment();
            self.pending_effects.fetch_add(1, Ordering::SeqCst);
            (
                DecrementGuard(tracking.clone()),
                AtomicCounterGuard(Arc::clone(&self.pending_effects)),
            )
        }

        /// Execute an effect with tracking
        ///
        /// - `None`: No-op
        /// - `Future`: runs the computation, sends the resulting action if `Some`
        /// - `Parallel`: executes effects concurrently
        ///
        /// Effect failures are the effect's own business: they surface as
        /// feedback actions, never as errors from `send`.
        #[allow(clippy::needless_pass_by_value)] // tracking is cloned per spawned task
        fn execute_effect_internal(&self, effect: Effect<A>, tracking: EffectTracking) {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    let guards = self.begin_effect(&tracking);
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guards = guards;

                        if let Some(action) = fut.await {
                            tracing::trace!("Effect::Future produced an action, sending to store");
                            if let Err(error) = store.send(action).await {
                                tracing::debug!(%error, "Dropped feedback action");
                            }
                        }
                    });
                },
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    for effect in effects {
                        self.execute_effect_internal(effect, tracking.clone());
                    }
                },
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bookrental_core::{SmallVec, smallvec};

    #[derive(Clone, Debug, Default)]
    struct ShelfState {
        stocked: u32,
        log: Vec<&'static str>,
    }

    #[derive(Clone, Debug)]
    enum ShelfAction {
        Stock,
        StockLater,
        Restocked,
        StockTwiceLater,
    }

    #[derive(Clone)]
    struct ShelfReducer;

    impl Reducer for ShelfReducer {
        type State = ShelfState;
        type Action = ShelfAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut ShelfState,
            action: ShelfAction,
            _env: &(),
        ) -> SmallVec<[Effect<ShelfAction>; 4]> {
            match action {
                ShelfAction::Stock => {
                    state.stocked += 1;
                    SmallVec::new()
                },
                ShelfAction::StockLater => {
                    smallvec![Effect::future(async { Some(ShelfAction::Restocked) })]
                },
                ShelfAction::Restocked => {
                    state.stocked += 1;
                    state.log.push("restocked");
                    SmallVec::new()
                },
                ShelfAction::StockTwiceLater => smallvec![Effect::merge(vec![
                    Effect::future(async { Some(ShelfAction::Restocked) }),
                    Effect::future(async { Some(ShelfAction::Restocked) }),
                ])],
            }
        }
    }

    fn store() -> Store<ShelfState, ShelfAction, (), ShelfReducer> {
        Store::new(ShelfState::default(), ShelfReducer, ())
    }

    #[tokio::test]
    async fn test_send_updates_state() {
        let store = store();
        store.send(ShelfAction::Stock).await.unwrap();
        store.send(ShelfAction::Stock).await.unwrap();
        assert_eq!(store.state(|s| s.stocked).await, 2);
    }

    #[tokio::test]
    async fn test_send_and_inspect_sees_own_result() {
        let store = store();
        let (stocked, _handle) = store
            .send_and_inspect(ShelfAction::Stock, |s| s.stocked)
            .await
            .unwrap();
        assert_eq!(stocked, 1);
    }

    #[tokio::test]
    async fn test_future_effect_feeds_back_action() {
        let store = store();

        let mut handle = store.send(ShelfAction::StockLater).await.unwrap();
        handle
            .wait_with_timeout(Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(store.state(|s| s.log.clone()).await, vec!["restocked"]);
        // The feedback send happens inside the effect, so it is done once the handle resolves
        assert_eq!(store.state(|s| s.stocked).await, 1);
    }

    #[tokio::test]
    async fn test_parallel_effects_are_all_awaited() {
        let store = store();
        let mut handle = store.send(ShelfAction::StockTwiceLater).await.unwrap();
        handle
            .wait_with_timeout(Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(handle.pending(), 0);
        assert_eq!(store.state(|s| s.stocked).await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_sends_are_serialized() {
        let store = store();

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    let _ = store.send(ShelfAction::Stock).await;
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.state(|s| s.stocked).await, 20);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_actions() {
        let store = store();
        store.shutdown(Duration::from_secs(1)).await.unwrap();

        assert!(store.is_shutting_down());
        assert_eq!(
            store.send(ShelfAction::Stock).await.unwrap_err(),
            StoreError::ShutdownInProgress
        );
    }

    #[tokio::test]
    async fn test_completed_handle_does_not_block() {
        let mut handle = EffectHandle::completed();
        assert_eq!(handle.pending(), 0);
        handle
            .wait_with_timeout(Duration::from_millis(50))
            .await
            .unwrap();
    }
}
