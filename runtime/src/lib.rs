//! # SkillSwap Runtime
//!
//! The `Store` that drives the SkillSwap reducers.
//!
//! ## Core Components
//!
//! - **Store**: owns the client state cache, runs the reducer, executes
//!   effects and feeds the actions they produce back into the reducer
//! - **Action broadcast**: every action is published to observers right after
//!   it has been reduced, so an observer woken by an action always reads a
//!   state that already reflects it
//! - **Retry**: exponential backoff for idempotent reads ([`retry`])
//! - **Metrics**: counter names and descriptions ([`metrics`])
//!
//! ## Example
//!
//! ```ignore
//! use skillswap_runtime::Store;
//!
//! let store = Store::new(ClientState::default(), MarketplaceReducer, environment);
//!
//! let outcome = store
//!     .send_and_wait_for(action, |a| a.concludes(request), timeout)
//!     .await?;
//!
//! let balance = store.state(|s| s.balance()).await;
//! ```

use skillswap_core::{effect::Effect, reducer::Reducer};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, RwLock};

/// Metric names and descriptions
pub mod metrics;

/// Exponential backoff for reads
pub mod retry;

pub use retry::{retry_read, RetryPolicy};

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum RuntimeError {
        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// No matching action arrived before the deadline.
        ///
        /// The effects that were started keep running; only the wait ended.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::RuntimeError;

/// Handle for waiting on the effects started by one `send`.
///
/// Tracks only the effects returned for that action, not the effects of
/// actions they feed back. Use [`Store::settle`] to wait for a whole cascade.
#[derive(Clone)]
pub struct EffectHandle {
    pending: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let pending = Arc::new(AtomicUsize::new(0));
        let (notifier, completion) = watch::channel(());
        (
            Self {
                pending: Arc::clone(&pending),
                completion,
            },
            EffectTracking { pending, notifier },
        )
    }

    /// Wait until every effect started by the originating `send` finished.
    pub async fn wait(&mut self) {
        while self.pending.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait with an upper bound.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Timeout`] if effects are still running at the deadline.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), RuntimeError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| RuntimeError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending", &self.pending.load(Ordering::SeqCst))
            .finish()
    }
}

#[derive(Clone)]
struct EffectTracking {
    pending: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
}

/// Decrements the per-send and global counters when an effect task ends,
/// including when it panics.
struct EffectGuard {
    tracking: EffectTracking,
    global: Arc<AtomicUsize>,
}

impl Drop for EffectGuard {
    fn drop(&mut self) {
        self.global.fetch_sub(1, Ordering::SeqCst);
        if self.tracking.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.tracking.notifier.send(());
        }
    }
}

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        broadcast, Arc, AtomicBool, AtomicUsize, Duration, Effect, EffectGuard, EffectHandle,
        EffectTracking, Ordering, Reducer, RuntimeError, RwLock,
    };

    const DEFAULT_BROADCAST_CAPACITY: usize = 64;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock`; reductions are serialized)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected collaborators)
    /// 4. Effect execution (spawned tasks whose actions are fed back)
    ///
    /// Cloning a Store yields another handle to the same state.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a store with the default broadcast capacity.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(
                initial_state,
                reducer,
                environment,
                DEFAULT_BROADCAST_CAPACITY,
            )
        }

        /// Create a store whose action broadcast buffers `capacity` actions
        /// per slow observer before it starts lagging.
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity.max(1));
            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                action_broadcast,
            }
        }

        /// The injected environment.
        #[must_use]
        pub fn environment(&self) -> &E {
            &self.environment
        }

        /// Send an action to the store
        ///
        /// 1. Acquires the write lock and reduces the action
        /// 2. Releases the lock and broadcasts the action to observers
        /// 3. Spawns the returned effects; actions they produce come back here
        ///
        /// Returns once the effects are spawned, not once they complete.
        ///
        /// # Errors
        ///
        /// [`RuntimeError::ShutdownInProgress`] once [`Store::shutdown`] ran.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, RuntimeError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                return Err(RuntimeError::ShutdownInProgress);
            }
            Ok(self.reduce_and_spawn(action).await)
        }

        /// Reduce, broadcast and spawn effects, without the shutdown gate.
        ///
        /// Actions fed back by running effects come through here, so a
        /// sequence that started before shutdown runs to its end.
        async fn reduce_and_spawn(&self, action: A) -> EffectHandle {
            metrics::counter!(crate::metrics::ACTIONS).increment(1);
            let observed = action.clone();

            let effects = {
                let mut state = self.state.write().await;
                self.reducer.reduce(&mut state, action, &self.environment)
            };
            tracing::trace!(effects = effects.len(), "Reducer completed");

            // No receivers is not an error.
            let _ = self.action_broadcast.send(observed);

            let (handle, tracking) = EffectHandle::new();
            for effect in effects {
                self.execute_effect(effect, &tracking);
            }
            handle
        }

        /// Send an action and wait for the first reduced action matching
        /// `predicate`.
        ///
        /// Subscribes before sending, so a matching action produced
        /// immediately cannot be missed. Because actions are broadcast after
        /// reduction, the state read after this returns already includes the
        /// matching action.
        ///
        /// # Errors
        ///
        /// - [`RuntimeError::Timeout`]: nothing matched before `timeout`
        /// - [`RuntimeError::ChannelClosed`]: the broadcast channel closed
        /// - [`RuntimeError::ShutdownInProgress`]: the store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, RuntimeError>
        where
            F: Fn(&A) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();
            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(RuntimeError::ChannelClosed);
                        }
                    }
                }
            })
            .await
            .map_err(|_| RuntimeError::Timeout)?
        }

        /// Subscribe to every action after it has been reduced.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let balance = store.state(|s| s.balance()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&state)
        }

        /// Number of effect tasks currently running.
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Wait until no effect is running, including effects of fed-back
        /// actions.
        ///
        /// # Errors
        ///
        /// [`RuntimeError::Timeout`] if effects are still running at the deadline.
        pub async fn settle(&self, timeout: Duration) -> Result<(), RuntimeError> {
            tokio::time::timeout(timeout, async {
                while self.pending_effects() > 0 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
            .await
            .map_err(|_| RuntimeError::Timeout)
        }

        /// Stop accepting actions and wait for running effects.
        ///
        /// Only [`Store::send`] is closed: actions produced by effects that
        /// are already running are still reduced, and their follow-up effects
        /// are awaited too.
        ///
        /// # Errors
        ///
        /// [`RuntimeError::ShutdownTimeout`] if effects are still running at
        /// the deadline.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), RuntimeError> {
            tracing::info!("Initiating store shutdown");
            self.shutdown.store(true, Ordering::Release);

            match self.settle(timeout).await {
                Ok(()) => {
                    tracing::info!("All effects completed, shutdown successful");
                    Ok(())
                }
                Err(_) => {
                    let pending = self.pending_effects();
                    tracing::error!(pending_effects = pending, "Shutdown timed out");
                    Err(RuntimeError::ShutdownTimeout(pending))
                }
            }
        }

        fn execute_effect(&self, effect: Effect<A>, tracking: &EffectTracking) {
            match effect {
                Effect::None => {}
                Effect::Future(fut) => {
                    metrics::counter!(crate::metrics::EFFECTS_SPAWNED).increment(1);
                    tracking.pending.fetch_add(1, Ordering::SeqCst);
                    self.pending_effects.fetch_add(1, Ordering::SeqCst);

                    let guard = EffectGuard {
                        tracking: tracking.clone(),
                        global: Arc::clone(&self.pending_effects),
                    };
                    let store = self.clone();

                    tokio::spawn(async move {
                        // Dropped after the fed-back action has spawned its own
                        // effects, so the global counter never dips to zero
                        // mid-cascade.
                        let _guard = guard;
                        if let Some(action) = fut.await {
                            store.reduce_and_spawn(action).await;
                        }
                    });
                }
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

pub use store::Store;
