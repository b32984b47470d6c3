//! # Agrogate Runtime
//!
//! Runtime for Agrogate reducers: the [`Store`](store::Store) owns a flow's
//! state, runs the reducer for each action and executes the returned
//! effects, feeding any produced actions back into the reducer.
//!
//! Effects are executed inline on the caller's task. A caller that wraps
//! [`Store::send`](store::Store::send) in a timeout therefore cancels the
//! whole flow when it fires; nothing keeps running in the background.
//! Flows whose effects write to external systems should instead carry the
//! deadline in their state and use
//! [`Store::send_and_wait`](store::Store::send_and_wait), so they can stop
//! before a write rather than in the middle of one.
//!
//! ## Example
//!
//! ```ignore
//! use agrogate_runtime::Store;
//! use std::time::Duration;
//!
//! let store = Store::new(FlowState::default(), FlowReducer::new(), environment);
//! let outcome = store
//!     .send_and_wait_for(FlowAction::Start, |a| a.is_terminal(), Duration::from_secs(5))
//!     .await?;
//! ```

pub mod retry;

pub use retry::{RetryPolicy, RetryPolicyBuilder, retry_transient};
pub use store::Store;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Timeout waiting for terminal action
        ///
        /// Returned by `send_and_wait_for` when the deadline expires before
        /// the flow produced a matching action. Effects still in flight
        /// were dropped.
        #[error("Timeout waiting for action")]
        Timeout,

        /// The flow settled without producing a matching action.
        #[error("Flow finished without a terminal action")]
        NoTerminalAction,
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::error::StoreError;
    use agrogate_core::effect::Effect;
    use agrogate_core::reducer::Reducer;
    use futures::future::{BoxFuture, FutureExt, join_all};
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::RwLock;

    /// The Store - runtime coordinator for a reducer
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
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync,
        A: Send + Clone + std::fmt::Debug + 'static,
        S: Send + Sync,
        E: Send + Sync,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
            }
        }

        /// Send an action and run the flow until it settles.
        ///
        /// The reducer runs under the state write lock; effects run after the
        /// lock is released. Every action an effect produces is reduced in
        /// turn (breadth first) until no effect produces anything further.
        ///
        /// Returns the actions produced by effects, in the order they were
        /// reduced. The initial action is not included.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Vec<A> {
            let mut produced = Vec::new();
            let mut pending = VecDeque::from([action]);

            while let Some(action) = pending.pop_front() {
                tracing::trace!(?action, "Reducing action");
                let effects = {
                    let mut state = self.state.write().await;
                    self.reducer.reduce(&mut state, action, &self.environment)
                };

                for effect in effects {
                    for next in self.execute_effect(effect).await {
                        produced.push(next.clone());
                        pending.push_back(next);
                    }
                }
            }

            produced
        }

        /// Send an action, run the flow until it settles and return the
        /// first produced action matching `predicate`.
        ///
        /// Use this when the reducer enforces its own deadlines.
        ///
        /// # Errors
        ///
        /// [`StoreError::NoTerminalAction`]: no produced action matched
        pub async fn send_and_wait<F>(&self, action: A, predicate: F) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            self.send(action)
                .await
                .into_iter()
                .find(|a| predicate(a))
                .ok_or(StoreError::NoTerminalAction)
        }

        /// Send an action and wait for a matching result action
        ///
        /// The flow runs under `timeout`; when it expires the in-flight
        /// effects are dropped and [`StoreError::Timeout`] is returned.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: the deadline expired first
        /// - [`StoreError::NoTerminalAction`]: the flow settled but no produced
        ///   action matched `predicate`
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            tokio::time::timeout(timeout, self.send_and_wait(action, predicate))
                .await
                .map_err(|_| {
                    tracing::warn!(timeout_ms = timeout.as_millis(), "Flow deadline expired");
                    StoreError::Timeout
                })?
        }

        /// Read a value out of the current state.
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&state)
        }

        /// Execute one effect, returning the actions it produced.
        fn execute_effect(&self, effect: Effect<A>) -> BoxFuture<'_, Vec<A>> {
            async move {
                match effect {
                    Effect::None => {
                        metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                        Vec::new()
                    },
                    Effect::Future(fut) => {
                        metrics::counter!("store.effects.executed", "type" => "future")
                            .increment(1);
                        fut.await.into_iter().collect()
                    },
                    Effect::Parallel(effects) => {
                        metrics::counter!("store.effects.executed", "type" => "parallel")
                            .increment(1);
                        tracing::trace!(count = effects.len(), "Executing Effect::Parallel");
                        join_all(effects.into_iter().map(|e| self.execute_effect(e)))
                            .await
                            .into_iter()
                            .flatten()
                            .collect()
                    },
                    Effect::Sequential(effects) => {
                        metrics::counter!("store.effects.executed", "type" => "sequential")
                            .increment(1);
                        tracing::trace!(count = effects.len(), "Executing Effect::Sequential");
                        let mut produced = Vec::new();
                        for effect in effects {
                            produced.extend(self.execute_effect(effect).await);
                        }
                        produced
                    },
                }
            }
            .boxed()
        }
    }
}
