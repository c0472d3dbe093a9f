//! # SkillSwap Core
//!
//! Core traits and types for the SkillSwap credit ledger and booking engine.
//!
//! The engine follows a reducer architecture: every operation is an action
//! reduced against the client state cache, and every remote call is an effect
//! description executed by the runtime.
//!
//! ## Core Concepts
//!
//! - **State**: the client state cache (balance, sessions, booking flow)
//! - **Action**: commands from the UI and results fed back by effects
//! - **Reducer**: `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: a description of remote work, executed by the runtime
//! - **Environment**: injected collaborators (stores, clock, configuration)
//!
//! ## Collaborators
//!
//! The remote row stores are modelled as dyn-compatible traits in [`stores`]:
//! [`stores::LedgerStore`], [`stores::SessionStore`],
//! [`stores::IdentityDirectory`], [`stores::ListingCatalog`] and
//! [`stores::IntentJournal`]. None of them offers cross-row atomicity.
//!
//! Store rows and their mapping onto domain values live in [`rows`]; the
//! engine only ever sees the domain types from [`types`].

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{smallvec, SmallVec};

pub mod rows;
pub mod stores;
pub mod types;

/// Reducer module - the trait holding all business logic
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Effects returned by a single reduction.
    ///
    /// Most actions produce zero or one effect, so four inline slots avoid
    /// heap allocation on every reduction.
    pub type Effects<Action> = SmallVec<[Effect<Action>; 4]>;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for LedgerReducer {
    ///     type State = ClientState;
    ///     type Action = MarketplaceAction;
    ///     type Environment = MarketplaceEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut ClientState,
    ///         action: MarketplaceAction,
    ///         env: &MarketplaceEnvironment,
    ///     ) -> Effects<MarketplaceAction> {
    ///         match action {
    ///             MarketplaceAction::DebitCredits { .. } => smallvec![],
    ///             _ => smallvec![],
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// Validates the action, updates state in place and returns the
        /// effects the runtime must execute. Never performs I/O itself.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Effects<Self::Action>;
    }
}

/// Effect module - side effect descriptions
///
/// Effects are values. Reducers return them and the runtime executes them,
/// feeding any produced action back into the reducer.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Effect type - describes a side effect to be executed
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    impl<Action> std::fmt::Debug for Effect<Action> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action: Send + 'static> Effect<Action> {
        /// Wrap an async computation that always yields a follow-up action
        pub fn task<F>(future: F) -> Self
        where
            F: Future<Output = Action> + Send + 'static,
        {
            Effect::Future(Box::pin(async move { Some(future.await) }))
        }

        /// Feed an already-known action back through the runtime
        ///
        /// Used for outcomes decided entirely inside the reducer, so that
        /// callers waiting on the action broadcast still observe them.
        pub fn emit(action: Action) -> Self {
            Effect::Future(Box::pin(futures::future::ready(Some(action))))
        }

        /// Returns true for [`Effect::None`]
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

/// Environment module - dependency injection traits
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
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
}

#[cfg(test)]
mod tests {
    use super::effect::Effect;
    use super::environment::{Clock, SystemClock};

    #[test]
    fn emitted_effect_yields_its_action() {
        let effect = Effect::emit(7_u32);
        let Effect::Future(fut) = effect else {
            unreachable!("emit always builds a future effect");
        };
        assert_eq!(tokio_test::block_on(fut), Some(7));
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        assert!(clock.now() >= first);
    }
}
