//! Injected collaborators of the marketplace reducer.

use crate::config::EngineConfig;
use skillswap_core::environment::{Clock, SystemClock};
use skillswap_core::stores::{
    IdentityDirectory, IntentJournal, LedgerStore, ListingCatalog, SessionStore,
};
use skillswap_runtime::RetryPolicy;
use std::sync::Arc;

/// Everything the reducer's effects may call.
///
/// Collaborators are `Arc<dyn Trait>` so effects can capture clones of them.
#[derive(Clone)]
pub struct MarketplaceEnvironment {
    /// Credit balances
    pub ledger: Arc<dyn LedgerStore>,
    /// Session rows
    pub sessions: Arc<dyn SessionStore>,
    /// Accounts and expert identities
    pub directory: Arc<dyn IdentityDirectory>,
    /// Listing rows
    pub catalog: Arc<dyn ListingCatalog>,
    /// Optional durable log of two-step mutations
    pub journal: Option<Arc<dyn IntentJournal>>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Engine settings
    pub config: EngineConfig,
    read_policy: RetryPolicy,
}

impl MarketplaceEnvironment {
    /// Environment without an intent journal, using the system clock.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        sessions: Arc<dyn SessionStore>,
        directory: Arc<dyn IdentityDirectory>,
        catalog: Arc<dyn ListingCatalog>,
        config: EngineConfig,
    ) -> Self {
        let read_policy = config.read_policy();
        Self {
            ledger,
            sessions,
            directory,
            catalog,
            journal: None,
            clock: Arc::new(SystemClock),
            config,
            read_policy,
        }
    }

    /// Record transfer and booking intents in `journal`.
    #[must_use]
    pub fn with_journal(mut self, journal: Arc<dyn IntentJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the backoff used for store reads.
    #[must_use]
    pub fn with_read_policy(mut self, policy: RetryPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    /// Backoff used for store reads
    #[must_use]
    pub const fn read_policy(&self) -> &RetryPolicy {
        &self.read_policy
    }

    /// The journal, if intents should be recorded.
    #[must_use]
    pub fn intent_journal(&self) -> Option<Arc<dyn IntentJournal>> {
        if self.config.journal_intents {
            self.journal.clone()
        } else {
            None
        }
    }
}

impl std::fmt::Debug for MarketplaceEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketplaceEnvironment")
            .field("journal", &self.journal.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
