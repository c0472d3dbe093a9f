//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use skillswap_core::types::{Credits, UserId};
use skillswap_engine::{AuthIdentity, EngineConfig, Marketplace, MarketplaceEnvironment};
use skillswap_runtime::RetryPolicy;
use skillswap_testing::memory::{
    InMemoryIntentJournal, InMemoryListingCatalog, InMemoryProfiles, InMemorySessionStore,
    StoreHarness,
};
use skillswap_testing::{helpers, test_clock, FixedClock};
use std::sync::Arc;
use std::time::Duration;

/// A marketplace wired to in-memory stores that share one harness.
pub struct World {
    pub marketplace: Marketplace,
    pub harness: StoreHarness,
    pub profiles: InMemoryProfiles,
    pub sessions: InMemorySessionStore,
    pub catalog: InMemoryListingCatalog,
    pub journal: InMemoryIntentJournal,
    pub clock: FixedClock,
}

impl World {
    /// `alice` (learner) and `bob` (learner) with the given balances, and the
    /// expert `mentor` teaching Rust through listing `l-rust` at 2 credits.
    pub fn new(alice: u64, bob: u64) -> Self {
        Self::with_outcome_timeout(alice, bob, Duration::from_secs(2))
    }

    /// As [`World::new`], waiting at most `outcome_timeout` for each command.
    pub fn with_outcome_timeout(alice: u64, bob: u64, outcome_timeout: Duration) -> Self {
        let harness = StoreHarness::new();
        let profiles = InMemoryProfiles::new(harness.clone())
            .with_account(helpers::account("alice", alice))
            .with_account(helpers::account("bob", bob))
            .with_expert(
                helpers::expert("mentor", "Priya Patel", &["Rust"]),
                Credits::new(40),
            );
        let sessions = InMemorySessionStore::new(harness.clone());
        let catalog = InMemoryListingCatalog::new(harness.clone()).with_listing(
            helpers::listing_record("l-rust", "mentor", "Async Rust", 2),
        );
        let journal = InMemoryIntentJournal::new(harness.clone());
        let clock = test_clock();

        let shared = Arc::new(profiles.clone());
        let environment = MarketplaceEnvironment::new(
            shared.clone(),
            Arc::new(sessions.clone()),
            shared,
            Arc::new(catalog.clone()),
            EngineConfig {
                outcome_timeout,
                ..EngineConfig::default()
            },
        )
        .with_journal(Arc::new(journal.clone()))
        .with_clock(Arc::new(clock.clone()))
        .with_read_policy(RetryPolicy::no_retry());

        Self {
            marketplace: Marketplace::new(environment),
            harness,
            profiles,
            sessions,
            catalog,
            journal,
            clock,
        }
    }

    /// Sign in as `user` and forget the calls this made.
    pub async fn sign_in(&self, user: &str) {
        let signed_in = self
            .marketplace
            .sign_in(AuthIdentity {
                user_id: UserId::new(user),
                display_name: None,
                email: Some(helpers::email(user)),
            })
            .await;
        assert!(signed_in.is_ok(), "sign-in failed: {signed_in:?}");
        self.harness.log().clear();
    }

    /// Stored balance of `user`.
    pub fn stored_balance(&self, user: &str) -> Credits {
        self.profiles
            .balance(&UserId::new(user))
            .unwrap_or_default()
    }
}
