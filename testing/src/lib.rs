//! # SkillSwap Testing
//!
//! Testing utilities for the SkillSwap engine.
//!
//! This crate provides:
//! - [`ReducerTest`]: Given-When-Then reducer tests, with an async mode that
//!   executes effects and feeds their actions back
//! - [`FixedClock`]: deterministic time
//! - In-memory collaborator stores with call logs and fault injection
//!   ([`memory`])
//! - Fixture builders ([`helpers`]) and proptest strategies ([`properties`])
//!
//! ## Example
//!
//! ```ignore
//! use skillswap_testing::{memory::*, helpers, test_clock};
//!
//! #[tokio::test]
//! async fn transfer_moves_credits() {
//!     let harness = StoreHarness::new();
//!     let profiles = InMemoryProfiles::new(harness.clone())
//!         .with_account(helpers::account("u1", 10))
//!         .with_account(helpers::account("u2", 0));
//!     // build the environment, sign in, transfer ...
//!     assert_eq!(harness.log().count(Operation::WriteBalance), 2);
//! }
//! ```

use chrono::{DateTime, Utc};
use skillswap_core::environment::Clock;

pub mod memory;

/// Mock implementations of Environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible. Clones share
    /// the same time, so a test can [`FixedClock::advance`] the clock held by
    /// an environment.
    ///
    /// # Example
    ///
    /// ```
    /// use skillswap_testing::mocks::FixedClock;
    /// use skillswap_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
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

        /// Move the clock forward.
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self
                .time
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self
                .time
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
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
}

/// Fixture builders for domain values.
pub mod helpers {
    use skillswap_core::types::{
        Account, Credits, ExpertProfile, Level, ListingId, ListingRecord, Origin, Role,
        UserId,
    };

    /// A persisted learner account with an email of `<id>@skillswap.test`.
    #[must_use]
    pub fn account(id: &str, balance: u64) -> Account {
        Account {
            id: UserId::new(id),
            name: format!("User {id}"),
            email: Some(email(id)),
            role: Role::Learner,
            balance: Credits::new(balance),
            origin: Origin::Persisted,
        }
    }

    /// The email used by [`account`].
    #[must_use]
    pub fn email(id: &str) -> String {
        format!("{id}@skillswap.test")
    }

    /// An expert identity teaching `skills`.
    #[must_use]
    pub fn expert(id: &str, name: &str, skills: &[&str]) -> ExpertProfile {
        ExpertProfile {
            id: UserId::new(id),
            name: name.to_string(),
            avatar: format!("https://avatars.skillswap.test/{id}.png"),
            title: "Expert".to_string(),
            rating: 4.5,
            skills: skills.iter().map(ToString::to_string).collect(),
            language: Some("English".to_string()),
        }
    }

    /// A stored listing row.
    #[must_use]
    pub fn listing_record(id: &str, expert_id: &str, skill: &str, cost: u64) -> ListingRecord {
        ListingRecord {
            id: ListingId::new(id),
            expert_id: UserId::new(expert_id),
            skill_name: skill.to_string(),
            description: format!("Learn {skill}"),
            level: Level::Intermediate,
            credit_cost: Credits::new(cost),
            tags: vec![skill.to_string()],
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use skillswap_core::types::Credits;

    /// Balances an account may hold.
    pub fn balance() -> impl Strategy<Value = Credits> {
        (0u64..1_000).prop_map(Credits::new)
    }

    /// Positive amounts a user may request.
    pub fn positive_amount() -> impl Strategy<Value = Credits> {
        (1u64..1_000).prop_map(Credits::new)
    }

    /// Any requested amount, zero included.
    pub fn amount() -> impl Strategy<Value = Credits> {
        (0u64..1_000).prop_map(Credits::new)
    }
}

// Re-export commonly used items
pub use mocks::{test_clock, FixedClock};
pub use reducer_test::{assertions, drive, ReducerTest};
