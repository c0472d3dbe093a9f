//! # SkillSwap Engine
//!
//! Credit ledger, booking and session lifecycle for the SkillSwap
//! marketplace, built on the reducer runtime.
//!
//! ## Overview
//!
//! The engine runs against remote row stores that offer no multi-row
//! atomicity. Two operations need more than one write:
//!
//! - **Transfer**: debit the sender, then credit the recipient.
//! - **Booking**: debit the learner, then insert the session row.
//!
//! Both are modelled as chains of actions: each store write runs in an
//! effect and reports back through an action, and the reducer only issues
//! the next write after it has applied the previous one. A failure between
//! the two writes is surfaced as a partial failure
//! ([`EngineError::PartialTransferFailure`],
//! [`EngineError::BookingStepFailed`]) and, when an
//! [`IntentJournal`](skillswap_core::stores::IntentJournal) is configured,
//! leaves an open intent behind for reconciliation.
//!
//! ## Example
//!
//! ```no_run
//! use skillswap_engine::{AuthIdentity, Marketplace, MarketplaceEnvironment};
//! use skillswap_core::types::{Credits, UserId};
//! # async fn example(environment: MarketplaceEnvironment) -> Result<(), skillswap_engine::EngineError> {
//! let marketplace = Marketplace::new(environment);
//! marketplace
//!     .sign_in(AuthIdentity {
//!         user_id: UserId::new("u-42"),
//!         display_name: Some("Dana Scott".into()),
//!         email: Some("dana@example.com".into()),
//!     })
//!     .await?;
//! let receipt = marketplace.transfer("friend@example.com", Credits::new(3)).await?;
//! println!("Sent {} to {}", receipt.amount, receipt.recipient_name);
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod booking;
pub mod catalog;
pub mod config;
pub mod environment;
pub mod error;
pub mod inbox;
pub mod ledger;
pub mod lifecycle;
pub mod marketplace;
pub mod matching;
pub mod reducer;
pub mod seed;
pub mod state;

pub use action::{AuthIdentity, ListingDraft, MarketplaceAction, Outcome, RequestId};
pub use config::{ConfigError, EngineConfig};
pub use environment::MarketplaceEnvironment;
pub use error::{EngineError, Recovery, ValidationError};
pub use ledger::{CreditPackage, CREDIT_PACKAGES};
pub use marketplace::Marketplace;
pub use matching::MatchRequest;
pub use reducer::MarketplaceReducer;
pub use state::{BookingFlow, ClientSnapshot, ClientState};
