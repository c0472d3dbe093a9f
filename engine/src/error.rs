//! Engine error taxonomy.
//!
//! Every operation resolves to `Result<_, EngineError>`. Errors are values
//! carried by [`crate::action::MarketplaceAction::Failed`], so they are
//! `Clone` and compare by value.

use crate::inbox::ConversationId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use skillswap_core::types::{Credits, IntentId, ListingId, SessionId, SessionStatus, UserId};
use thiserror::Error;

/// Input rejected before any store call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ValidationError {
    /// Amounts and costs must be at least one credit
    #[error("amount must be a positive number of credits")]
    NonPositiveAmount,

    /// A transfer asks for more than the cached balance
    #[error("cannot transfer {requested}, only {available} available")]
    ExceedsBalance {
        /// Requested amount
        requested: Credits,
        /// Cached balance
        available: Credits,
    },

    /// Resulting balance does not fit in a credit counter
    #[error("balance would overflow")]
    BalanceOverflow,

    /// Transfer without a recipient address
    #[error("recipient email is required")]
    EmptyRecipient,

    /// The chosen slot is not after the current time
    #[error("slot {at} is not in the future")]
    SlotInPast {
        /// Rejected slot
        at: DateTime<Utc>,
    },

    /// Finalize without a slot
    #[error("choose a slot before confirming")]
    NoSlotChosen,

    /// Booking step outside a booking flow
    #[error("no booking in progress")]
    NoBookingInProgress,

    /// A booking is being committed
    #[error("a booking is already being committed")]
    BookingInProgress,

    /// Demo accounts cannot reach the stores
    #[error("not available in demo mode")]
    DemoMode,

    /// Only one session can be active
    #[error("session {0} is still active")]
    AnotherSessionActive(SessionId),

    /// Listing without a skill
    #[error("skill name is required")]
    EmptySkillName,

    /// Blank chat message
    #[error("message text is required")]
    EmptyMessage,

    /// Message to a conversation that does not exist
    #[error("unknown conversation {0}")]
    UnknownConversation(ConversationId),
}

/// How the UI should offer to recover from an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Recovery {
    /// Nothing was changed; the same request may be sent again
    Retry,
    /// Part of the mutation committed; retrying risks a double deduction
    ContactSupport,
    /// The request itself must change
    FixInput,
}

/// Errors surfaced by marketplace operations.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum EngineError {
    /// Input rejected locally
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// The operation needs a signed-in account
    #[error("Sign in to continue")]
    AuthenticationRequired,

    /// Cached balance is below the required amount
    #[error("Insufficient credits: need {required}, have {available} ({shortfall} short)")]
    InsufficientCredits {
        /// Amount needed
        required: Credits,
        /// Cached balance
        available: Credits,
        /// `required - available`
        shortfall: Credits,
    },

    /// Transfer addressed at the sender
    #[error("You cannot transfer credits to yourself")]
    SelfTransfer,

    /// Booking one's own listing
    #[error("You cannot book your own listing")]
    SelfBookingDenied,

    /// No account uses the recipient email
    #[error("No user found with email {email}")]
    RecipientNotFound {
        /// Address that was looked up
        email: String,
    },

    /// The first write failed; nothing changed
    #[error("Payment failed: {reason}")]
    PaymentStepFailed {
        /// Store error
        reason: String,
    },

    /// Sender was debited but the recipient credit failed
    #[error("Transfer of {amount} to {recipient} is incomplete: {reason}")]
    PartialTransferFailure {
        /// Intended recipient
        recipient: UserId,
        /// Amount debited from the sender
        amount: Credits,
        /// Open intent left for reconciliation
        intent: Option<IntentId>,
        /// Store error of the recipient write
        reason: String,
    },

    /// Learner was charged but the session row was not created
    #[error("Booking of listing {listing_id} charged {charged} but was not recorded: {reason}")]
    BookingStepFailed {
        /// Booked listing
        listing_id: ListingId,
        /// Amount debited from the learner
        charged: Credits,
        /// Open intent left for reconciliation
        intent: Option<IntentId>,
        /// Store error of the session insert
        reason: String,
    },

    /// Session lifecycle does not allow the move
    #[error("Session cannot move from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: SessionStatus,
        /// Requested status
        to: SessionStatus,
    },

    /// `end` without an active session
    #[error("No active session")]
    NoActiveSession,

    /// Session id not in the cache
    #[error("Session {0} not found")]
    SessionNotFound(SessionId),

    /// A non-ledger store operation failed
    #[error("{operation} is unavailable: {reason}")]
    Unavailable {
        /// Operation name
        operation: &'static str,
        /// Store error
        reason: String,
    },

    /// A credit-moving command did not conclude in time; its writes may
    /// have committed and may still be running
    #[error("{operation} did not finish in time; check your balance before retrying")]
    OutcomeUnknown {
        /// Command name
        operation: &'static str,
    },

    /// The runtime could not deliver an outcome
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl EngineError {
    /// Build an [`EngineError::InsufficientCredits`] with its shortfall.
    #[must_use]
    pub const fn insufficient(required: Credits, available: Credits) -> Self {
        Self::InsufficientCredits {
            required,
            available,
            shortfall: required.saturating_sub(available),
        }
    }

    /// How the caller should recover.
    #[must_use]
    pub const fn recovery(&self) -> Recovery {
        match self {
            Self::PaymentStepFailed { .. } | Self::Unavailable { .. } | Self::Runtime(_) => {
                Recovery::Retry
            }
            Self::PartialTransferFailure { .. }
            | Self::BookingStepFailed { .. }
            | Self::OutcomeUnknown { .. } => Recovery::ContactSupport,
            Self::Validation(_)
            | Self::AuthenticationRequired
            | Self::InsufficientCredits { .. }
            | Self::SelfTransfer
            | Self::SelfBookingDenied
            | Self::RecipientNotFound { .. }
            | Self::InvalidTransition { .. }
            | Self::NoActiveSession
            | Self::SessionNotFound(_) => Recovery::FixInput,
        }
    }

    /// Whether a store write committed, or may have committed, before the
    /// error.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        matches!(self.recovery(), Recovery::ContactSupport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_credits_reports_exact_shortfall() {
        let error = EngineError::insufficient(Credits::new(3), Credits::new(1));
        assert_eq!(
            error,
            EngineError::InsufficientCredits {
                required: Credits::new(3),
                available: Credits::new(1),
                shortfall: Credits::new(2),
            }
        );
        assert_eq!(
            error.to_string(),
            "Insufficient credits: need 3 credits, have 1 credits (2 credits short)"
        );
    }

    #[test]
    fn partial_failures_ask_for_support() {
        let partial = EngineError::PartialTransferFailure {
            recipient: UserId::new("u2"),
            amount: Credits::new(4),
            intent: None,
            reason: "timeout".into(),
        };
        assert_eq!(partial.recovery(), Recovery::ContactSupport);
        assert!(partial.is_partial());

        let first_step = EngineError::PaymentStepFailed {
            reason: "timeout".into(),
        };
        assert_eq!(first_step.recovery(), Recovery::Retry);
        assert!(!first_step.is_partial());

        assert_eq!(
            EngineError::from(ValidationError::NonPositiveAmount).recovery(),
            Recovery::FixInput
        );
    }

    #[test]
    fn unknown_outcome_is_never_retried() {
        let error = EngineError::OutcomeUnknown {
            operation: "transfer",
        };
        assert_eq!(error.recovery(), Recovery::ContactSupport);
        assert_ne!(EngineError::Runtime("closed".into()).recovery(), Recovery::ContactSupport);
    }
}
