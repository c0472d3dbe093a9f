//! Marketplace actions.
//!
//! Three kinds of actions flow through the store:
//!
//! - **Commands** sent by [`crate::Marketplace`] on behalf of the UI.
//! - **Step results** fed back by effects between the two writes of a
//!   transfer or booking, so the second write is only issued after the
//!   reducer has applied the first.
//! - **Terminal** actions, [`MarketplaceAction::Completed`] and
//!   [`MarketplaceAction::Failed`], which carry the command's [`RequestId`]
//!   and resolve the caller's `Result`.

use crate::error::EngineError;
use crate::inbox::{ChatMessage, Conversation, ConversationId, Participant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skillswap_core::types::{
    Account, Credits, IntentId, Level, Listing, Session, SessionId, UserId,
};
use std::fmt;
use uuid::Uuid;

/// Correlates a command with its terminal action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Fresh random id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity handed over by the authentication provider at sign-in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthIdentity {
    /// Provider user id, used as account id
    pub user_id: UserId,
    /// Full name from the provider profile
    pub display_name: Option<String>,
    /// Verified email
    pub email: Option<String>,
}

impl AuthIdentity {
    /// Name for a new profile: the provider name, else the email's local
    /// part, else `"User"`.
    #[must_use]
    pub fn profile_name(&self) -> String {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .or_else(|| {
                self.email
                    .as_deref()
                    .and_then(|email| email.split('@').next())
                    .filter(|local| !local.is_empty())
            })
            .unwrap_or("User")
            .to_string()
    }
}

/// Fields of a listing an expert wants to publish.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingDraft {
    /// Skill taught
    pub skill_name: String,
    /// Description
    pub description: String,
    /// Difficulty tag
    pub level: Level,
    /// Hourly cost
    pub credit_cost: Credits,
    /// Search tags
    pub tags: Vec<String>,
}

/// Result of a credit top-up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TopUpReceipt {
    /// Credits added
    pub amount: Credits,
    /// Price the UI charged, echoed back
    pub price_charged: Option<u64>,
    /// Balance after the top-up
    pub balance: Credits,
}

/// Result of a transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    /// Sending account
    pub sender: UserId,
    /// Recipient account
    pub recipient: UserId,
    /// Recipient display name
    pub recipient_name: String,
    /// Credits moved
    pub amount: Credits,
    /// Sender balance after the transfer
    pub balance: Credits,
}

/// Successful outcome of a command.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Outcome {
    /// Account loaded or created, sessions loaded
    SignedIn {
        /// The account
        account: Account,
        /// The user's sessions
        sessions: Vec<Session>,
        /// Seeded conversations (demo only)
        conversations: Vec<Conversation>,
    },
    /// Cache cleared
    SignedOut,
    /// Listings loaded (from the catalog or the seed)
    ListingsLoaded {
        /// Listings
        listings: Vec<Listing>,
    },
    /// Listing published
    ListingCreated {
        /// The listing
        listing: Listing,
        /// Whether the account was promoted to expert
        promoted: bool,
    },
    /// Credits added
    CreditsAdded(TopUpReceipt),
    /// Credits debited
    CreditsDebited {
        /// Balance after the debit
        balance: Credits,
    },
    /// Transfer completed
    Transferred(TransferReceipt),
    /// Booking flow entered `Selecting`
    BookingStarted {
        /// Listing being booked
        listing: Listing,
    },
    /// Booking flow entered `Confirming`
    SlotChosen {
        /// Chosen start time
        at: DateTime<Utc>,
    },
    /// Booking flow back to `Idle`
    BookingCancelled,
    /// Session booked and paid
    Booked {
        /// The new session
        session: Session,
        /// Balance after payment
        balance: Credits,
    },
    /// Session is live and active
    SessionJoined {
        /// Session
        session_id: SessionId,
        /// Whether the status reached the session store
        persisted: bool,
    },
    /// Session completed, nothing active
    SessionEnded {
        /// Session
        session_id: SessionId,
        /// Whether the status reached the session store
        persisted: bool,
    },
    /// Sessions reloaded
    SessionsRefreshed {
        /// Persisted sessions from the store
        sessions: Vec<Session>,
    },
    /// Conversation available
    ConversationStarted {
        /// The conversation
        conversation: Conversation,
    },
    /// Message appended
    MessageSent {
        /// Conversation
        conversation_id: ConversationId,
        /// The message
        message: ChatMessage,
    },
}

/// Everything the marketplace reducer handles.
#[derive(Clone, Debug)]
pub enum MarketplaceAction {
    // ========== Profile & catalog ==========
    /// Load or create the account, then the user's sessions
    SignIn {
        /// Correlation id
        request: RequestId,
        /// Identity from the authentication provider
        identity: AuthIdentity,
    },
    /// Sign in as the local demo account
    SignInDemo {
        /// Correlation id
        request: RequestId,
    },
    /// Clear the cache
    SignOut {
        /// Correlation id
        request: RequestId,
    },
    /// Load marketplace listings
    LoadListings {
        /// Correlation id
        request: RequestId,
    },
    /// Publish a listing
    CreateListing {
        /// Correlation id
        request: RequestId,
        /// Listing fields
        draft: ListingDraft,
    },

    // ========== Ledger ==========
    /// Add credits to the signed-in account
    AddCredits {
        /// Correlation id
        request: RequestId,
        /// Credits to add
        amount: Credits,
        /// Price the UI charged
        price_charged: Option<u64>,
    },
    /// Remove credits from the signed-in account
    DebitCredits {
        /// Correlation id
        request: RequestId,
        /// Credits to remove
        amount: Credits,
    },
    /// Send credits to another user
    Transfer {
        /// Correlation id
        request: RequestId,
        /// Recipient address
        recipient_email: String,
        /// Credits to send
        amount: Credits,
    },
    /// Recipient looked up (and intent opened); debit the sender next
    RecipientResolved {
        /// Correlation id
        request: RequestId,
        /// Account being debited
        sender: UserId,
        /// Recipient as last read
        recipient: Account,
        /// Credits to send
        amount: Credits,
        /// Journaled intent
        intent: Option<IntentId>,
    },
    /// Sender debit committed; credit the recipient next
    TransferDebited {
        /// Correlation id
        request: RequestId,
        /// Account that was debited
        sender: UserId,
        /// Recipient as last read
        recipient: Account,
        /// Credits sent
        amount: Credits,
        /// Sender balance now stored
        balance: Credits,
        /// Journaled intent
        intent: Option<IntentId>,
    },

    // ========== Booking ==========
    /// Enter the booking flow for a listing
    InitiateBooking {
        /// Correlation id
        request: RequestId,
        /// Listing to book
        listing: Listing,
    },
    /// Pick a start time
    ChooseSlot {
        /// Correlation id
        request: RequestId,
        /// Start time
        at: DateTime<Utc>,
    },
    /// Leave the booking flow
    CancelBooking {
        /// Correlation id
        request: RequestId,
    },
    /// Pay and create the session
    FinalizeBooking {
        /// Correlation id
        request: RequestId,
        /// Start time, overriding the chosen slot
        at: Option<DateTime<Utc>>,
    },
    /// Learner debit committed; insert the session next
    BookingDebited {
        /// Correlation id
        request: RequestId,
        /// Account that was charged
        learner: UserId,
        /// Listing being booked
        listing: Listing,
        /// Start time
        at: DateTime<Utc>,
        /// Learner balance now stored
        balance: Credits,
        /// Journaled intent
        intent: Option<IntentId>,
    },

    // ========== Session lifecycle ==========
    /// Go live in a scheduled session
    JoinSession {
        /// Correlation id
        request: RequestId,
        /// Session to join
        session_id: SessionId,
    },
    /// Complete the active session
    EndSession {
        /// Correlation id
        request: RequestId,
    },
    /// Reload the user's sessions
    RefreshSessions {
        /// Correlation id
        request: RequestId,
    },

    // ========== Inbox ==========
    /// Open (or find) a conversation
    StartConversation {
        /// Correlation id
        request: RequestId,
        /// Other side
        participant: Participant,
    },
    /// Append a message
    SendMessage {
        /// Correlation id
        request: RequestId,
        /// Conversation
        conversation_id: ConversationId,
        /// Body
        text: String,
    },

    // ========== Terminal ==========
    /// The command succeeded; the outcome is applied to the cache
    Completed {
        /// Correlation id
        request: RequestId,
        /// Result
        outcome: Outcome,
    },
    /// The command failed
    Failed {
        /// Correlation id
        request: RequestId,
        /// Why
        error: EngineError,
    },
}

impl MarketplaceAction {
    /// The request this action belongs to.
    #[must_use]
    pub const fn request(&self) -> RequestId {
        match self {
            Self::SignIn { request, .. }
            | Self::SignInDemo { request }
            | Self::SignOut { request }
            | Self::LoadListings { request }
            | Self::CreateListing { request, .. }
            | Self::AddCredits { request, .. }
            | Self::DebitCredits { request, .. }
            | Self::Transfer { request, .. }
            | Self::RecipientResolved { request, .. }
            | Self::TransferDebited { request, .. }
            | Self::InitiateBooking { request, .. }
            | Self::ChooseSlot { request, .. }
            | Self::CancelBooking { request }
            | Self::FinalizeBooking { request, .. }
            | Self::BookingDebited { request, .. }
            | Self::JoinSession { request, .. }
            | Self::EndSession { request }
            | Self::RefreshSessions { request }
            | Self::StartConversation { request, .. }
            | Self::SendMessage { request, .. }
            | Self::Completed { request, .. }
            | Self::Failed { request, .. } => *request,
        }
    }

    /// Whether this action ends its request.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    /// Whether this action ends `request`.
    #[must_use]
    pub fn concludes(&self, request: RequestId) -> bool {
        self.is_terminal() && self.request() == request
    }

    /// Whether the command writes balances. Such a command that does not
    /// conclude in time may have committed part of its writes.
    #[must_use]
    pub const fn moves_credits(&self) -> bool {
        matches!(
            self,
            Self::AddCredits { .. }
                | Self::DebitCredits { .. }
                | Self::Transfer { .. }
                | Self::FinalizeBooking { .. }
        )
    }

    /// Action name for logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SignIn { .. } => "sign_in",
            Self::SignInDemo { .. } => "sign_in_demo",
            Self::SignOut { .. } => "sign_out",
            Self::LoadListings { .. } => "load_listings",
            Self::CreateListing { .. } => "create_listing",
            Self::AddCredits { .. } => "add_credits",
            Self::DebitCredits { .. } => "debit_credits",
            Self::Transfer { .. } => "transfer",
            Self::RecipientResolved { .. } => "recipient_resolved",
            Self::TransferDebited { .. } => "transfer_debited",
            Self::InitiateBooking { .. } => "initiate_booking",
            Self::ChooseSlot { .. } => "choose_slot",
            Self::CancelBooking { .. } => "cancel_booking",
            Self::FinalizeBooking { .. } => "finalize_booking",
            Self::BookingDebited { .. } => "booking_debited",
            Self::JoinSession { .. } => "join_session",
            Self::EndSession { .. } => "end_session",
            Self::RefreshSessions { .. } => "refresh_sessions",
            Self::StartConversation { .. } => "start_conversation",
            Self::SendMessage { .. } => "send_message",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}
