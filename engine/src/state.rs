//! Client state cache.
//!
//! The store's state: the signed-in account, loaded listings, the user's
//! sessions, the active session, the booking flow and the inbox. Only the
//! reducer mutates it; callers read it through [`ClientSnapshot`].

use crate::action::RequestId;
use crate::error::EngineError;
use crate::inbox::Inbox;
use chrono::{DateTime, Utc};
use serde::Serialize;
use skillswap_core::types::{Account, Credits, Listing, Session, SessionId, UserId};

/// Booking state machine.
///
/// `Idle → Selecting → Confirming → Committing → Booked | Failed`
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub enum BookingFlow {
    /// No booking in progress
    #[default]
    Idle,
    /// A listing was picked
    Selecting {
        /// Listing being booked
        listing: Listing,
    },
    /// A slot was picked
    Confirming {
        /// Listing being booked
        listing: Listing,
        /// Chosen start time
        at: DateTime<Utc>,
    },
    /// Store writes in flight
    Committing {
        /// Listing being booked
        listing: Listing,
        /// Chosen start time
        at: DateTime<Utc>,
        /// Request that started the commit
        request: RequestId,
    },
    /// The session exists
    Booked {
        /// Booked session
        session_id: SessionId,
    },
    /// The commit failed
    Failed {
        /// Listing that could not be booked
        listing: Listing,
        /// Why
        error: EngineError,
    },
}

impl BookingFlow {
    /// Listing the flow is about, while one is selected.
    #[must_use]
    pub const fn listing(&self) -> Option<&Listing> {
        match self {
            Self::Selecting { listing }
            | Self::Confirming { listing, .. }
            | Self::Committing { listing, .. }
            | Self::Failed { listing, .. } => Some(listing),
            Self::Idle | Self::Booked { .. } => None,
        }
    }

    /// Whether store writes are in flight.
    #[must_use]
    pub const fn is_committing(&self) -> bool {
        matches!(self, Self::Committing { .. })
    }

    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Selecting { .. } => "selecting",
            Self::Confirming { .. } => "confirming",
            Self::Committing { .. } => "committing",
            Self::Booked { .. } => "booked",
            Self::Failed { .. } => "failed",
        }
    }
}

/// The client state cache owned by the store.
#[derive(Clone, Debug, Default)]
pub struct ClientState {
    /// Signed-in account
    pub account: Option<Account>,
    /// Marketplace listings
    pub listings: Vec<Listing>,
    /// The user's sessions, earliest first
    pub sessions: Vec<Session>,
    /// Session the user is currently in
    pub active_session: Option<SessionId>,
    /// Booking in progress
    pub booking: BookingFlow,
    /// Conversations
    pub inbox: Inbox,
}

impl ClientState {
    /// Cached balance of the signed-in account
    #[must_use]
    pub fn balance(&self) -> Option<Credits> {
        self.account.as_ref().map(|account| account.balance)
    }

    /// Session by id
    #[must_use]
    pub fn session(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|session| &session.id == id)
    }

    /// Mutable session by id
    pub fn session_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|session| &session.id == id)
    }

    /// Insert or replace a session, keeping the list ordered by start time.
    pub fn upsert_session(&mut self, session: Session) {
        self.sessions.retain(|existing| existing.id != session.id);
        let index = self
            .sessions
            .partition_point(|existing| existing.scheduled_at <= session.scheduled_at);
        self.sessions.insert(index, session);
    }

    /// Mirror a committed balance into the cached account.
    pub fn set_balance(&mut self, balance: Credits) {
        if let Some(account) = self.account.as_mut() {
            account.balance = balance;
        }
    }

    /// Whether `user` is the cached account.
    #[must_use]
    pub fn holds(&self, user: &UserId) -> bool {
        self.account.as_ref().is_some_and(|account| account.id == *user)
    }

    /// Mirror `user`'s committed balance, if `user` is still the cached
    /// account.
    pub fn mirror_balance(&mut self, user: &UserId, balance: Credits) {
        if self.holds(user) {
            self.set_balance(balance);
        } else {
            tracing::debug!(user_id = %user, "Balance is for another account, not mirrored");
        }
    }

    /// Read-only copy for callers.
    #[must_use]
    pub fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot {
            account: self.account.clone(),
            listings: self.listings.clone(),
            sessions: self.sessions.clone(),
            active_session: self.active_session.clone(),
            booking: self.booking.clone(),
            inbox: self.inbox.clone(),
        }
    }
}

/// Read-only view of the client state cache.
#[derive(Clone, Debug, Serialize)]
pub struct ClientSnapshot {
    /// Signed-in account
    pub account: Option<Account>,
    /// Marketplace listings
    pub listings: Vec<Listing>,
    /// The user's sessions, earliest first
    pub sessions: Vec<Session>,
    /// Session the user is currently in
    pub active_session: Option<SessionId>,
    /// Booking in progress
    pub booking: BookingFlow,
    /// Conversations
    pub inbox: Inbox,
}

impl ClientSnapshot {
    /// Cached balance of the signed-in account
    #[must_use]
    pub fn balance(&self) -> Option<Credits> {
        self.account.as_ref().map(|account| account.balance)
    }

    /// Session by id
    #[must_use]
    pub fn session(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|session| &session.id == id)
    }
}
