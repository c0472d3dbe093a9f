//! Collaborator contracts for the remote row stores.
//!
//! The engine never talks to a database directly. It holds each store as an
//! `Arc<dyn Trait>` and captures it inside effects, so every method returns a
//! boxed `Send` future instead of using `async fn`.
//!
//! # Guarantees
//!
//! Each call is a single-row operation. There is no cross-row atomicity: a
//! transfer is two independent [`LedgerStore::write_balance`] calls and a
//! booking is a balance write followed by [`SessionStore::insert_session`].
//! The engine orders these calls; the stores only promise that an individual
//! call either committed or reported an error.
//!
//! # Implementations
//!
//! - In-memory stores with failure injection live in `skillswap-testing`.
//! - Hosted implementations belong to the embedding application.

use crate::types::{
    Account, Credits, ExpertProfile, IntentId, ListingId, ListingRecord, NewAccount, NewListing,
    NewSession, PendingIntent, Role, SessionFilter, SessionId, SessionOrder, SessionRecord,
    SessionStatus, UserId,
};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors reported by a collaborator store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed row does not exist.
    #[error("Row not found: {0}")]
    NotFound(String),

    /// The store could not be reached or timed out.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the write (constraint, permission, ...).
    #[error("Write rejected: {0}")]
    Rejected(String),

    /// A row could not be mapped onto a domain value.
    #[error("Malformed row: {0}")]
    Malformed(String),
}

impl StoreError {
    /// Whether retrying the same call might succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result of a collaborator call
pub type StoreResult<T> = Result<T, StoreError>;

/// Boxed future returned by every collaborator method
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Per-user credit balances.
///
/// Writes replace the whole balance; the engine computes the new value from a
/// previously read one, so concurrent writers follow last-write-wins.
pub trait LedgerStore: Send + Sync {
    /// Read the stored balance of `user`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the user has no ledger row.
    fn read_balance<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Credits>;

    /// Replace the stored balance of `user` with `balance`.
    ///
    /// # Errors
    ///
    /// Any [`StoreError`]; on error the stored balance is unchanged.
    fn write_balance<'a>(&'a self, user: &'a UserId, balance: Credits) -> StoreFuture<'a, ()>;
}

/// Session rows.
pub trait SessionStore: Send + Sync {
    /// Insert a session row and return its id.
    ///
    /// # Errors
    ///
    /// Any [`StoreError`]; on error no row was inserted.
    fn insert_session(&self, session: NewSession) -> StoreFuture<'_, SessionId>;

    /// Set the status of one session row.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for unknown ids, or any transport error.
    fn update_session_status<'a>(
        &'a self,
        id: &'a SessionId,
        status: SessionStatus,
    ) -> StoreFuture<'a, ()>;

    /// List the sessions matching `filter` in the requested order.
    ///
    /// # Errors
    ///
    /// Any [`StoreError`].
    fn list_sessions(
        &self,
        filter: SessionFilter,
        order: SessionOrder,
    ) -> StoreFuture<'_, Vec<SessionRecord>>;
}

/// Accounts and public expert identities.
pub trait IdentityDirectory: Send + Sync {
    /// Look up an account by email. `Ok(None)` when nobody uses the address.
    ///
    /// # Errors
    ///
    /// Transport errors only.
    fn find_account_by_email<'a>(&'a self, email: &'a str) -> StoreFuture<'a, Option<Account>>;

    /// Look up an account by id. `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Transport errors only.
    fn find_account<'a>(&'a self, id: &'a UserId) -> StoreFuture<'a, Option<Account>>;

    /// Create a profile at first sign-in.
    ///
    /// # Errors
    ///
    /// [`StoreError::Rejected`] if the id is already taken.
    fn create_account(&self, account: NewAccount) -> StoreFuture<'_, Account>;

    /// Change an account's role.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for unknown ids.
    fn update_role<'a>(&'a self, id: &'a UserId, role: Role) -> StoreFuture<'a, ()>;

    /// Fetch the public identities of the given experts. Unknown ids are
    /// simply missing from the result.
    ///
    /// # Errors
    ///
    /// Transport errors only.
    fn find_experts<'a>(&'a self, ids: &'a [UserId]) -> StoreFuture<'a, Vec<ExpertProfile>>;
}

/// Listing rows.
pub trait ListingCatalog: Send + Sync {
    /// All listings in the catalog.
    ///
    /// # Errors
    ///
    /// Any [`StoreError`].
    fn list_listings(&self) -> StoreFuture<'_, Vec<ListingRecord>>;

    /// Listings with the given ids. Unknown ids are missing from the result.
    ///
    /// # Errors
    ///
    /// Any [`StoreError`].
    fn find_listings<'a>(&'a self, ids: &'a [ListingId]) -> StoreFuture<'a, Vec<ListingRecord>>;

    /// Publish a listing and return the stored record.
    ///
    /// # Errors
    ///
    /// Any [`StoreError`]; on error nothing was inserted.
    fn insert_listing(&self, listing: NewListing) -> StoreFuture<'_, ListingRecord>;
}

/// Durable log of two-step mutations in flight.
pub trait IntentJournal: Send + Sync {
    /// Record an intent before its first step runs.
    ///
    /// # Errors
    ///
    /// Any [`StoreError`]; the engine aborts the mutation if this fails.
    fn open(&self, intent: PendingIntent) -> StoreFuture<'_, ()>;

    /// Mark an intent as fully applied.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for unknown ids.
    fn resolve(&self, id: IntentId) -> StoreFuture<'_, ()>;

    /// Intents that were opened but never resolved.
    ///
    /// # Errors
    ///
    /// Any [`StoreError`].
    fn list_open(&self) -> StoreFuture<'_, Vec<PendingIntent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_transient() {
        assert!(StoreError::Unavailable("timeout".into()).is_transient());
        assert!(!StoreError::Rejected("constraint".into()).is_transient());
        assert!(!StoreError::NotFound("u1".into()).is_transient());
    }

    #[test]
    fn store_error_display() {
        let error = StoreError::Unavailable("connection reset".to_string());
        assert_eq!(error.to_string(), "Store unavailable: connection reset");
    }
}
