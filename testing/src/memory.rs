//! In-memory collaborator stores
//!
//! Fast, deterministic stand-ins for the remote row stores:
//! - [`InMemoryProfiles`]: ledger balances and the identity directory
//! - [`InMemorySessionStore`]: session rows
//! - [`InMemoryListingCatalog`]: listing rows
//! - [`InMemoryIntentJournal`]: pending transfer/booking intents
//!
//! All of them share a [`StoreHarness`] that records every call in order
//! ([`CallLog`]) and fails calls on demand ([`StoreHarness::inject`]). A
//! failing call is still recorded, so tests can assert that a write was
//! attempted and rejected.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a panicking test

use skillswap_core::rows::{credits_to_column, ListingRow, ProfileRow, SessionRow};
use skillswap_core::stores::{
    IdentityDirectory, IntentJournal, LedgerStore, ListingCatalog, SessionStore, StoreError,
    StoreFuture, StoreResult,
};
use skillswap_core::types::{
    Account, Credits, ExpertProfile, IntentId, ListingId, ListingRecord, NewAccount, NewListing,
    NewSession, PendingIntent, Role, SessionFilter, SessionId, SessionOrder, SessionRecord,
    SessionStatus, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Collaborator operations, used to address calls and faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `LedgerStore::read_balance`
    ReadBalance,
    /// `LedgerStore::write_balance`
    WriteBalance,
    /// `IdentityDirectory::find_account_by_email`
    FindAccountByEmail,
    /// `IdentityDirectory::find_account`
    FindAccount,
    /// `IdentityDirectory::create_account`
    CreateAccount,
    /// `IdentityDirectory::update_role`
    UpdateRole,
    /// `IdentityDirectory::find_experts`
    FindExperts,
    /// `SessionStore::insert_session`
    InsertSession,
    /// `SessionStore::update_session_status`
    UpdateSessionStatus,
    /// `SessionStore::list_sessions`
    ListSessions,
    /// `ListingCatalog::list_listings`
    ListListings,
    /// `ListingCatalog::find_listings`
    FindListings,
    /// `ListingCatalog::insert_listing`
    InsertListing,
    /// `IntentJournal::open`
    OpenIntent,
    /// `IntentJournal::resolve`
    ResolveIntent,
    /// `IntentJournal::list_open`
    ListOpenIntents,
}

impl Operation {
    /// Whether the operation mutates a store.
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(
            self,
            Self::WriteBalance
                | Self::CreateAccount
                | Self::UpdateRole
                | Self::InsertSession
                | Self::UpdateSessionStatus
                | Self::InsertListing
                | Self::OpenIntent
                | Self::ResolveIntent
        )
    }
}

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    /// Which operation was called
    pub operation: Operation,
    /// The addressed row (user id, session id, email, ...), when there is one
    pub target: Option<String>,
    /// Balance passed to `write_balance`
    pub balance: Option<Credits>,
}

impl StoreCall {
    fn new(operation: Operation, target: Option<String>) -> Self {
        Self {
            operation,
            target,
            balance: None,
        }
    }
}

/// Ordered log of collaborator calls shared by all in-memory stores.
#[derive(Clone, Debug, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<StoreCall>>>,
}

impl CallLog {
    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }

    /// Every call so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Only the mutating calls, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<StoreCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.operation.is_write())
            .collect()
    }

    /// Number of calls to `operation`.
    #[must_use]
    pub fn count(&self, operation: Operation) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    /// Operations in call order.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|call| call.operation)
            .collect()
    }

    /// True if no collaborator was called at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.lock().unwrap().is_empty()
    }

    /// Forget the recorded calls (e.g. after seeding through the engine).
    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[derive(Debug, Clone)]
struct Fault {
    operation: Operation,
    target: Option<String>,
    remaining: Option<usize>,
    error: StoreError,
}

/// Call log, fault injection and simulated latency shared by the in-memory
/// stores of one test.
#[derive(Clone, Debug, Default)]
pub struct StoreHarness {
    log: CallLog,
    faults: Arc<Mutex<Vec<Fault>>>,
    latency: Arc<RwLock<Option<Duration>>>,
}

impl StoreHarness {
    /// Create a harness with no faults and no latency.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared call log.
    #[must_use]
    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Fail every call to `operation` with `error`.
    pub fn inject(&self, operation: Operation, error: StoreError) {
        self.push_fault(operation, None, None, error);
    }

    /// Fail the next `times` calls to `operation` with `error`.
    pub fn inject_times(&self, operation: Operation, times: usize, error: StoreError) {
        self.push_fault(operation, None, Some(times), error);
    }

    /// Fail every call to `operation` addressed at `target`.
    pub fn inject_for(&self, operation: Operation, target: impl ToString, error: StoreError) {
        self.push_fault(operation, Some(target.to_string()), None, error);
    }

    /// Remove all injected faults.
    pub fn heal(&self) {
        self.faults.lock().unwrap().clear();
    }

    /// Delay every call result by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write().unwrap() = Some(latency);
    }

    fn push_fault(
        &self,
        operation: Operation,
        target: Option<String>,
        remaining: Option<usize>,
        error: StoreError,
    ) {
        self.faults.lock().unwrap().push(Fault {
            operation,
            target,
            remaining,
            error,
        });
    }

    /// Record the call, then report the first matching fault.
    fn check(&self, call: StoreCall) -> StoreResult<()> {
        let mut faults = self.faults.lock().unwrap();
        let hit = faults.iter_mut().find(|fault| {
            fault.operation == call.operation
                && fault.remaining != Some(0)
                && fault
                    .target
                    .as_ref()
                    .is_none_or(|target| call.target.as_ref() == Some(target))
        });
        let outcome = match hit {
            Some(fault) => {
                if let Some(remaining) = fault.remaining.as_mut() {
                    *remaining -= 1;
                }
                Err(fault.error.clone())
            }
            None => Ok(()),
        };
        drop(faults);
        self.log.record(call);
        outcome
    }

    /// Wrap an already computed result in a store future, applying latency.
    fn respond<'a, T: Send + 'a>(&self, result: StoreResult<T>) -> StoreFuture<'a, T> {
        let latency = *self.latency.read().unwrap();
        Box::pin(async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            result
        })
    }
}

#[derive(Debug, Clone)]
struct ProfileEntry {
    account: Account,
    expert: Option<ExpertProfile>,
}

/// Profiles table: implements both [`LedgerStore`] and [`IdentityDirectory`].
#[derive(Clone, Debug)]
pub struct InMemoryProfiles {
    harness: StoreHarness,
    profiles: Arc<RwLock<HashMap<UserId, ProfileEntry>>>,
}

impl InMemoryProfiles {
    /// Create an empty profiles table.
    #[must_use]
    pub fn new(harness: StoreHarness) -> Self {
        Self {
            harness,
            profiles: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Seed an account.
    #[must_use]
    pub fn with_account(self, account: Account) -> Self {
        self.insert_account(account);
        self
    }

    /// Seed an expert identity, creating a matching expert account if needed.
    #[must_use]
    pub fn with_expert(self, expert: ExpertProfile, balance: Credits) -> Self {
        {
            let mut profiles = self.profiles.write().unwrap();
            let entry = profiles
                .entry(expert.id.clone())
                .or_insert_with(|| ProfileEntry {
                    account: Account {
                        id: expert.id.clone(),
                        name: expert.name.clone(),
                        email: None,
                        role: Role::Expert,
                        balance,
                        origin: skillswap_core::types::Origin::Persisted,
                    },
                    expert: None,
                });
            entry.expert = Some(expert);
        }
        self
    }

    /// Seed profiles from a JSON array in the store's row format. Rows with
    /// the `expert` role also seed an expert identity.
    ///
    /// # Errors
    ///
    /// [`StoreError::Malformed`] if the JSON or a row is invalid.
    pub fn with_rows_json(self, json: &str) -> StoreResult<Self> {
        let rows: Vec<ProfileRow> =
            serde_json::from_str(json).map_err(|e| StoreError::Malformed(e.to_string()))?;
        for row in rows {
            let account = Account::try_from(row.clone())?;
            let expert = (account.role == Role::Expert).then(|| ExpertProfile::from(row));
            self.profiles
                .write()
                .unwrap()
                .insert(account.id.clone(), ProfileEntry { account, expert });
        }
        Ok(self)
    }

    /// Insert or replace an account.
    pub fn insert_account(&self, account: Account) {
        self.profiles.write().unwrap().insert(
            account.id.clone(),
            ProfileEntry {
                account,
                expert: None,
            },
        );
    }

    /// Stored balance of `user`.
    #[must_use]
    pub fn balance(&self, user: &UserId) -> Option<Credits> {
        self.profiles
            .read()
            .unwrap()
            .get(user)
            .map(|entry| entry.account.balance)
    }

    /// Stored account of `user`.
    #[must_use]
    pub fn account(&self, user: &UserId) -> Option<Account> {
        self.profiles
            .read()
            .unwrap()
            .get(user)
            .map(|entry| entry.account.clone())
    }

    fn expert_of(entry: &ProfileEntry) -> ExpertProfile {
        entry.expert.clone().unwrap_or_else(|| {
            let mut profile = ExpertProfile::placeholder(&entry.account.id);
            profile.name.clone_from(&entry.account.name);
            profile
        })
    }
}

impl LedgerStore for InMemoryProfiles {
    fn read_balance<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Credits> {
        let result = self
            .harness
            .check(StoreCall::new(Operation::ReadBalance, Some(user.to_string())))
            .and_then(|()| {
                self.balance(user)
                    .ok_or_else(|| StoreError::NotFound(user.to_string()))
            });
        self.harness.respond(result)
    }

    fn write_balance<'a>(&'a self, user: &'a UserId, balance: Credits) -> StoreFuture<'a, ()> {
        let mut call = StoreCall::new(Operation::WriteBalance, Some(user.to_string()));
        call.balance = Some(balance);
        let result = self.harness.check(call).and_then(|()| {
            credits_to_column("credits", balance)?;
            let mut profiles = self.profiles.write().unwrap();
            let entry = profiles
                .get_mut(user)
                .ok_or_else(|| StoreError::NotFound(user.to_string()))?;
            entry.account.balance = balance;
            Ok(())
        });
        self.harness.respond(result)
    }
}

impl IdentityDirectory for InMemoryProfiles {
    fn find_account_by_email<'a>(&'a self, email: &'a str) -> StoreFuture<'a, Option<Account>> {
        let result = self
            .harness
            .check(StoreCall::new(
                Operation::FindAccountByEmail,
                Some(email.to_string()),
            ))
            .map(|()| {
                self.profiles
                    .read()
                    .unwrap()
                    .values()
                    .find(|entry| entry.account.email.as_deref() == Some(email))
                    .map(|entry| entry.account.clone())
            });
        self.harness.respond(result)
    }

    fn find_account<'a>(&'a self, id: &'a UserId) -> StoreFuture<'a, Option<Account>> {
        let result = self
            .harness
            .check(StoreCall::new(Operation::FindAccount, Some(id.to_string())))
            .map(|()| self.account(id));
        self.harness.respond(result)
    }

    fn create_account(&self, account: NewAccount) -> StoreFuture<'_, Account> {
        let result = self
            .harness
            .check(StoreCall::new(
                Operation::CreateAccount,
                Some(account.id.to_string()),
            ))
            .and_then(|()| {
                let mut profiles = self.profiles.write().unwrap();
                if profiles.contains_key(&account.id) {
                    return Err(StoreError::Rejected(format!(
                        "profile {} already exists",
                        account.id
                    )));
                }
                let created = Account {
                    id: account.id,
                    name: account.name,
                    email: account.email,
                    role: account.role,
                    balance: account.balance,
                    origin: skillswap_core::types::Origin::Persisted,
                };
                profiles.insert(
                    created.id.clone(),
                    ProfileEntry {
                        account: created.clone(),
                        expert: None,
                    },
                );
                Ok(created)
            });
        self.harness.respond(result)
    }

    fn update_role<'a>(&'a self, id: &'a UserId, role: Role) -> StoreFuture<'a, ()> {
        let result = self
            .harness
            .check(StoreCall::new(Operation::UpdateRole, Some(id.to_string())))
            .and_then(|()| {
                let mut profiles = self.profiles.write().unwrap();
                let entry = profiles
                    .get_mut(id)
                    .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
                entry.account.role = role;
                Ok(())
            });
        self.harness.respond(result)
    }

    fn find_experts<'a>(&'a self, ids: &'a [UserId]) -> StoreFuture<'a, Vec<ExpertProfile>> {
        let result = self
            .harness
            .check(StoreCall::new(Operation::FindExperts, None))
            .map(|()| {
                let profiles = self.profiles.read().unwrap();
                ids.iter()
                    .filter_map(|id| profiles.get(id))
                    .map(Self::expert_of)
                    .collect()
            });
        self.harness.respond(result)
    }
}

/// Sessions table.
#[derive(Clone, Debug)]
pub struct InMemorySessionStore {
    harness: StoreHarness,
    sessions: Arc<RwLock<Vec<SessionRecord>>>,
}

impl InMemorySessionStore {
    /// Create an empty sessions table.
    #[must_use]
    pub fn new(harness: StoreHarness) -> Self {
        Self {
            harness,
            sessions: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Seed a session row.
    #[must_use]
    pub fn with_session(self, record: SessionRecord) -> Self {
        self.sessions.write().unwrap().push(record);
        self
    }

    /// Seed sessions from a JSON array in the store's row format.
    ///
    /// # Errors
    ///
    /// [`StoreError::Malformed`] if the JSON or a row is invalid.
    pub fn with_rows_json(self, json: &str) -> StoreResult<Self> {
        let rows: Vec<SessionRow> =
            serde_json::from_str(json).map_err(|e| StoreError::Malformed(e.to_string()))?;
        for row in rows {
            let record = SessionRecord::try_from(row)?;
            self.sessions.write().unwrap().push(record);
        }
        Ok(self)
    }

    /// All stored rows in insertion order.
    #[must_use]
    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.sessions.read().unwrap().clone()
    }

    /// All stored rows as the remote store would hold them.
    #[must_use]
    pub fn rows(&self) -> Vec<SessionRow> {
        self.sessions
            .read()
            .unwrap()
            .iter()
            .map(SessionRow::from)
            .collect()
    }

    /// One stored row.
    #[must_use]
    pub fn session(&self, id: &SessionId) -> Option<SessionRecord> {
        self.sessions
            .read()
            .unwrap()
            .iter()
            .find(|record| &record.id == id)
            .cloned()
    }
}

impl SessionStore for InMemorySessionStore {
    fn insert_session(&self, session: NewSession) -> StoreFuture<'_, SessionId> {
        let result = self
            .harness
            .check(StoreCall::new(
                Operation::InsertSession,
                Some(session.learner_id.to_string()),
            ))
            .map(|()| {
                let mut sessions = self.sessions.write().unwrap();
                let id = SessionId::new(format!("s-{}", sessions.len() + 1));
                sessions.push(SessionRecord {
                    id: id.clone(),
                    listing_id: session.listing_id,
                    expert_id: session.expert_id,
                    learner_id: session.learner_id,
                    status: session.status,
                    scheduled_at: session.scheduled_at,
                    duration_minutes: session.duration_minutes,
                    topic: session.topic,
                });
                id
            });
        self.harness.respond(result)
    }

    fn update_session_status<'a>(
        &'a self,
        id: &'a SessionId,
        status: SessionStatus,
    ) -> StoreFuture<'a, ()> {
        let result = self
            .harness
            .check(StoreCall::new(
                Operation::UpdateSessionStatus,
                Some(id.to_string()),
            ))
            .and_then(|()| {
                let mut sessions = self.sessions.write().unwrap();
                let record = sessions
                    .iter_mut()
                    .find(|record| &record.id == id)
                    .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
                record.status = status;
                Ok(())
            });
        self.harness.respond(result)
    }

    fn list_sessions(
        &self,
        filter: SessionFilter,
        order: SessionOrder,
    ) -> StoreFuture<'_, Vec<SessionRecord>> {
        let result = self
            .harness
            .check(StoreCall::new(
                Operation::ListSessions,
                Some(filter.participant.to_string()),
            ))
            .map(|()| {
                let mut rows: Vec<SessionRecord> = self
                    .sessions
                    .read()
                    .unwrap()
                    .iter()
                    .filter(|record| {
                        record.learner_id == filter.participant
                            || record.expert_id == filter.participant
                    })
                    .cloned()
                    .collect();
                rows.sort_by_key(|record| record.scheduled_at);
                if order == SessionOrder::ScheduledDesc {
                    rows.reverse();
                }
                rows
            });
        self.harness.respond(result)
    }
}

/// Listings table.
#[derive(Clone, Debug)]
pub struct InMemoryListingCatalog {
    harness: StoreHarness,
    listings: Arc<RwLock<Vec<ListingRecord>>>,
}

impl InMemoryListingCatalog {
    /// Create an empty listings table.
    #[must_use]
    pub fn new(harness: StoreHarness) -> Self {
        Self {
            harness,
            listings: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Seed a listing row.
    #[must_use]
    pub fn with_listing(self, record: ListingRecord) -> Self {
        self.listings.write().unwrap().push(record);
        self
    }

    /// Seed listing rows from a JSON array in the store's row format.
    ///
    /// # Errors
    ///
    /// [`StoreError::Malformed`] if the JSON or a row is invalid.
    pub fn with_rows_json(self, json: &str) -> StoreResult<Self> {
        let rows: Vec<ListingRow> =
            serde_json::from_str(json).map_err(|e| StoreError::Malformed(e.to_string()))?;
        for row in rows {
            let record = ListingRecord::try_from(row)?;
            self.listings.write().unwrap().push(record);
        }
        Ok(self)
    }

    /// All stored rows.
    #[must_use]
    pub fn listings(&self) -> Vec<ListingRecord> {
        self.listings.read().unwrap().clone()
    }

    /// All stored rows as the remote store would hold them.
    ///
    /// # Errors
    ///
    /// [`StoreError::Malformed`] if a cost does not fit its column.
    pub fn rows(&self) -> StoreResult<Vec<ListingRow>> {
        self.listings
            .read()
            .unwrap()
            .iter()
            .map(ListingRow::try_from)
            .collect()
    }
}

impl ListingCatalog for InMemoryListingCatalog {
    fn list_listings(&self) -> StoreFuture<'_, Vec<ListingRecord>> {
        let result = self
            .harness
            .check(StoreCall::new(Operation::ListListings, None))
            .map(|()| self.listings());
        self.harness.respond(result)
    }

    fn find_listings<'a>(&'a self, ids: &'a [ListingId]) -> StoreFuture<'a, Vec<ListingRecord>> {
        let result = self
            .harness
            .check(StoreCall::new(Operation::FindListings, None))
            .map(|()| {
                self.listings
                    .read()
                    .unwrap()
                    .iter()
                    .filter(|record| ids.contains(&record.id))
                    .cloned()
                    .collect()
            });
        self.harness.respond(result)
    }

    fn insert_listing(&self, listing: NewListing) -> StoreFuture<'_, ListingRecord> {
        let result = self
            .harness
            .check(StoreCall::new(
                Operation::InsertListing,
                Some(listing.expert_id.to_string()),
            ))
            .and_then(|()| {
                let mut listings = self.listings.write().unwrap();
                let record = ListingRecord {
                    id: ListingId::new(format!("l-{}", listings.len() + 1)),
                    expert_id: listing.expert_id,
                    skill_name: listing.skill_name,
                    description: listing.description,
                    level: listing.level,
                    credit_cost: listing.credit_cost,
                    tags: listing.tags,
                };
                ListingRow::try_from(&record)?;
                listings.push(record.clone());
                Ok(record)
            });
        self.harness.respond(result)
    }
}

/// Pending intents table.
#[derive(Clone, Debug)]
pub struct InMemoryIntentJournal {
    harness: StoreHarness,
    open: Arc<RwLock<HashMap<IntentId, PendingIntent>>>,
    resolved: Arc<RwLock<Vec<IntentId>>>,
}

impl InMemoryIntentJournal {
    /// Create an empty journal.
    #[must_use]
    pub fn new(harness: StoreHarness) -> Self {
        Self {
            harness,
            open: Arc::new(RwLock::new(HashMap::new())),
            resolved: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Intents that were opened and never resolved.
    #[must_use]
    pub fn open_intents(&self) -> Vec<PendingIntent> {
        let mut intents: Vec<PendingIntent> = self.open.read().unwrap().values().cloned().collect();
        intents.sort_by_key(|intent| intent.opened_at);
        intents
    }

    /// Ids of resolved intents, in resolution order.
    #[must_use]
    pub fn resolved(&self) -> Vec<IntentId> {
        self.resolved.read().unwrap().clone()
    }
}

impl IntentJournal for InMemoryIntentJournal {
    fn open(&self, intent: PendingIntent) -> StoreFuture<'_, ()> {
        let result = self
            .harness
            .check(StoreCall::new(
                Operation::OpenIntent,
                Some(intent.id.to_string()),
            ))
            .map(|()| {
                self.open.write().unwrap().insert(intent.id, intent);
            });
        self.harness.respond(result)
    }

    fn resolve(&self, id: IntentId) -> StoreFuture<'_, ()> {
        let result = self
            .harness
            .check(StoreCall::new(
                Operation::ResolveIntent,
                Some(id.to_string()),
            ))
            .and_then(|()| {
                self.open
                    .write()
                    .unwrap()
                    .remove(&id)
                    .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
                self.resolved.write().unwrap().push(id);
                Ok(())
            });
        self.harness.respond(result)
    }

    fn list_open(&self) -> StoreFuture<'_, Vec<PendingIntent>> {
        let result = self
            .harness
            .check(StoreCall::new(Operation::ListOpenIntents, None))
            .map(|()| self.open_intents());
        self.harness.respond(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillswap_core::types::Origin;

    fn account(id: &str, email: &str, balance: u64) -> Account {
        Account {
            id: UserId::new(id),
            name: id.to_uppercase(),
            email: Some(email.to_string()),
            role: Role::Learner,
            balance: Credits::new(balance),
            origin: Origin::Persisted,
        }
    }

    #[tokio::test]
    async fn writes_replace_the_balance_and_are_logged() {
        let harness = StoreHarness::new();
        let profiles = InMemoryProfiles::new(harness.clone()).with_account(account("u1", "a@x", 5));
        let user = UserId::new("u1");

        profiles.write_balance(&user, Credits::new(2)).await.unwrap();

        assert_eq!(profiles.balance(&user), Some(Credits::new(2)));
        let writes = harness.log().writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].balance, Some(Credits::new(2)));
    }

    #[tokio::test]
    async fn targeted_fault_only_hits_its_row() {
        let harness = StoreHarness::new();
        let profiles = InMemoryProfiles::new(harness.clone())
            .with_account(account("u1", "a@x", 5))
            .with_account(account("u2", "b@x", 5));
        harness.inject_for(
            Operation::WriteBalance,
            "u2",
            StoreError::Unavailable("timeout".into()),
        );

        assert!(profiles
            .write_balance(&UserId::new("u1"), Credits::new(1))
            .await
            .is_ok());
        assert!(profiles
            .write_balance(&UserId::new("u2"), Credits::new(9))
            .await
            .is_err());
        assert_eq!(profiles.balance(&UserId::new("u2")), Some(Credits::new(5)));
        assert_eq!(harness.log().count(Operation::WriteBalance), 2);
    }

    #[tokio::test]
    async fn counted_fault_heals_itself() {
        let harness = StoreHarness::new();
        let sessions = InMemorySessionStore::new(harness.clone());
        harness.inject_times(
            Operation::ListSessions,
            1,
            StoreError::Unavailable("blip".into()),
        );
        let filter = || SessionFilter {
            participant: UserId::new("u1"),
        };

        assert!(sessions
            .list_sessions(filter(), SessionOrder::ScheduledAsc)
            .await
            .is_err());
        assert!(sessions
            .list_sessions(filter(), SessionOrder::ScheduledAsc)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn profiles_seed_from_rows() {
        let profiles = InMemoryProfiles::new(StoreHarness::new())
            .with_rows_json(
                r#"[
                    {"id":"u1","name":"Ana","email":"ana@skillswap.test","credits":7},
                    {"id":"e1","name":"Priya","role":"expert","skills":["Rust"],"rating":4.5}
                ]"#,
            )
            .unwrap();

        assert_eq!(profiles.balance(&UserId::new("u1")), Some(Credits::new(7)));
        assert_eq!(profiles.balance(&UserId::new("e1")), Some(Credits::ZERO));
        let experts = profiles
            .find_experts(&[UserId::new("e1")])
            .await
            .unwrap();
        assert_eq!(experts[0].name, "Priya");
        assert_eq!(experts[0].skills, vec!["Rust".to_string()]);

        let malformed = InMemoryProfiles::new(StoreHarness::new())
            .with_rows_json(r#"[{"id":"u2","credits":-1}]"#);
        assert!(matches!(malformed, Err(StoreError::Malformed(_))));
    }

    #[tokio::test]
    async fn balance_beyond_the_column_is_rejected() {
        let profiles = InMemoryProfiles::new(StoreHarness::new())
            .with_account(account("u1", "u1@skillswap.test", 3));

        let error = profiles
            .write_balance(&UserId::new("u1"), Credits::new(u64::MAX))
            .await
            .unwrap_err();

        assert!(matches!(error, StoreError::Malformed(_)));
        assert_eq!(profiles.balance(&UserId::new("u1")), Some(Credits::new(3)));
    }

    #[test]
    fn sessions_seed_from_and_export_rows() {
        let sessions = InMemorySessionStore::new(StoreHarness::new())
            .with_rows_json(
                r#"[{"id":"s1","listing_id":"l1","expert_id":"e1","learner_id":"u1",
                    "status":"live","scheduled_at":"2025-01-02T10:00:00Z",
                    "duration_minutes":60,"topic":"Session: Go"}]"#,
            )
            .unwrap();

        let record = sessions.session(&SessionId::new("s1")).unwrap();
        assert_eq!(record.status, SessionStatus::Live);
        assert_eq!(record.learner_id, UserId::new("u1"));

        let rows = sessions.rows();
        assert_eq!(rows[0].status, "live");
        assert_eq!(rows[0].scheduled_at, "2025-01-02T10:00:00+00:00");

        let malformed = InMemorySessionStore::new(StoreHarness::new()).with_rows_json(
            r#"[{"id":"s2","expert_id":"e1","learner_id":"u1","status":"paused",
                "scheduled_at":"2025-01-02T10:00:00Z","duration_minutes":60}]"#,
        );
        assert!(matches!(malformed, Err(StoreError::Malformed(_))));
    }

    #[tokio::test]
    async fn catalog_seeds_from_legacy_rows() {
        let catalog = InMemoryListingCatalog::new(StoreHarness::new())
            .with_rows_json(r#"[{"id":"l1","expertId":"e1","skillName":"Go","creditCost":3}]"#)
            .unwrap();
        let listings = catalog.list_listings().await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].credit_cost, Credits::new(3));
        assert_eq!(catalog.rows().unwrap()[0].credit_cost, 3);
    }
}
