//! The `Marketplace` controller.
//!
//! The only entry point a UI needs. Every method sends one command into the
//! [`Store`], waits for the terminal action carrying its request id, and
//! returns the typed outcome. The wait is bounded by
//! [`EngineConfig::outcome_timeout`](crate::config::EngineConfig); a sequence
//! that outlives it keeps running and still updates the cache.

use crate::action::{
    AuthIdentity, ListingDraft, MarketplaceAction, Outcome, RequestId, TopUpReceipt,
    TransferReceipt,
};
use crate::environment::MarketplaceEnvironment;
use crate::error::EngineError;
use crate::inbox::{ChatMessage, Conversation, ConversationId, Participant};
use crate::ledger::CreditPackage;
use crate::matching::{rank_listings, MatchRequest};
use crate::reducer::MarketplaceReducer;
use crate::state::{ClientSnapshot, ClientState};
use chrono::{DateTime, Utc};
use skillswap_core::types::{Account, Credits, Listing, PendingIntent, Session, SessionId};
use skillswap_runtime::{RuntimeError, Store};
use std::time::Duration;

type MarketplaceStore =
    Store<ClientState, MarketplaceAction, MarketplaceEnvironment, MarketplaceReducer>;

impl From<RuntimeError> for EngineError {
    fn from(error: RuntimeError) -> Self {
        Self::Runtime(error.to_string())
    }
}

fn unexpected(outcome: &Outcome) -> EngineError {
    EngineError::Runtime(format!("unexpected outcome {outcome:?}"))
}

/// Marketplace client for a single signed-in user.
#[derive(Clone)]
pub struct Marketplace {
    store: MarketplaceStore,
    outcome_timeout: Duration,
}

impl Marketplace {
    /// Build a marketplace over `environment`, starting signed out.
    #[must_use]
    pub fn new(environment: MarketplaceEnvironment) -> Self {
        let outcome_timeout = environment.config.outcome_timeout;
        let capacity = environment.config.broadcast_capacity;
        Self {
            store: Store::with_broadcast_capacity(
                ClientState::default(),
                MarketplaceReducer,
                environment,
                capacity,
            ),
            outcome_timeout,
        }
    }

    /// Send `action` and wait for its terminal action.
    ///
    /// A credit-moving command that times out is reported as
    /// [`EngineError::OutcomeUnknown`]: its first write may already have
    /// committed, so it must not be retried blindly.
    async fn dispatch(&self, action: MarketplaceAction) -> Result<Outcome, EngineError> {
        let request = action.request();
        let operation = action.name();
        let moves_credits = action.moves_credits();
        let terminal = match self
            .store
            .send_and_wait_for(
                action,
                move |candidate| candidate.concludes(request),
                self.outcome_timeout,
            )
            .await
        {
            Ok(terminal) => terminal,
            Err(RuntimeError::Timeout) if moves_credits => {
                tracing::error!(request_id = %request, operation, "Credit-moving command timed out");
                return Err(EngineError::OutcomeUnknown { operation });
            }
            Err(error) => return Err(error.into()),
        };

        match terminal {
            MarketplaceAction::Completed { outcome, .. } => Ok(outcome),
            MarketplaceAction::Failed { error, .. } => {
                if error.is_partial() {
                    tracing::error!(request_id = %request, %error, "Operation partially applied");
                } else {
                    tracing::debug!(request_id = %request, %error, "Operation failed");
                }
                Err(error)
            }
            other => Err(EngineError::Runtime(format!(
                "non-terminal action {} resolved request {request}",
                other.name()
            ))),
        }
    }

    // ========== Profile & catalog ==========

    /// Load (or create) the account behind `identity` and its sessions.
    ///
    /// # Errors
    ///
    /// [`EngineError::Unavailable`] if the directory cannot be reached.
    #[tracing::instrument(skip_all, fields(user_id = %identity.user_id))]
    pub async fn sign_in(&self, identity: AuthIdentity) -> Result<Account, EngineError> {
        let request = RequestId::new();
        match self
            .dispatch(MarketplaceAction::SignIn { request, identity })
            .await?
        {
            Outcome::SignedIn { account, .. } => Ok(account),
            other => Err(unexpected(&other)),
        }
    }

    /// Sign in as the local demo account.
    ///
    /// # Errors
    ///
    /// [`EngineError::Runtime`] only.
    #[tracing::instrument(skip(self))]
    pub async fn sign_in_demo(&self) -> Result<Account, EngineError> {
        let request = RequestId::new();
        match self
            .dispatch(MarketplaceAction::SignInDemo { request })
            .await?
        {
            Outcome::SignedIn { account, .. } => Ok(account),
            other => Err(unexpected(&other)),
        }
    }

    /// Clear the cache.
    ///
    /// # Errors
    ///
    /// [`EngineError::Runtime`] only.
    #[tracing::instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), EngineError> {
        let request = RequestId::new();
        self.dispatch(MarketplaceAction::SignOut { request })
            .await
            .map(|_| ())
    }

    /// Load marketplace listings into the cache.
    ///
    /// # Errors
    ///
    /// [`EngineError::Runtime`] only; catalog failures fall back to the
    /// seeded listings.
    #[tracing::instrument(skip(self))]
    pub async fn load_listings(&self) -> Result<Vec<Listing>, EngineError> {
        let request = RequestId::new();
        match self
            .dispatch(MarketplaceAction::LoadListings { request })
            .await?
        {
            Outcome::ListingsLoaded { listings } => Ok(listings),
            other => Err(unexpected(&other)),
        }
    }

    /// Publish a listing as the signed-in user.
    ///
    /// # Errors
    ///
    /// Validation, authentication, or [`EngineError::Unavailable`].
    #[tracing::instrument(skip_all, fields(skill = %draft.skill_name))]
    pub async fn create_listing(&self, draft: ListingDraft) -> Result<Listing, EngineError> {
        let request = RequestId::new();
        match self
            .dispatch(MarketplaceAction::CreateListing { request, draft })
            .await?
        {
            Outcome::ListingCreated { listing, .. } => Ok(listing),
            other => Err(unexpected(&other)),
        }
    }

    // ========== Ledger ==========

    /// Add credits to the signed-in account.
    ///
    /// # Errors
    ///
    /// Validation, authentication, or [`EngineError::PaymentStepFailed`].
    #[tracing::instrument(skip_all, fields(amount = %amount, ?price_charged))]
    pub async fn add_credits(
        &self,
        amount: Credits,
        price_charged: Option<u64>,
    ) -> Result<TopUpReceipt, EngineError> {
        let request = RequestId::new();
        match self
            .dispatch(MarketplaceAction::AddCredits {
                request,
                amount,
                price_charged,
            })
            .await?
        {
            Outcome::CreditsAdded(receipt) => Ok(receipt),
            other => Err(unexpected(&other)),
        }
    }

    /// Buy a top-up package.
    ///
    /// # Errors
    ///
    /// As [`Marketplace::add_credits`].
    pub async fn purchase_package(
        &self,
        package: CreditPackage,
    ) -> Result<TopUpReceipt, EngineError> {
        self.add_credits(package.credits, Some(package.price)).await
    }

    /// Remove credits from the signed-in account.
    ///
    /// # Errors
    ///
    /// Validation, [`EngineError::InsufficientCredits`], or
    /// [`EngineError::PaymentStepFailed`].
    #[tracing::instrument(skip_all, fields(amount = %amount))]
    pub async fn debit_credits(&self, amount: Credits) -> Result<Credits, EngineError> {
        let request = RequestId::new();
        match self
            .dispatch(MarketplaceAction::DebitCredits { request, amount })
            .await?
        {
            Outcome::CreditsDebited { balance } => Ok(balance),
            other => Err(unexpected(&other)),
        }
    }

    /// Send credits to the account using `recipient_email`.
    ///
    /// # Errors
    ///
    /// Validation, [`EngineError::RecipientNotFound`],
    /// [`EngineError::SelfTransfer`], [`EngineError::PaymentStepFailed`], or
    /// [`EngineError::PartialTransferFailure`] when the sender was debited
    /// but the recipient was not credited.
    #[tracing::instrument(skip_all, fields(amount = %amount))]
    pub async fn transfer(
        &self,
        recipient_email: &str,
        amount: Credits,
    ) -> Result<TransferReceipt, EngineError> {
        let request = RequestId::new();
        match self
            .dispatch(MarketplaceAction::Transfer {
                request,
                recipient_email: recipient_email.to_string(),
                amount,
            })
            .await?
        {
            Outcome::Transferred(receipt) => Ok(receipt),
            other => Err(unexpected(&other)),
        }
    }

    // ========== Booking ==========

    /// Enter the booking flow for `listing`.
    ///
    /// # Errors
    ///
    /// [`EngineError::AuthenticationRequired`],
    /// [`EngineError::SelfBookingDenied`], or
    /// [`EngineError::InsufficientCredits`].
    #[tracing::instrument(skip_all, fields(listing_id = %listing.id))]
    pub async fn initiate_booking(&self, listing: Listing) -> Result<(), EngineError> {
        let request = RequestId::new();
        self.dispatch(MarketplaceAction::InitiateBooking { request, listing })
            .await
            .map(|_| ())
    }

    /// Pick the start time of the booking in progress.
    ///
    /// # Errors
    ///
    /// Validation: no booking, or a slot that is not in the future.
    #[tracing::instrument(skip(self))]
    pub async fn choose_slot(&self, at: DateTime<Utc>) -> Result<(), EngineError> {
        let request = RequestId::new();
        self.dispatch(MarketplaceAction::ChooseSlot { request, at })
            .await
            .map(|_| ())
    }

    /// Leave the booking flow.
    ///
    /// # Errors
    ///
    /// Validation while the booking is being committed.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_booking(&self) -> Result<(), EngineError> {
        let request = RequestId::new();
        self.dispatch(MarketplaceAction::CancelBooking { request })
            .await
            .map(|_| ())
    }

    /// Pay for the booking in progress and create its session. `at`
    /// overrides the chosen slot.
    ///
    /// # Errors
    ///
    /// Validation, [`EngineError::InsufficientCredits`],
    /// [`EngineError::PaymentStepFailed`], or
    /// [`EngineError::BookingStepFailed`] when the learner was charged but
    /// the session was not recorded.
    #[tracing::instrument(skip(self))]
    pub async fn finalize_booking(
        &self,
        at: Option<DateTime<Utc>>,
    ) -> Result<Session, EngineError> {
        let request = RequestId::new();
        match self
            .dispatch(MarketplaceAction::FinalizeBooking { request, at })
            .await?
        {
            Outcome::Booked { session, .. } => Ok(session),
            other => Err(unexpected(&other)),
        }
    }

    // ========== Session lifecycle ==========

    /// Go live in `session_id`. Returns whether the status reached the
    /// session store.
    ///
    /// # Errors
    ///
    /// [`EngineError::SessionNotFound`], [`EngineError::InvalidTransition`],
    /// or validation when another session is active.
    #[tracing::instrument(skip_all, fields(session_id = %session_id))]
    pub async fn join(&self, session_id: SessionId) -> Result<bool, EngineError> {
        let request = RequestId::new();
        match self
            .dispatch(MarketplaceAction::JoinSession {
                request,
                session_id,
            })
            .await?
        {
            Outcome::SessionJoined { persisted, .. } => Ok(persisted),
            other => Err(unexpected(&other)),
        }
    }

    /// Complete the active session. Returns whether the status reached the
    /// session store.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoActiveSession`] or [`EngineError::InvalidTransition`].
    #[tracing::instrument(skip(self))]
    pub async fn end(&self) -> Result<bool, EngineError> {
        let request = RequestId::new();
        match self
            .dispatch(MarketplaceAction::EndSession { request })
            .await?
        {
            Outcome::SessionEnded { persisted, .. } => Ok(persisted),
            other => Err(unexpected(&other)),
        }
    }

    /// Reload the signed-in user's sessions.
    ///
    /// # Errors
    ///
    /// [`EngineError::AuthenticationRequired`]; store failures yield an
    /// empty list instead.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_sessions(&self) -> Result<Vec<Session>, EngineError> {
        let request = RequestId::new();
        self.dispatch(MarketplaceAction::RefreshSessions { request })
            .await?;
        Ok(self.store.state(|state| state.sessions.clone()).await)
    }

    // ========== Inbox ==========

    /// Open the conversation with `participant`, creating it if needed.
    ///
    /// # Errors
    ///
    /// [`EngineError::Runtime`] only.
    pub async fn start_conversation(
        &self,
        participant: Participant,
    ) -> Result<Conversation, EngineError> {
        let request = RequestId::new();
        match self
            .dispatch(MarketplaceAction::StartConversation {
                request,
                participant,
            })
            .await?
        {
            Outcome::ConversationStarted { conversation } => Ok(conversation),
            other => Err(unexpected(&other)),
        }
    }

    /// Append a message to a conversation.
    ///
    /// # Errors
    ///
    /// Validation for blank text or an unknown conversation.
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        text: &str,
    ) -> Result<ChatMessage, EngineError> {
        let request = RequestId::new();
        match self
            .dispatch(MarketplaceAction::SendMessage {
                request,
                conversation_id,
                text: text.to_string(),
            })
            .await?
        {
            Outcome::MessageSent { message, .. } => Ok(message),
            other => Err(unexpected(&other)),
        }
    }

    // ========== Queries ==========

    /// Cached listings ranked for `request`.
    pub async fn rank_listings(&self, request: &MatchRequest) -> Vec<(Listing, f64)> {
        self.store
            .state(|state| rank_listings(request, &state.listings))
            .await
    }

    /// Read-only copy of the client state cache.
    pub async fn snapshot(&self) -> ClientSnapshot {
        self.store.state(ClientState::snapshot).await
    }

    /// Intents that were opened but never resolved. Empty without a journal.
    ///
    /// # Errors
    ///
    /// [`EngineError::Unavailable`] if the journal cannot be read.
    pub async fn pending_intents(&self) -> Result<Vec<PendingIntent>, EngineError> {
        let Some(journal) = self.store.environment().journal.clone() else {
            return Ok(Vec::new());
        };
        journal
            .list_open()
            .await
            .map_err(|error| EngineError::Unavailable {
                operation: "pending_intents",
                reason: error.to_string(),
            })
    }

    /// Wait until no store call is in flight.
    ///
    /// # Errors
    ///
    /// [`EngineError::Runtime`] if effects are still running after `timeout`.
    pub async fn settle(&self, timeout: Duration) -> Result<(), EngineError> {
        Ok(self.store.settle(timeout).await?)
    }

    /// Stop accepting commands and wait for in-flight sequences. A transfer or
    /// booking already past its first write runs to its end.
    ///
    /// # Errors
    ///
    /// [`EngineError::Runtime`] if sequences are still running after
    /// `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), EngineError> {
        Ok(self.store.shutdown(timeout).await?)
    }
}

impl std::fmt::Debug for Marketplace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marketplace")
            .field("outcome_timeout", &self.outcome_timeout)
            .finish_non_exhaustive()
    }
}
