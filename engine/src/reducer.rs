//! The marketplace reducer.
//!
//! Routes every [`MarketplaceAction`] to its engine (ledger, booking,
//! lifecycle, catalog) and applies terminal outcomes to the client state
//! cache. Handlers return `Result`; a local error becomes a `Failed` action
//! emitted through the runtime so callers see it like any other outcome.

use crate::action::{MarketplaceAction, Outcome, RequestId};
use crate::environment::MarketplaceEnvironment;
use crate::error::{EngineError, ValidationError};
use crate::inbox::{ChatMessage, Conversation, ConversationId, Participant};
use crate::state::{BookingFlow, ClientState};
use crate::{booking, catalog, ledger, lifecycle};
use skillswap_core::effect::Effect;
use skillswap_core::reducer::{Effects, Reducer};
use skillswap_core::smallvec;
use skillswap_core::types::{Account, Role, SessionStatus};
use uuid::Uuid;

/// Result of a handler: effects to run, or a local rejection.
pub(crate) type Step = Result<Effects<MarketplaceAction>, EngineError>;

/// Emit a successful terminal action.
pub(crate) fn complete(request: RequestId, outcome: Outcome) -> Effects<MarketplaceAction> {
    smallvec![Effect::emit(MarketplaceAction::Completed { request, outcome })]
}

/// Emit a failed terminal action.
pub(crate) fn fail(request: RequestId, error: EngineError) -> Effects<MarketplaceAction> {
    smallvec![Effect::emit(MarketplaceAction::Failed { request, error })]
}

/// The signed-in account, or [`EngineError::AuthenticationRequired`].
pub(crate) fn signed_in(state: &ClientState) -> Result<&Account, EngineError> {
    state
        .account
        .as_ref()
        .ok_or(EngineError::AuthenticationRequired)
}

/// Reducer for the whole marketplace client.
#[derive(Clone, Copy, Debug, Default)]
pub struct MarketplaceReducer;

impl Reducer for MarketplaceReducer {
    type State = ClientState;
    type Action = MarketplaceAction;
    type Environment = MarketplaceEnvironment;

    fn reduce(
        &self,
        state: &mut ClientState,
        action: MarketplaceAction,
        env: &MarketplaceEnvironment,
    ) -> Effects<MarketplaceAction> {
        let request = action.request();
        tracing::trace!(action = action.name(), request_id = %request, "Reducing");

        let step = match action {
            // Profile & catalog
            MarketplaceAction::SignIn { identity, .. } => {
                no_commit_running(state).and_then(|()| catalog::sign_in(request, identity, env))
            }
            MarketplaceAction::SignInDemo { .. } => {
                no_commit_running(state).map(|()| catalog::sign_in_demo(request, env))
            }
            MarketplaceAction::SignOut { .. } => {
                no_commit_running(state).map(|()| complete(request, Outcome::SignedOut))
            }
            MarketplaceAction::LoadListings { .. } => Ok(catalog::load_listings(request, env)),
            MarketplaceAction::CreateListing { draft, .. } => {
                catalog::create_listing(state, request, draft, env)
            }

            // Ledger
            MarketplaceAction::AddCredits {
                amount,
                price_charged,
                ..
            } => ledger::add_credits(state, request, amount, price_charged, env),
            MarketplaceAction::DebitCredits { amount, .. } => {
                ledger::debit_credits(state, request, amount, env)
            }
            MarketplaceAction::Transfer {
                recipient_email,
                amount,
                ..
            } => ledger::transfer(state, request, &recipient_email, amount, env),
            MarketplaceAction::RecipientResolved {
                sender,
                recipient,
                amount,
                intent,
                ..
            } => ledger::recipient_resolved(state, request, sender, recipient, amount, intent, env),
            MarketplaceAction::TransferDebited {
                sender,
                recipient,
                amount,
                balance,
                intent,
                ..
            } => ledger::transfer_debited(
                state, request, sender, recipient, amount, balance, intent, env,
            ),

            // Booking
            MarketplaceAction::InitiateBooking { listing, .. } => {
                booking::initiate(state, request, listing)
            }
            MarketplaceAction::ChooseSlot { at, .. } => {
                booking::choose_slot(state, request, at, env)
            }
            MarketplaceAction::CancelBooking { .. } => booking::cancel(state, request),
            MarketplaceAction::FinalizeBooking { at, .. } => {
                booking::finalize(state, request, at, env)
            }
            MarketplaceAction::BookingDebited {
                learner,
                listing,
                at,
                balance,
                intent,
                ..
            } => booking::debited(state, request, learner, listing, at, balance, intent, env),

            // Session lifecycle
            MarketplaceAction::JoinSession { session_id, .. } => {
                lifecycle::join(state, request, &session_id, env)
            }
            MarketplaceAction::EndSession { .. } => lifecycle::end(state, request, env),
            MarketplaceAction::RefreshSessions { .. } => lifecycle::refresh(state, request, env),

            // Inbox
            MarketplaceAction::StartConversation { participant, .. } => {
                Ok(start_conversation(state, request, participant))
            }
            MarketplaceAction::SendMessage {
                conversation_id,
                text,
                ..
            } => send_message(state, request, conversation_id, &text, env),

            // Terminal
            MarketplaceAction::Completed { outcome, .. } => {
                apply_outcome(state, outcome);
                Ok(smallvec![])
            }
            MarketplaceAction::Failed { error, .. } => {
                record_failure(state, request, error);
                Ok(smallvec![])
            }
        };

        step.unwrap_or_else(|error| {
            tracing::debug!(request_id = %request, %error, "Rejected locally");
            fail(request, error)
        })
    }
}

/// The account cannot change while a booking payment is in flight.
fn no_commit_running(state: &ClientState) -> Result<(), EngineError> {
    if matches!(state.booking, BookingFlow::Committing { .. }) {
        return Err(ValidationError::BookingInProgress.into());
    }
    Ok(())
}

/// Apply a committed outcome to the cache.
fn apply_outcome(state: &mut ClientState, outcome: Outcome) {
    match outcome {
        Outcome::SignedIn {
            account,
            sessions,
            conversations,
        } => {
            let listings = std::mem::take(&mut state.listings);
            *state = ClientState {
                account: Some(account),
                listings,
                ..ClientState::default()
            };
            for session in sessions {
                state.upsert_session(session);
            }
            state.inbox = crate::inbox::Inbox::with_conversations(conversations);
        }
        Outcome::SignedOut => *state = ClientState::default(),
        Outcome::ListingsLoaded { listings } => state.listings = listings,
        Outcome::ListingCreated { listing, promoted } => {
            state.listings.insert(0, listing);
            if promoted {
                if let Some(account) = state.account.as_mut() {
                    account.role = Role::Expert;
                }
            }
        }
        Outcome::CreditsAdded(receipt) => state.set_balance(receipt.balance),
        Outcome::CreditsDebited { balance } => state.set_balance(balance),
        Outcome::Transferred(receipt) => state.mirror_balance(&receipt.sender, receipt.balance),
        Outcome::BookingStarted { listing } => state.booking = BookingFlow::Selecting { listing },
        Outcome::SlotChosen { at } => {
            if let Some(listing) = state.booking.listing().cloned() {
                state.booking = BookingFlow::Confirming { listing, at };
            }
        }
        Outcome::BookingCancelled => state.booking = BookingFlow::Idle,
        Outcome::Booked { session, .. } if !state.holds(&session.learner_id) => {
            tracing::debug!(session_id = %session.id, "Booking for another account, cache untouched");
        }
        Outcome::Booked { session, balance } => {
            state.set_balance(balance);
            state.booking = BookingFlow::Booked {
                session_id: session.id.clone(),
            };
            state.upsert_session(session);
        }
        Outcome::SessionJoined { session_id, .. } => {
            if let Some(session) = state.session_mut(&session_id) {
                if session.status.can_advance_to(SessionStatus::Live) {
                    session.status = SessionStatus::Live;
                }
            }
            state.active_session = Some(session_id);
        }
        Outcome::SessionEnded { session_id, .. } => {
            if let Some(session) = state.session_mut(&session_id) {
                session.status = SessionStatus::Completed;
            }
            if state.active_session.as_ref() == Some(&session_id) {
                state.active_session = None;
            }
        }
        Outcome::SessionsRefreshed { sessions } => {
            state
                .sessions
                .retain(|session| session.origin.is_synthetic());
            for session in sessions {
                state.upsert_session(session);
            }
        }
        Outcome::ConversationStarted { conversation } => {
            state.inbox.start(conversation);
        }
        Outcome::MessageSent {
            conversation_id,
            message,
        } => {
            state.inbox.append(&conversation_id, message);
        }
    }
}

/// A failed booking commit moves the flow to `Failed`; other failures leave
/// the cache alone.
fn record_failure(state: &mut ClientState, request: RequestId, error: EngineError) {
    if let BookingFlow::Committing {
        listing,
        request: committing,
        ..
    } = &state.booking
    {
        if *committing == request {
            tracing::warn!(listing_id = %listing.id, %error, "Booking failed");
            state.booking = BookingFlow::Failed {
                listing: listing.clone(),
                error,
            };
        }
    }
}

fn start_conversation(
    state: &ClientState,
    request: RequestId,
    participant: Participant,
) -> Effects<MarketplaceAction> {
    let conversation = state
        .inbox
        .with_participant(&participant.id)
        .cloned()
        .unwrap_or_else(|| Conversation::new(participant));
    complete(request, Outcome::ConversationStarted { conversation })
}

fn send_message(
    state: &ClientState,
    request: RequestId,
    conversation_id: ConversationId,
    text: &str,
    env: &MarketplaceEnvironment,
) -> Step {
    let account = signed_in(state)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyMessage.into());
    }
    if state.inbox.get(&conversation_id).is_none() {
        return Err(ValidationError::UnknownConversation(conversation_id).into());
    }

    let message = ChatMessage {
        id: Uuid::new_v4().to_string(),
        sender_id: account.id.clone(),
        sender_name: account.name.clone(),
        text: text.to_string(),
        sent_at: env.clock.now(),
        is_system: false,
    };
    Ok(complete(
        request,
        Outcome::MessageSent {
            conversation_id,
            message,
        },
    ))
}
