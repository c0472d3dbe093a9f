//! Booking Engine.
//!
//! ```text
//! Idle ─initiate─▶ Selecting ─choose_slot─▶ Confirming ─finalize─▶ Committing ─▶ Booked
//!                      │                        │                       │
//!                      └────────finalize────────┘                       └──▶ Failed
//! ```
//!
//! Finalizing a persisted listing for a persisted account is a
//! pseudo-transaction of two writes: the learner's balance, then the session
//! row. The session insert is only issued once `BookingDebited` has been
//! reduced. A failed insert leaves the learner charged with no session; the
//! error says so and the open intent (if journaled) marks it for
//! reconciliation.
//!
//! Synthetic listings and demo accounts commit locally and never touch a
//! store.

use crate::action::{MarketplaceAction, Outcome, RequestId};
use crate::environment::MarketplaceEnvironment;
use crate::error::{EngineError, ValidationError};
use crate::ledger::{close_intent, open_intent};
use crate::reducer::{complete, signed_in, Step};
use crate::state::{BookingFlow, ClientState};
use chrono::{DateTime, Utc};
use skillswap_core::effect::Effect;
use skillswap_core::smallvec;
use skillswap_core::types::{
    Account, Credits, IntentId, IntentKind, Listing, NewSession, Origin, Session, SessionId,
    SessionRecord, SessionStatus, UserId,
};
use skillswap_runtime::metrics::{counter, PARTIAL_FAILURES};
use std::sync::Arc;

/// Topic of a session booked from `listing`.
#[must_use]
pub fn session_topic(listing: &Listing) -> String {
    format!("Session: {}", listing.skill_name)
}

/// Length of every booked session.
pub const SESSION_MINUTES: u32 = 60;

/// Guards shared by `initiate` and `finalize`: the learner is not the expert
/// and can afford the listing. Returns the balance after payment.
fn affordable(account: &Account, listing: &Listing) -> Result<Credits, EngineError> {
    if listing.expert_id == account.id {
        return Err(EngineError::SelfBookingDenied);
    }
    account
        .balance
        .checked_sub(listing.credit_cost)
        .ok_or_else(|| EngineError::insufficient(listing.credit_cost, account.balance))
}

fn not_committing(state: &ClientState) -> Result<(), EngineError> {
    if state.booking.is_committing() {
        return Err(ValidationError::BookingInProgress.into());
    }
    Ok(())
}

fn in_future(at: DateTime<Utc>, env: &MarketplaceEnvironment) -> Result<(), EngineError> {
    if at <= env.clock.now() {
        return Err(ValidationError::SlotInPast { at }.into());
    }
    Ok(())
}

/// Enter the booking flow for `listing`.
pub(crate) fn initiate(state: &ClientState, request: RequestId, listing: Listing) -> Step {
    not_committing(state)?;
    let account = signed_in(state)?;
    affordable(account, &listing)?;

    tracing::debug!(listing_id = %listing.id, "Booking started");
    Ok(complete(request, Outcome::BookingStarted { listing }))
}

/// Pick a start time.
pub(crate) fn choose_slot(
    state: &ClientState,
    request: RequestId,
    at: DateTime<Utc>,
    env: &MarketplaceEnvironment,
) -> Step {
    match state.booking {
        BookingFlow::Selecting { .. } | BookingFlow::Confirming { .. } => {}
        BookingFlow::Committing { .. } => return Err(ValidationError::BookingInProgress.into()),
        BookingFlow::Idle | BookingFlow::Booked { .. } | BookingFlow::Failed { .. } => {
            return Err(ValidationError::NoBookingInProgress.into());
        }
    }
    in_future(at, env)?;
    Ok(complete(request, Outcome::SlotChosen { at }))
}

/// Leave the booking flow.
pub(crate) fn cancel(state: &ClientState, request: RequestId) -> Step {
    not_committing(state)?;
    Ok(complete(request, Outcome::BookingCancelled))
}

/// Re-check the booking against the cache and commit it.
pub(crate) fn finalize(
    state: &mut ClientState,
    request: RequestId,
    at: Option<DateTime<Utc>>,
    env: &MarketplaceEnvironment,
) -> Step {
    let (listing, at) = match &state.booking {
        BookingFlow::Selecting { listing } => (listing.clone(), at),
        BookingFlow::Confirming {
            listing,
            at: chosen,
        } => (listing.clone(), at.or(Some(*chosen))),
        BookingFlow::Committing { .. } => return Err(ValidationError::BookingInProgress.into()),
        BookingFlow::Idle | BookingFlow::Booked { .. } | BookingFlow::Failed { .. } => {
            return Err(ValidationError::NoBookingInProgress.into());
        }
    };
    let at = at.ok_or(ValidationError::NoSlotChosen)?;
    in_future(at, env)?;
    let account = signed_in(state)?;
    let balance = affordable(account, &listing)?;

    if listing.origin.is_synthetic() || account.origin.is_synthetic() {
        tracing::info!(listing_id = %listing.id, "Booking committed locally");
        let session = Session {
            id: SessionId::local(),
            listing_id: Some(listing.id.clone()),
            expert_id: listing.expert_id.clone(),
            expert: listing.expert.clone(),
            skill_name: Some(listing.skill_name.clone()),
            learner_id: account.id.clone(),
            status: SessionStatus::Scheduled,
            scheduled_at: at,
            duration_minutes: SESSION_MINUTES,
            topic: session_topic(&listing),
            origin: Origin::Synthetic,
        };
        return Ok(complete(request, Outcome::Booked { session, balance }));
    }

    tracing::info!(
        user_id = %account.id,
        listing_id = %listing.id,
        amount = %listing.credit_cost,
        "Committing booking"
    );
    let learner = account.id.clone();
    let kind = IntentKind::Booking {
        learner: learner.clone(),
        listing_id: listing.id.clone(),
        amount: listing.credit_cost,
        scheduled_at: at,
    };
    state.booking = BookingFlow::Committing {
        listing: listing.clone(),
        at,
        request,
    };

    let ledger = Arc::clone(&env.ledger);
    let journal = env.intent_journal();
    let now = env.clock.now();
    Ok(smallvec![Effect::task(async move {
        let intent = match open_intent(journal.clone(), kind, now).await {
            Ok(intent) => intent,
            Err(error) => {
                return MarketplaceAction::Failed {
                    request,
                    error: EngineError::PaymentStepFailed {
                        reason: format!("could not record booking intent: {error}"),
                    },
                };
            }
        };
        match ledger.write_balance(&learner, balance).await {
            Ok(()) => MarketplaceAction::BookingDebited {
                request,
                learner,
                listing,
                at,
                balance,
                intent,
            },
            Err(error) => {
                tracing::warn!(user_id = %learner, %error, "Booking payment failed, nothing changed");
                close_intent(journal, intent).await;
                MarketplaceAction::Failed {
                    request,
                    error: EngineError::PaymentStepFailed {
                        reason: error.to_string(),
                    },
                }
            }
        }
    })])
}

/// Payment committed: mirror it, then insert the session row for the
/// learner who paid.
#[allow(clippy::too_many_arguments)]
pub(crate) fn debited(
    state: &mut ClientState,
    request: RequestId,
    learner: UserId,
    listing: Listing,
    at: DateTime<Utc>,
    balance: Credits,
    intent: Option<IntentId>,
    env: &MarketplaceEnvironment,
) -> Step {
    state.mirror_balance(&learner, balance);

    let new_session = NewSession {
        listing_id: Some(listing.id.clone()),
        expert_id: listing.expert_id.clone(),
        learner_id: learner,
        status: SessionStatus::Scheduled,
        scheduled_at: at,
        duration_minutes: SESSION_MINUTES,
        topic: session_topic(&listing),
    };
    let sessions = Arc::clone(&env.sessions);
    let journal = env.intent_journal();
    Ok(smallvec![Effect::task(async move {
        match sessions.insert_session(new_session.clone()).await {
            Ok(id) => {
                close_intent(journal, intent).await;
                let record = SessionRecord {
                    id,
                    listing_id: new_session.listing_id,
                    expert_id: new_session.expert_id,
                    learner_id: new_session.learner_id,
                    status: new_session.status,
                    scheduled_at: new_session.scheduled_at,
                    duration_minutes: new_session.duration_minutes,
                    topic: new_session.topic,
                };
                let session = Session::from_record(
                    record,
                    listing.expert,
                    Some(listing.skill_name),
                    Origin::Persisted,
                );
                tracing::info!(session_id = %session.id, "Session booked");
                MarketplaceAction::Completed {
                    request,
                    outcome: Outcome::Booked { session, balance },
                }
            }
            Err(error) => {
                counter!(PARTIAL_FAILURES, "step" => "session_insert").increment(1);
                tracing::error!(
                    listing_id = %listing.id,
                    amount = %listing.credit_cost,
                    intent = ?intent,
                    %error,
                    "Learner charged but session insert failed"
                );
                MarketplaceAction::Failed {
                    request,
                    error: EngineError::BookingStepFailed {
                        listing_id: listing.id,
                        charged: listing.credit_cost,
                        intent,
                        reason: error.to_string(),
                    },
                }
            }
        }
    })])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::reducer::MarketplaceReducer;
    use crate::seed;
    use crate::test_support::{environment, persisted_listing, signed_in_state};
    use chrono::Duration;
    use skillswap_testing::memory::Operation;
    use skillswap_testing::{test_clock, ReducerTest};

    fn tomorrow() -> DateTime<Utc> {
        use skillswap_core::environment::Clock;
        test_clock().now() + Duration::days(1)
    }

    #[tokio::test]
    async fn committed_payment_books_for_the_payer_not_the_cache() {
        let (env, harness) = environment();
        let listing = persisted_listing("l9", "e1", 2);

        let state = ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(signed_in_state("u2", 0))
            .when_action(MarketplaceAction::BookingDebited {
                request: RequestId::new(),
                learner: UserId::new("u1"),
                listing,
                at: tomorrow(),
                balance: Credits::new(3),
                intent: None,
            })
            .then_actions(|actions| {
                assert!(matches!(
                    actions[0],
                    MarketplaceAction::Completed {
                        outcome: Outcome::Booked { .. },
                        ..
                    }
                ));
            })
            .run_to_completion()
            .await;

        let inserts: Vec<_> = harness
            .log()
            .calls()
            .into_iter()
            .filter(|call| call.operation == Operation::InsertSession)
            .collect();
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].target.as_deref(), Some("u1"));
        assert_eq!(state.balance(), Some(Credits::ZERO));
        assert!(state.sessions.is_empty());
        assert_eq!(state.booking, BookingFlow::Idle);
    }

    #[test]
    fn initiate_requires_sign_in() {
        let (env, _) = environment();
        let request = RequestId::new();

        ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(ClientState::default())
            .when_action(MarketplaceAction::InitiateBooking {
                request,
                listing: persisted_listing("l9", "e1", 2),
            })
            .then_state(|state| assert_eq!(state.booking, BookingFlow::Idle))
            .run();
    }

    #[tokio::test]
    async fn booking_own_listing_is_denied() {
        let (env, _) = environment();

        ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(signed_in_state("e1", 10))
            .when_action(MarketplaceAction::InitiateBooking {
                request: RequestId::new(),
                listing: persisted_listing("l9", "e1", 2),
            })
            .then_actions(|actions| {
                assert!(matches!(
                    actions[0],
                    MarketplaceAction::Failed {
                        error: EngineError::SelfBookingDenied,
                        ..
                    }
                ));
            })
            .then_state(|state| assert_eq!(state.booking, BookingFlow::Idle))
            .run_to_completion()
            .await;
    }

    #[tokio::test]
    async fn insufficient_balance_reports_exact_shortfall_without_store_calls() {
        let (env, harness) = environment();

        ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(signed_in_state("u1", 1))
            .when_action(MarketplaceAction::InitiateBooking {
                request: RequestId::new(),
                listing: persisted_listing("l9", "e1", 3),
            })
            .then_actions(|actions| {
                assert!(matches!(
                    &actions[0],
                    MarketplaceAction::Failed { error, .. }
                        if *error == EngineError::insufficient(Credits::new(3), Credits::new(1))
                ));
            })
            .run_to_completion()
            .await;

        assert!(harness.log().is_empty());
    }

    #[tokio::test]
    async fn synthetic_listing_commits_locally() {
        let (env, harness) = environment();
        let listing = seed::listings().remove(1);

        let state = ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(signed_in_state("u1", 5))
            .when_action(MarketplaceAction::InitiateBooking {
                request: RequestId::new(),
                listing: listing.clone(),
            })
            .when_action(MarketplaceAction::FinalizeBooking {
                request: RequestId::new(),
                at: Some(tomorrow()),
            })
            .run_to_completion()
            .await;

        assert!(harness.log().is_empty());
        assert_eq!(state.balance(), Some(Credits::new(3)));
        let session = &state.sessions[0];
        assert_eq!(session.status, SessionStatus::Scheduled);
        assert_eq!(session.duration_minutes, 60);
        assert!(session.origin.is_synthetic());
        assert_eq!(
            state.booking,
            BookingFlow::Booked {
                session_id: session.id.clone()
            }
        );
    }

    #[tokio::test]
    async fn slot_in_the_past_leaves_the_flow_untouched() {
        let (env, _) = environment();
        let listing = persisted_listing("l9", "e1", 2);

        let state = ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(signed_in_state("u1", 5))
            .when_action(MarketplaceAction::InitiateBooking {
                request: RequestId::new(),
                listing: listing.clone(),
            })
            .when_action(MarketplaceAction::FinalizeBooking {
                request: RequestId::new(),
                at: Some(tomorrow() - Duration::days(2)),
            })
            .run_to_completion()
            .await;

        assert_eq!(state.booking, BookingFlow::Selecting { listing });
    }

    #[test]
    fn second_finalize_while_committing_is_rejected() {
        let (env, _) = environment();
        let listing = persisted_listing("l9", "e1", 2);
        let mut given = signed_in_state("u1", 5);
        given.booking = BookingFlow::Confirming {
            listing,
            at: tomorrow(),
        };

        ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(given)
            .when_action(MarketplaceAction::FinalizeBooking {
                request: RequestId::new(),
                at: None,
            })
            .when_action(MarketplaceAction::FinalizeBooking {
                request: RequestId::new(),
                at: None,
            })
            .then_state(|state| assert!(state.booking.is_committing()))
            .then_effects(|effects| assert_eq!(effects.len(), 1))
            .run();
    }

    #[tokio::test]
    async fn failed_payment_moves_the_flow_to_failed() {
        let (env, harness) = environment();
        harness.inject(
            Operation::WriteBalance,
            skillswap_core::stores::StoreError::Unavailable("down".into()),
        );
        let listing = persisted_listing("l9", "e1", 2);

        let state = ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(signed_in_state("u1", 5))
            .when_action(MarketplaceAction::InitiateBooking {
                request: RequestId::new(),
                listing,
            })
            .when_action(MarketplaceAction::FinalizeBooking {
                request: RequestId::new(),
                at: Some(tomorrow()),
            })
            .run_to_completion()
            .await;

        assert!(matches!(
            state.booking,
            BookingFlow::Failed {
                error: EngineError::PaymentStepFailed { .. },
                ..
            }
        ));
        assert_eq!(state.balance(), Some(Credits::new(5)));
        assert_eq!(harness.log().count(Operation::InsertSession), 0);
    }
}
