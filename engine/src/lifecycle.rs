//! Session Lifecycle Controller.
//!
//! Joining moves a scheduled session to live and makes it the active one;
//! ending moves the active live session to completed. Status writes are best
//! effort: a failed write is logged and the cache moves on anyway. Synthetic
//! sessions never reach the session store.

use crate::action::{MarketplaceAction, Outcome, RequestId};
use crate::environment::MarketplaceEnvironment;
use crate::error::{EngineError, ValidationError};
use crate::reducer::{complete, signed_in, Step};
use crate::state::ClientState;
use skillswap_core::effect::Effect;
use skillswap_core::smallvec;
use skillswap_core::stores::{SessionStore, StoreError};
use skillswap_core::types::{
    ExpertProfile, ListingId, Origin, Session, SessionFilter, SessionId, SessionOrder,
    SessionStatus, UserId,
};
use skillswap_runtime::retry_read;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Persist a status change unless the session is synthetic, then complete.
fn persist_status(
    sessions: Arc<dyn SessionStore>,
    session_id: SessionId,
    origin: Origin,
    status: SessionStatus,
    request: RequestId,
    outcome: impl FnOnce(SessionId, bool) -> Outcome + Send + 'static,
) -> Step {
    if origin.is_synthetic() {
        return Ok(complete(request, outcome(session_id, false)));
    }
    Ok(smallvec![Effect::task(async move {
        let persisted = match sessions.update_session_status(&session_id, status).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(
                    session_id = %session_id,
                    status = %status,
                    %error,
                    "Session status not persisted"
                );
                false
            }
        };
        MarketplaceAction::Completed {
            request,
            outcome: outcome(session_id, persisted),
        }
    })])
}

/// Go live in `session_id`.
pub(crate) fn join(
    state: &ClientState,
    request: RequestId,
    session_id: &SessionId,
    env: &MarketplaceEnvironment,
) -> Step {
    let session = state
        .session(session_id)
        .ok_or_else(|| EngineError::SessionNotFound(session_id.clone()))?;
    if let Some(active) = &state.active_session {
        if active != session_id {
            return Err(ValidationError::AnotherSessionActive(active.clone()).into());
        }
    }

    match session.status {
        SessionStatus::Live => {
            tracing::debug!(session_id = %session_id, "Already live");
            Ok(complete(
                request,
                Outcome::SessionJoined {
                    session_id: session_id.clone(),
                    persisted: false,
                },
            ))
        }
        SessionStatus::Scheduled => {
            tracing::info!(session_id = %session_id, "Joining session");
            persist_status(
                Arc::clone(&env.sessions),
                session_id.clone(),
                session.origin,
                SessionStatus::Live,
                request,
                |session_id, persisted| Outcome::SessionJoined {
                    session_id,
                    persisted,
                },
            )
        }
        from @ (SessionStatus::Completed | SessionStatus::Cancelled) => {
            Err(EngineError::InvalidTransition {
                from,
                to: SessionStatus::Live,
            })
        }
    }
}

/// Complete the active session.
pub(crate) fn end(state: &ClientState, request: RequestId, env: &MarketplaceEnvironment) -> Step {
    let active = state
        .active_session
        .as_ref()
        .ok_or(EngineError::NoActiveSession)?;
    let session = state
        .session(active)
        .ok_or_else(|| EngineError::SessionNotFound(active.clone()))?;
    if !session.status.can_advance_to(SessionStatus::Completed) {
        return Err(EngineError::InvalidTransition {
            from: session.status,
            to: SessionStatus::Completed,
        });
    }

    tracing::info!(session_id = %active, "Ending session");
    persist_status(
        Arc::clone(&env.sessions),
        active.clone(),
        session.origin,
        SessionStatus::Completed,
        request,
        |session_id, persisted| Outcome::SessionEnded {
            session_id,
            persisted,
        },
    )
}

/// Reload the signed-in user's sessions.
pub(crate) fn refresh(
    state: &ClientState,
    request: RequestId,
    env: &MarketplaceEnvironment,
) -> Step {
    let account = signed_in(state)?;
    if account.origin.is_synthetic() {
        return Ok(complete(
            request,
            Outcome::SessionsRefreshed {
                sessions: Vec::new(),
            },
        ));
    }

    let user = account.id.clone();
    let env = env.clone();
    Ok(smallvec![Effect::task(async move {
        let sessions = load_sessions(&env, &user).await;
        MarketplaceAction::Completed {
            request,
            outcome: Outcome::SessionsRefreshed { sessions },
        }
    })])
}

/// Sessions of `user`, earliest first, with listing skills and expert
/// identities joined in.
///
/// Never fails: an unreachable session store yields an empty list and
/// missing listings or experts fall back to placeholders.
pub async fn load_sessions(env: &MarketplaceEnvironment, user: &UserId) -> Vec<Session> {
    let listed = retry_read(
        env.read_policy(),
        "list_sessions",
        || {
            env.sessions.list_sessions(
                SessionFilter {
                    participant: user.clone(),
                },
                SessionOrder::ScheduledAsc,
            )
        },
        StoreError::is_transient,
    )
    .await;
    let records = match listed {
        Ok(records) => records,
        Err(error) => {
            tracing::warn!(user_id = %user, %error, "Could not list sessions, showing none");
            return Vec::new();
        }
    };
    if records.is_empty() {
        return Vec::new();
    }

    let listing_ids: Vec<ListingId> = records
        .iter()
        .filter_map(|record| record.listing_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let expert_ids: Vec<UserId> = records
        .iter()
        .map(|record| record.expert_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let (listings, experts) = tokio::join!(
        env.catalog.find_listings(&listing_ids),
        env.directory.find_experts(&expert_ids),
    );
    let skills: HashMap<ListingId, String> = listings
        .unwrap_or_else(|error| {
            tracing::warn!(%error, "Could not load session listings");
            Vec::new()
        })
        .into_iter()
        .map(|listing| (listing.id, listing.skill_name))
        .collect();
    let experts: HashMap<UserId, ExpertProfile> = experts
        .unwrap_or_else(|error| {
            tracing::warn!(%error, "Could not load session experts");
            Vec::new()
        })
        .into_iter()
        .map(|expert| (expert.id.clone(), expert))
        .collect();

    records
        .into_iter()
        .map(|record| {
            let expert = experts
                .get(&record.expert_id)
                .cloned()
                .unwrap_or_else(|| ExpertProfile::placeholder(&record.expert_id));
            let skill_name = record
                .listing_id
                .as_ref()
                .and_then(|id| skills.get(id).cloned());
            Session::from_record(record, expert, skill_name, Origin::Persisted)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::reducer::MarketplaceReducer;
    use crate::test_support::{environment, session, signed_in_state};
    use skillswap_testing::memory::Operation;
    use skillswap_testing::ReducerTest;

    #[tokio::test]
    async fn joining_a_scheduled_session_makes_it_live_and_active() {
        let (env, harness) = environment();
        let mut given = signed_in_state("u1", 5);
        given.upsert_session(session("s-1", "u1", SessionStatus::Scheduled));

        let state = ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(given)
            .when_action(MarketplaceAction::JoinSession {
                request: RequestId::new(),
                session_id: SessionId::new("s-1"),
            })
            .run_to_completion()
            .await;

        assert_eq!(state.active_session, Some(SessionId::new("s-1")));
        assert_eq!(state.sessions[0].status, SessionStatus::Live);
        assert_eq!(harness.log().count(Operation::UpdateSessionStatus), 1);
    }

    #[tokio::test]
    async fn status_write_failure_is_not_surfaced() {
        let (env, harness) = environment();
        harness.inject(
            Operation::UpdateSessionStatus,
            StoreError::Unavailable("down".into()),
        );
        let mut given = signed_in_state("u1", 5);
        given.upsert_session(session("s-1", "u1", SessionStatus::Scheduled));

        let state = ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(given)
            .when_action(MarketplaceAction::JoinSession {
                request: RequestId::new(),
                session_id: SessionId::new("s-1"),
            })
            .then_actions(|actions| {
                assert!(matches!(
                    actions[0],
                    MarketplaceAction::Completed {
                        outcome: Outcome::SessionJoined {
                            persisted: false,
                            ..
                        },
                        ..
                    }
                ));
            })
            .run_to_completion()
            .await;

        assert_eq!(state.sessions[0].status, SessionStatus::Live);
    }

    #[test]
    fn another_active_session_blocks_join() {
        let (env, _) = environment();
        let mut given = signed_in_state("u1", 5);
        given.upsert_session(session("s-1", "u1", SessionStatus::Live));
        given.upsert_session(session("s-2", "u1", SessionStatus::Scheduled));
        given.active_session = Some(SessionId::new("s-1"));

        ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(given)
            .when_action(MarketplaceAction::JoinSession {
                request: RequestId::new(),
                session_id: SessionId::new("s-2"),
            })
            .then_state(|state| {
                assert_eq!(state.active_session, Some(SessionId::new("s-1")));
                assert_eq!(
                    state.session(&SessionId::new("s-2")).map(|s| s.status),
                    Some(SessionStatus::Scheduled)
                );
            })
            .run();
    }

    #[tokio::test]
    async fn ending_clears_the_active_session() {
        let (env, harness) = environment();
        let mut given = signed_in_state("u1", 5);
        given.upsert_session(session("s-1", "u1", SessionStatus::Live));
        given.active_session = Some(SessionId::new("s-1"));

        let state = ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(given)
            .when_action(MarketplaceAction::EndSession {
                request: RequestId::new(),
            })
            .run_to_completion()
            .await;

        assert_eq!(state.active_session, None);
        assert_eq!(state.sessions[0].status, SessionStatus::Completed);
        assert_eq!(harness.log().count(Operation::UpdateSessionStatus), 1);
    }

    #[tokio::test]
    async fn completed_session_cannot_be_joined() {
        let (env, harness) = environment();
        let mut given = signed_in_state("u1", 5);
        given.upsert_session(session("s-1", "u1", SessionStatus::Completed));

        ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(given)
            .when_action(MarketplaceAction::JoinSession {
                request: RequestId::new(),
                session_id: SessionId::new("s-1"),
            })
            .then_actions(|actions| {
                assert!(matches!(
                    actions[0],
                    MarketplaceAction::Failed {
                        error: EngineError::InvalidTransition {
                            from: SessionStatus::Completed,
                            to: SessionStatus::Live,
                        },
                        ..
                    }
                ));
            })
            .run_to_completion()
            .await;

        assert!(harness.log().is_empty());
    }

    #[tokio::test]
    async fn ending_a_scheduled_session_is_rejected_without_store_calls() {
        let (env, harness) = environment();
        let mut given = signed_in_state("u1", 5);
        given.upsert_session(session("s-1", "u1", SessionStatus::Scheduled));
        given.active_session = Some(SessionId::new("s-1"));

        let state = ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(given)
            .when_action(MarketplaceAction::EndSession {
                request: RequestId::new(),
            })
            .then_actions(|actions| {
                assert!(matches!(
                    actions[0],
                    MarketplaceAction::Failed {
                        error: EngineError::InvalidTransition {
                            from: SessionStatus::Scheduled,
                            to: SessionStatus::Completed,
                        },
                        ..
                    }
                ));
            })
            .run_to_completion()
            .await;

        assert_eq!(state.sessions[0].status, SessionStatus::Scheduled);
        assert!(harness.log().is_empty());
    }
}
