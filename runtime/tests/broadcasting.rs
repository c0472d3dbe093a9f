//! Integration tests for Store action broadcasting
//!
//! Covers the request/outcome pattern the marketplace facade relies on: a
//! caller sends a command tagged with a request id and waits for the terminal
//! action carrying the same id.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use skillswap_core::{effect::Effect, reducer::Effects, reducer::Reducer, smallvec};
use skillswap_runtime::{RuntimeError, Store};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum LedgerAction {
    /// Two-step command
    Move { id: u64, amount: u32 },
    /// First step committed
    Debited { id: u64, amount: u32 },
    /// Terminal success
    Moved { id: u64 },
    /// Never answered
    Hang { id: u64 },
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    debited: u32,
    credited: u32,
    steps: Vec<&'static str>,
}

struct LedgerReducer;

impl Reducer for LedgerReducer {
    type State = LedgerState;
    type Action = LedgerAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut LedgerState,
        action: LedgerAction,
        _env: &(),
    ) -> Effects<LedgerAction> {
        match action {
            LedgerAction::Move { id, amount } => {
                state.steps.push("requested");
                smallvec![Effect::task(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    LedgerAction::Debited { id, amount }
                })]
            }
            LedgerAction::Debited { id, amount } => {
                state.steps.push("debited");
                state.debited += amount;
                smallvec![Effect::task(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    LedgerAction::Moved { id }
                })]
            }
            LedgerAction::Moved { .. } => {
                state.steps.push("moved");
                state.credited = state.debited;
                smallvec![]
            }
            LedgerAction::Hang { .. } => smallvec![Effect::Future(Box::pin(
                futures_pending()
            ))],
        }
    }
}

async fn futures_pending() -> Option<LedgerAction> {
    tokio::time::sleep(Duration::from_secs(3600)).await;
    None
}

fn is_terminal(id: u64) -> impl Fn(&LedgerAction) -> bool {
    move |action| matches!(action, LedgerAction::Moved { id: done } if *done == id)
}

#[tokio::test]
async fn terminal_action_is_observed_after_it_was_reduced() {
    let store = Store::new(LedgerState::default(), LedgerReducer, ());

    let outcome = store
        .send_and_wait_for(
            LedgerAction::Move { id: 1, amount: 4 },
            is_terminal(1),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(outcome, LedgerAction::Moved { id: 1 });
    let state = store.state(Clone::clone).await;
    assert_eq!(state.steps, vec!["requested", "debited", "moved"]);
    assert_eq!(state.credited, 4);
}

#[tokio::test]
async fn concurrent_requests_resolve_by_their_own_id() {
    let store = Store::new(LedgerState::default(), LedgerReducer, ());

    let (first, second) = tokio::join!(
        store.send_and_wait_for(
            LedgerAction::Move { id: 10, amount: 1 },
            is_terminal(10),
            Duration::from_secs(1),
        ),
        store.send_and_wait_for(
            LedgerAction::Move { id: 20, amount: 2 },
            is_terminal(20),
            Duration::from_secs(1),
        ),
    );

    assert_eq!(first.unwrap(), LedgerAction::Moved { id: 10 });
    assert_eq!(second.unwrap(), LedgerAction::Moved { id: 20 });
}

#[tokio::test]
async fn wait_times_out_but_effects_keep_running() {
    let store = Store::new(LedgerState::default(), LedgerReducer, ());

    let result = store
        .send_and_wait_for(
            LedgerAction::Hang { id: 3 },
            |_| false,
            Duration::from_millis(20),
        )
        .await;

    assert_eq!(result.unwrap_err(), RuntimeError::Timeout);
    assert_eq!(store.pending_effects(), 1);
}

#[tokio::test]
async fn subscribers_see_every_reduced_action_in_order() {
    let store = Store::new(LedgerState::default(), LedgerReducer, ());
    let mut rx = store.subscribe_actions();

    store
        .send(LedgerAction::Move { id: 5, amount: 1 })
        .await
        .unwrap();
    store.settle(Duration::from_secs(1)).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(action) = rx.try_recv() {
        seen.push(action);
    }
    assert_eq!(
        seen,
        vec![
            LedgerAction::Move { id: 5, amount: 1 },
            LedgerAction::Debited { id: 5, amount: 1 },
            LedgerAction::Moved { id: 5 },
        ]
    );
}
