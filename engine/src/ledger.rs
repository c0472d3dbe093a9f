//! Credit Ledger Engine.
//!
//! Add, debit and peer-to-peer transfer. Every balance written to the
//! ledger store is a full replacement value computed from the cached (or
//! last-read) balance.
//!
//! A transfer is two independent writes, issued strictly in order:
//!
//! ```text
//! Transfer ──lookup──▶ RecipientResolved ──debit sender──▶ TransferDebited ──credit recipient──▶ Completed
//!     │                       │                                  │
//!     └─▶ Failed              └─▶ Failed (PaymentStepFailed)     └─▶ Failed (PartialTransferFailure)
//! ```
//!
//! The sender write is only issued after `RecipientResolved` has been
//! reduced, and the recipient write only after `TransferDebited` has mirrored
//! the debit into the cache. There is no compensation: a failed recipient
//! write leaves the sender debited and, when journaling is on, the intent
//! open for reconciliation.

use crate::action::{MarketplaceAction, Outcome, RequestId, TopUpReceipt, TransferReceipt};
use crate::environment::MarketplaceEnvironment;
use crate::error::{EngineError, ValidationError};
use crate::reducer::{complete, signed_in, Step};
use crate::state::ClientState;
use chrono::{DateTime, Utc};
use skillswap_core::effect::Effect;
use skillswap_core::smallvec;
use skillswap_core::stores::{IntentJournal, StoreError};
use skillswap_core::types::{Account, Credits, IntentId, IntentKind, PendingIntent, UserId};
use skillswap_runtime::metrics::{counter, PARTIAL_FAILURES};
use skillswap_runtime::retry_read;
use std::sync::Arc;

/// A top-up offer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CreditPackage {
    /// Credits granted
    pub credits: Credits,
    /// Price shown to the user
    pub price: u64,
}

/// Top-up offers, smallest first.
pub const CREDIT_PACKAGES: [CreditPackage; 3] = [
    CreditPackage {
        credits: Credits::new(10),
        price: 10,
    },
    CreditPackage {
        credits: Credits::new(50),
        price: 45,
    },
    CreditPackage {
        credits: Credits::new(100),
        price: 85,
    },
];

fn positive(amount: Credits) -> Result<(), EngineError> {
    if amount.is_zero() {
        return Err(ValidationError::NonPositiveAmount.into());
    }
    Ok(())
}

/// Write `balance` for the signed-in account, or apply it locally for demo
/// accounts, then complete with `outcome`.
fn commit_balance(
    account: &Account,
    balance: Credits,
    request: RequestId,
    outcome: Outcome,
    env: &MarketplaceEnvironment,
) -> Step {
    if account.origin.is_synthetic() {
        tracing::debug!(user_id = %account.id, %balance, "Demo account, balance kept local");
        return Ok(complete(request, outcome));
    }

    let ledger = Arc::clone(&env.ledger);
    let user = account.id.clone();
    Ok(smallvec![Effect::task(async move {
        match ledger.write_balance(&user, balance).await {
            Ok(()) => MarketplaceAction::Completed { request, outcome },
            Err(error) => {
                tracing::warn!(user_id = %user, %error, "Balance write failed");
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

/// Add `amount` to the signed-in account.
pub(crate) fn add_credits(
    state: &ClientState,
    request: RequestId,
    amount: Credits,
    price_charged: Option<u64>,
    env: &MarketplaceEnvironment,
) -> Step {
    let account = signed_in(state)?;
    positive(amount)?;
    let balance = account
        .balance
        .checked_add(amount)
        .ok_or(ValidationError::BalanceOverflow)?;

    tracing::info!(user_id = %account.id, %amount, ?price_charged, "Adding credits");
    let receipt = TopUpReceipt {
        amount,
        price_charged,
        balance,
    };
    commit_balance(account, balance, request, Outcome::CreditsAdded(receipt), env)
}

/// Remove `amount` from the signed-in account.
pub(crate) fn debit_credits(
    state: &ClientState,
    request: RequestId,
    amount: Credits,
    env: &MarketplaceEnvironment,
) -> Step {
    let account = signed_in(state)?;
    positive(amount)?;
    let balance = account
        .balance
        .checked_sub(amount)
        .ok_or_else(|| EngineError::insufficient(amount, account.balance))?;

    tracing::info!(user_id = %account.id, %amount, "Debiting credits");
    commit_balance(
        account,
        balance,
        request,
        Outcome::CreditsDebited { balance },
        env,
    )
}

/// Validate a transfer locally, then look up the recipient.
pub(crate) fn transfer(
    state: &ClientState,
    request: RequestId,
    recipient_email: &str,
    amount: Credits,
    env: &MarketplaceEnvironment,
) -> Step {
    let account = signed_in(state)?;
    if account.origin.is_synthetic() {
        return Err(ValidationError::DemoMode.into());
    }
    positive(amount)?;
    if amount > account.balance {
        return Err(ValidationError::ExceedsBalance {
            requested: amount,
            available: account.balance,
        }
        .into());
    }
    let email = recipient_email.trim().to_string();
    if email.is_empty() {
        return Err(ValidationError::EmptyRecipient.into());
    }

    tracing::info!(user_id = %account.id, %amount, "Starting transfer");
    let sender = account.id.clone();
    let env = env.clone();
    Ok(smallvec![Effect::task(async move {
        let lookup = retry_read(
            env.read_policy(),
            "find_account_by_email",
            || env.directory.find_account_by_email(&email),
            StoreError::is_transient,
        )
        .await;

        let recipient = match lookup {
            Ok(Some(recipient)) => recipient,
            Ok(None) => {
                return MarketplaceAction::Failed {
                    request,
                    error: EngineError::RecipientNotFound { email },
                };
            }
            Err(error) => {
                tracing::warn!(%error, "Recipient lookup failed");
                return MarketplaceAction::Failed {
                    request,
                    error: EngineError::RecipientNotFound { email },
                };
            }
        };
        if recipient.id == sender {
            return MarketplaceAction::Failed {
                request,
                error: EngineError::SelfTransfer,
            };
        }

        let kind = IntentKind::Transfer {
            from: sender.clone(),
            to: recipient.id.clone(),
            amount,
        };
        match open_intent(env.intent_journal(), kind, env.clock.now()).await {
            Ok(intent) => MarketplaceAction::RecipientResolved {
                request,
                sender,
                recipient,
                amount,
                intent,
            },
            Err(error) => MarketplaceAction::Failed {
                request,
                error: EngineError::PaymentStepFailed {
                    reason: format!("could not record transfer intent: {error}"),
                },
            },
        }
    })])
}

/// Step one: debit the sender.
///
/// `sender` is the account validated by `Transfer`; the cache must still hold
/// it, since the debit is computed from the cached balance.
pub(crate) fn recipient_resolved(
    state: &ClientState,
    request: RequestId,
    sender: UserId,
    recipient: Account,
    amount: Credits,
    intent: Option<IntentId>,
    env: &MarketplaceEnvironment,
) -> Step {
    let journal = env.intent_journal();
    let checked = signed_in(state).and_then(|account| {
        if account.id != sender {
            return Err(EngineError::AuthenticationRequired);
        }
        account
            .balance
            .checked_sub(amount)
            .ok_or_else(|| EngineError::insufficient(amount, account.balance))
    });
    let balance = match checked {
        Ok(balance) => balance,
        Err(error) => {
            // The cache moved since validation; nothing was written yet.
            return Ok(smallvec![Effect::task(async move {
                close_intent(journal, intent).await;
                MarketplaceAction::Failed { request, error }
            })]);
        }
    };

    let ledger = Arc::clone(&env.ledger);
    Ok(smallvec![Effect::task(async move {
        match ledger.write_balance(&sender, balance).await {
            Ok(()) => MarketplaceAction::TransferDebited {
                request,
                sender,
                recipient,
                amount,
                balance,
                intent,
            },
            Err(error) => {
                tracing::warn!(user_id = %sender, %error, "Sender debit failed, nothing changed");
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

/// Step two: mirror the debit, then credit the recipient.
///
/// The credit goes ahead whoever the cache now holds; the sender's money has
/// already left.
#[allow(clippy::too_many_arguments)]
pub(crate) fn transfer_debited(
    state: &mut ClientState,
    request: RequestId,
    sender: UserId,
    recipient: Account,
    amount: Credits,
    balance: Credits,
    intent: Option<IntentId>,
    env: &MarketplaceEnvironment,
) -> Step {
    state.mirror_balance(&sender, balance);

    let env = env.clone();
    Ok(smallvec![Effect::task(async move {
        // Prefer a fresh read; the lookup's balance is the fallback.
        let last_read = retry_read(
            env.read_policy(),
            "read_balance",
            || env.ledger.read_balance(&recipient.id),
            StoreError::is_transient,
        )
        .await
        .unwrap_or(recipient.balance);

        let credited = match last_read.checked_add(amount) {
            Some(credited) => env
                .ledger
                .write_balance(&recipient.id, credited)
                .await
                .map_err(|error| error.to_string()),
            None => Err("recipient balance would overflow".to_string()),
        };

        match credited {
            Ok(()) => {
                close_intent(env.intent_journal(), intent).await;
                tracing::info!(recipient = %recipient.id, %amount, "Transfer completed");
                MarketplaceAction::Completed {
                    request,
                    outcome: Outcome::Transferred(TransferReceipt {
                        sender,
                        recipient: recipient.id,
                        recipient_name: recipient.name,
                        amount,
                        balance,
                    }),
                }
            }
            Err(reason) => {
                counter!(PARTIAL_FAILURES, "step" => "transfer_credit").increment(1);
                tracing::error!(
                    recipient = %recipient.id,
                    %amount,
                    intent = ?intent,
                    %reason,
                    "Sender debited but recipient credit failed"
                );
                MarketplaceAction::Failed {
                    request,
                    error: EngineError::PartialTransferFailure {
                        recipient: recipient.id,
                        amount,
                        intent,
                        reason,
                    },
                }
            }
        }
    })])
}

/// Record an intent when a journal is configured.
///
/// # Errors
///
/// The journal's error; the mutation must not start.
pub(crate) async fn open_intent(
    journal: Option<Arc<dyn IntentJournal>>,
    kind: IntentKind,
    now: DateTime<Utc>,
) -> Result<Option<IntentId>, StoreError> {
    let Some(journal) = journal else {
        return Ok(None);
    };
    let intent = PendingIntent {
        id: IntentId::new(),
        kind,
        opened_at: now,
    };
    let id = intent.id;
    journal.open(intent).await?;
    tracing::debug!(intent = %id, "Intent opened");
    Ok(Some(id))
}

/// Resolve an intent, best effort.
pub(crate) async fn close_intent(journal: Option<Arc<dyn IntentJournal>>, intent: Option<IntentId>) {
    let (Some(journal), Some(id)) = (journal, intent) else {
        return;
    };
    if let Err(error) = journal.resolve(id).await {
        tracing::warn!(intent = %id, %error, "Could not resolve intent");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::reducer::MarketplaceReducer;
    use crate::test_support::{environment, signed_in_state};
    use skillswap_core::types::Origin;
    use skillswap_testing::memory::Operation;
    use skillswap_testing::{helpers, ReducerTest};

    fn failed_with(actions: &[MarketplaceAction], expected: &EngineError) -> bool {
        actions
            .iter()
            .any(|a| matches!(a, MarketplaceAction::Failed { error, .. } if error == expected))
    }

    #[tokio::test]
    async fn sender_debit_is_skipped_once_another_account_is_cached() {
        let (env, harness) = environment();

        ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(signed_in_state("u2", 9))
            .when_action(MarketplaceAction::RecipientResolved {
                request: RequestId::new(),
                sender: UserId::new("u1"),
                recipient: helpers::account("u3", 0),
                amount: Credits::new(2),
                intent: None,
            })
            .then_actions(|actions| {
                assert!(failed_with(actions, &EngineError::AuthenticationRequired));
            })
            .then_state(|state| assert_eq!(state.balance(), Some(Credits::new(9))))
            .run_to_completion()
            .await;

        assert!(harness.log().writes().is_empty());
    }

    #[tokio::test]
    async fn recipient_credit_survives_a_sign_out() {
        let (env, harness) = environment();

        let state = ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(ClientState::default())
            .when_action(MarketplaceAction::TransferDebited {
                request: RequestId::new(),
                sender: UserId::new("u1"),
                recipient: helpers::account("u2", 0),
                amount: Credits::new(2),
                balance: Credits::new(3),
                intent: None,
            })
            .then_actions(|actions| {
                assert!(matches!(
                    actions[0],
                    MarketplaceAction::Completed {
                        outcome: Outcome::Transferred(_),
                        ..
                    }
                ));
            })
            .run_to_completion()
            .await;

        let writes = harness.log().writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].target.as_deref(), Some("u2"));
        assert_eq!(writes[0].balance, Some(Credits::new(2)));
        assert!(state.account.is_none());
    }

    #[test]
    fn zero_amount_is_rejected_before_any_effect_work() {
        let (env, harness) = environment();
        let request = RequestId::new();

        ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(signed_in_state("u1", 5))
            .when_action(MarketplaceAction::AddCredits {
                request,
                amount: Credits::ZERO,
                price_charged: None,
            })
            .then_state(|state| assert_eq!(state.balance(), Some(Credits::new(5))))
            .then_effects(|effects| assert_eq!(effects.len(), 1))
            .run();

        assert!(harness.log().is_empty());
    }

    #[tokio::test]
    async fn transfer_exceeding_balance_never_reaches_a_store() {
        let (env, harness) = environment();
        let request = RequestId::new();

        let state = ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(signed_in_state("u1", 5))
            .when_action(MarketplaceAction::Transfer {
                request,
                recipient_email: "u2@skillswap.test".into(),
                amount: Credits::new(10),
            })
            .then_actions(|actions| {
                assert!(failed_with(
                    actions,
                    &ValidationError::ExceedsBalance {
                        requested: Credits::new(10),
                        available: Credits::new(5),
                    }
                    .into()
                ));
            })
            .run_to_completion()
            .await;

        assert_eq!(state.balance(), Some(Credits::new(5)));
        assert!(harness.log().is_empty());
    }

    #[tokio::test]
    async fn demo_account_top_up_stays_local() {
        let (env, harness) = environment();
        let mut state = signed_in_state("u1", 12);
        if let Some(account) = state.account.as_mut() {
            account.origin = Origin::Synthetic;
        }

        let state = ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(state)
            .when_action(MarketplaceAction::AddCredits {
                request: RequestId::new(),
                amount: CREDIT_PACKAGES[1].credits,
                price_charged: Some(CREDIT_PACKAGES[1].price),
            })
            .run_to_completion()
            .await;

        assert_eq!(state.balance(), Some(Credits::new(62)));
        assert_eq!(harness.log().count(Operation::WriteBalance), 0);
    }

    #[tokio::test]
    async fn self_transfer_is_caught_after_lookup() {
        let (env, harness) = environment();

        let state = ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(signed_in_state("u1", 5))
            .when_action(MarketplaceAction::Transfer {
                request: RequestId::new(),
                recipient_email: " u1@skillswap.test ".into(),
                amount: Credits::new(2),
            })
            .then_actions(|actions| assert!(failed_with(actions, &EngineError::SelfTransfer)))
            .run_to_completion()
            .await;

        assert_eq!(state.balance(), Some(Credits::new(5)));
        assert_eq!(harness.log().writes().len(), 0);
        assert_eq!(harness.log().count(Operation::FindAccountByEmail), 1);
    }
}
