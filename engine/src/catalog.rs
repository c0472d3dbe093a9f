//! Profile bootstrap and listing catalog.

use crate::action::{AuthIdentity, ListingDraft, MarketplaceAction, Outcome, RequestId};
use crate::environment::MarketplaceEnvironment;
use crate::error::{EngineError, ValidationError};
use crate::lifecycle::load_sessions;
use crate::reducer::{complete, signed_in, Step};
use crate::seed;
use crate::state::ClientState;
use skillswap_core::effect::Effect;
use skillswap_core::reducer::Effects;
use skillswap_core::smallvec;
use skillswap_core::stores::StoreError;
use skillswap_core::types::{
    Account, ExpertProfile, Listing, NewAccount, NewListing, Origin, Role, UserId,
};
use skillswap_runtime::retry_read;
use std::collections::{BTreeSet, HashMap};

/// Load the account (creating it on first sign-in), then its sessions.
pub(crate) fn sign_in(
    request: RequestId,
    identity: AuthIdentity,
    env: &MarketplaceEnvironment,
) -> Step {
    let env = env.clone();
    Ok(smallvec![Effect::task(async move {
        match load_or_create_account(&env, &identity).await {
            Ok(account) => {
                let sessions = load_sessions(&env, &account.id).await;
                tracing::info!(
                    user_id = %account.id,
                    balance = %account.balance,
                    sessions = sessions.len(),
                    "Signed in"
                );
                MarketplaceAction::Completed {
                    request,
                    outcome: Outcome::SignedIn {
                        account,
                        sessions,
                        conversations: Vec::new(),
                    },
                }
            }
            Err(error) => {
                tracing::warn!(user_id = %identity.user_id, %error, "Sign-in failed");
                MarketplaceAction::Failed {
                    request,
                    error: EngineError::Unavailable {
                        operation: "sign_in",
                        reason: error.to_string(),
                    },
                }
            }
        }
    })])
}

async fn load_or_create_account(
    env: &MarketplaceEnvironment,
    identity: &AuthIdentity,
) -> Result<Account, StoreError> {
    let existing = retry_read(
        env.read_policy(),
        "find_account",
        || env.directory.find_account(&identity.user_id),
        StoreError::is_transient,
    )
    .await?;
    if let Some(account) = existing {
        return Ok(account);
    }

    tracing::info!(user_id = %identity.user_id, "Creating profile");
    env.directory
        .create_account(NewAccount {
            id: identity.user_id.clone(),
            name: identity.profile_name(),
            email: identity.email.clone(),
            role: Role::Learner,
            balance: env.config.starting_balance,
        })
        .await
}

/// Sign in as the local demo account with its seeded sessions.
pub(crate) fn sign_in_demo(
    request: RequestId,
    env: &MarketplaceEnvironment,
) -> Effects<MarketplaceAction> {
    let now = env.clock.now();
    complete(
        request,
        Outcome::SignedIn {
            account: seed::demo_account(),
            sessions: seed::demo_sessions(now),
            conversations: seed::demo_conversations(now),
        },
    )
}

/// Load marketplace listings.
pub(crate) fn load_listings(
    request: RequestId,
    env: &MarketplaceEnvironment,
) -> Effects<MarketplaceAction> {
    let env = env.clone();
    smallvec![Effect::task(async move {
        let listings = fetch_listings(&env).await;
        MarketplaceAction::Completed {
            request,
            outcome: Outcome::ListingsLoaded { listings },
        }
    })]
}

/// Catalog listings with expert identities joined in; the seeded catalog
/// when the catalog is empty or unreachable.
pub async fn fetch_listings(env: &MarketplaceEnvironment) -> Vec<Listing> {
    let listed = retry_read(
        env.read_policy(),
        "list_listings",
        || env.catalog.list_listings(),
        StoreError::is_transient,
    )
    .await;
    let records = match listed {
        Ok(records) if !records.is_empty() => records,
        Ok(_) => {
            tracing::info!("Catalog is empty, using seeded listings");
            return seed::listings();
        }
        Err(error) => {
            tracing::warn!(%error, "Catalog unavailable, using seeded listings");
            return seed::listings();
        }
    };

    let expert_ids: Vec<UserId> = records
        .iter()
        .map(|record| record.expert_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let experts: HashMap<UserId, ExpertProfile> = env
        .directory
        .find_experts(&expert_ids)
        .await
        .unwrap_or_else(|error| {
            tracing::warn!(%error, "Could not load listing experts");
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
                .unwrap_or_else(|| seed::expert_or_placeholder(&record.expert_id));
            Listing::from_record(record, expert, Origin::Persisted)
        })
        .collect()
}

/// Publish a listing and promote the author to expert.
pub(crate) fn create_listing(
    state: &ClientState,
    request: RequestId,
    draft: ListingDraft,
    env: &MarketplaceEnvironment,
) -> Step {
    let account = signed_in(state)?;
    if account.origin.is_synthetic() {
        return Err(ValidationError::DemoMode.into());
    }
    let skill_name = draft.skill_name.trim().to_string();
    if skill_name.is_empty() {
        return Err(ValidationError::EmptySkillName.into());
    }
    if draft.credit_cost.is_zero() {
        return Err(ValidationError::NonPositiveAmount.into());
    }

    let author = account.clone();
    let new_listing = NewListing {
        expert_id: author.id.clone(),
        skill_name,
        description: draft.description,
        level: draft.level,
        credit_cost: draft.credit_cost,
        tags: draft.tags,
    };
    let env = env.clone();
    Ok(smallvec![Effect::task(async move {
        let record = match env.catalog.insert_listing(new_listing).await {
            Ok(record) => record,
            Err(error) => {
                return MarketplaceAction::Failed {
                    request,
                    error: EngineError::Unavailable {
                        operation: "create_listing",
                        reason: error.to_string(),
                    },
                };
            }
        };

        let promoted = match author.role {
            Role::Learner => match env.directory.update_role(&author.id, Role::Expert).await {
                Ok(()) => true,
                Err(error) => {
                    tracing::warn!(user_id = %author.id, %error, "Could not promote to expert");
                    false
                }
            },
            Role::Expert | Role::Admin => false,
        };

        let expert = env
            .directory
            .find_experts(std::slice::from_ref(&author.id))
            .await
            .ok()
            .and_then(|experts| experts.into_iter().next())
            .unwrap_or_else(|| ExpertProfile {
                name: author.name.clone(),
                skills: vec![record.skill_name.clone()],
                ..ExpertProfile::placeholder(&author.id)
            });
        tracing::info!(listing_id = %record.id, promoted, "Listing created");
        MarketplaceAction::Completed {
            request,
            outcome: Outcome::ListingCreated {
                listing: Listing::from_record(record, expert, Origin::Persisted),
                promoted,
            },
        }
    })])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::reducer::MarketplaceReducer;
    use crate::test_support::{environment_with, signed_in_state};
    use skillswap_core::types::{Credits, Level};
    use skillswap_testing::helpers;
    use skillswap_testing::memory::{
        InMemoryListingCatalog, InMemoryProfiles, InMemorySessionStore, Operation,
        StoreHarness,
    };
    use skillswap_testing::ReducerTest;

    #[tokio::test]
    async fn first_sign_in_creates_a_learner_with_the_starting_balance() {
        let harness = StoreHarness::new();
        let profiles = InMemoryProfiles::new(harness.clone());
        let env = environment_with(
            &harness,
            profiles.clone(),
            InMemorySessionStore::new(harness.clone()),
            InMemoryListingCatalog::new(harness.clone()),
        );

        let state = ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(ClientState::default())
            .when_action(MarketplaceAction::SignIn {
                request: RequestId::new(),
                identity: AuthIdentity {
                    user_id: UserId::new("new-user"),
                    display_name: None,
                    email: Some("newbie@example.com".into()),
                },
            })
            .run_to_completion()
            .await;

        let account = state.account.unwrap();
        assert_eq!(account.balance, Credits::new(10));
        assert_eq!(account.role, Role::Learner);
        assert_eq!(account.name, "newbie");
        assert_eq!(
            profiles.balance(&UserId::new("new-user")),
            Some(Credits::new(10))
        );
    }

    #[tokio::test]
    async fn empty_catalog_falls_back_to_seeded_listings() {
        let harness = StoreHarness::new();
        let env = environment_with(
            &harness,
            InMemoryProfiles::new(harness.clone()),
            InMemorySessionStore::new(harness.clone()),
            InMemoryListingCatalog::new(harness.clone()),
        );

        let listings = fetch_listings(&env).await;
        assert_eq!(listings.len(), 3);
        assert!(listings.iter().all(|l| l.origin.is_synthetic()));
    }

    #[tokio::test]
    async fn catalog_listings_get_placeholder_experts_when_missing() {
        let harness = StoreHarness::new();
        let env = environment_with(
            &harness,
            InMemoryProfiles::new(harness.clone()),
            InMemorySessionStore::new(harness.clone()),
            InMemoryListingCatalog::new(harness.clone())
                .with_listing(helpers::listing_record("l-1", "ghost", "Rust", 2)),
        );

        let listings = fetch_listings(&env).await;
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].expert.name, "Unknown Expert");
        assert_eq!(listings[0].origin, Origin::Persisted);
        assert_eq!(harness.log().count(Operation::FindExperts), 1);
    }

    #[tokio::test]
    async fn creating_a_listing_promotes_the_learner() {
        let harness = StoreHarness::new();
        let profiles =
            InMemoryProfiles::new(harness.clone()).with_account(helpers::account("u1", 5));
        let catalog = InMemoryListingCatalog::new(harness.clone());
        let env = environment_with(
            &harness,
            profiles.clone(),
            InMemorySessionStore::new(harness.clone()),
            catalog.clone(),
        );

        let state = ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(signed_in_state("u1", 5))
            .when_action(MarketplaceAction::CreateListing {
                request: RequestId::new(),
                draft: ListingDraft {
                    skill_name: "  Rust Ownership ".into(),
                    description: "Borrowing without tears".into(),
                    level: Level::Intermediate,
                    credit_cost: Credits::new(2),
                    tags: vec!["Tech".into()],
                },
            })
            .run_to_completion()
            .await;

        assert_eq!(catalog.listings().len(), 1);
        assert_eq!(state.listings[0].skill_name, "Rust Ownership");
        assert_eq!(state.account.map(|a| a.role), Some(Role::Expert));
        assert_eq!(
            profiles.account(&UserId::new("u1")).map(|a| a.role),
            Some(Role::Expert)
        );
    }

    #[test]
    fn demo_accounts_cannot_publish() {
        let harness = StoreHarness::new();
        let env = environment_with(
            &harness,
            InMemoryProfiles::new(harness.clone()),
            InMemorySessionStore::new(harness.clone()),
            InMemoryListingCatalog::new(harness.clone()),
        );
        let mut given = ClientState::default();
        given.account = Some(seed::demo_account());

        ReducerTest::new(MarketplaceReducer)
            .with_env(env)
            .given_state(given)
            .when_action(MarketplaceAction::CreateListing {
                request: RequestId::new(),
                draft: ListingDraft {
                    skill_name: "Anything".into(),
                    description: String::new(),
                    level: Level::Beginner,
                    credit_cost: Credits::new(1),
                    tags: Vec::new(),
                },
            })
            .then_state(|state| assert!(state.listings.is_empty()))
            .run();

        assert!(harness.log().is_empty());
    }
}
