//! Walk-through of the marketplace engine over in-memory stores.
//!
//! Signs in, moves credits, books a session, runs it, and finally shows what
//! a partial transfer failure looks like.
//!
//! ```text
//! RUST_LOG=debug cargo run -p skillswap-engine --example marketplace_demo
//! ```

use anyhow::Context;
use chrono::{Duration, Utc};
use skillswap_core::stores::StoreError;
use skillswap_core::types::{Credits, UserId};
use skillswap_engine::{
    AuthIdentity, EngineConfig, Marketplace, MarketplaceEnvironment, MatchRequest,
    CREDIT_PACKAGES,
};
use skillswap_testing::helpers;
use skillswap_testing::memory::{
    InMemoryIntentJournal, InMemoryListingCatalog, InMemoryProfiles, InMemorySessionStore,
    Operation, StoreHarness,
};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
    skillswap_runtime::metrics::describe();

    let config = EngineConfig::from_env().context("reading SKILLSWAP_* configuration")?;

    println!("=== SkillSwap Marketplace Demo ===\n");

    let harness = StoreHarness::new();
    let profiles = Arc::new(
        InMemoryProfiles::new(harness.clone())
            .with_account(helpers::account("friend", 2))
            .with_expert(
                helpers::expert("mentor", "Priya Patel", &["Rust", "Tokio"]),
                Credits::new(40),
            ),
    );
    let catalog = InMemoryListingCatalog::new(harness.clone())
        .with_listing(helpers::listing_record("l-rust", "mentor", "Async Rust", 2));
    let journal = Arc::new(InMemoryIntentJournal::new(harness.clone()));
    let environment = MarketplaceEnvironment::new(
        profiles.clone(),
        Arc::new(InMemorySessionStore::new(harness.clone())),
        profiles.clone(),
        Arc::new(catalog),
        config,
    )
    .with_journal(journal);
    let marketplace = Marketplace::new(environment);

    // Sign in (creates the profile with the starting balance)
    let account = marketplace
        .sign_in(AuthIdentity {
            user_id: UserId::new("dana"),
            display_name: Some("Dana Scott".into()),
            email: Some("dana@example.com".into()),
        })
        .await?;
    println!("Signed in as {} with {}", account.name, account.balance);

    // Top up and transfer
    let receipt = marketplace.purchase_package(CREDIT_PACKAGES[0]).await?;
    println!(
        "Bought {} for {}, balance {}",
        receipt.amount,
        receipt.price_charged.unwrap_or(0),
        receipt.balance
    );

    let sent = marketplace
        .transfer(&helpers::email("friend"), Credits::new(3))
        .await?;
    println!(
        "Sent {} to {}, balance {}",
        sent.amount, sent.recipient_name, sent.balance
    );

    // Browse, rank and book
    let listings = marketplace.load_listings().await?;
    println!("\n{} listing(s) in the catalog", listings.len());
    let ranked = marketplace
        .rank_listings(&MatchRequest {
            skills: vec!["Rust".into()],
            at: None,
            language: Some("English".into()),
        })
        .await;
    let (best, score) = ranked.first().context("catalog is empty")?.clone();
    println!("Best match: {} ({score:.2})", best.skill_name);

    let slot = Utc::now() + Duration::days(1);
    marketplace.initiate_booking(best).await?;
    marketplace.choose_slot(slot).await?;
    let session = marketplace.finalize_booking(None).await?;
    println!("Booked \"{}\" for {}", session.topic, session.scheduled_at);

    // Run the session
    marketplace.join(session.id.clone()).await?;
    marketplace.end().await?;
    let snapshot = marketplace.snapshot().await;
    println!(
        "Session {} is now {:?}, balance {}",
        session.id,
        snapshot.session(&session.id).map(|s| s.status),
        snapshot.balance().unwrap_or_default()
    );

    // A recipient credit that never lands
    println!("\nSimulating an outage between the two transfer writes...");
    harness.inject_for(
        Operation::WriteBalance,
        "friend",
        StoreError::Unavailable("connection reset".into()),
    );
    match marketplace
        .transfer(&helpers::email("friend"), Credits::new(1))
        .await
    {
        Ok(_) => println!("Transfer unexpectedly succeeded"),
        Err(error) => println!("{error} (recovery: {:?})", error.recovery()),
    }
    for intent in marketplace.pending_intents().await? {
        println!("Open intent {} from {}", intent.id, intent.opened_at);
    }

    println!(
        "\nFinal cache:\n{}",
        serde_json::to_string_pretty(&marketplace.snapshot().await)?
    );

    marketplace.shutdown(std::time::Duration::from_secs(5)).await?;
    Ok(())
}
