//! Session lifecycle through the full store runtime.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use chrono::Duration;
use common::World;
use skillswap_core::environment::Clock;
use skillswap_core::stores::StoreError;
use skillswap_core::types::{ListingId, Origin, Session, SessionId, SessionStatus};
use skillswap_engine::{EngineError, ValidationError};
use skillswap_testing::memory::Operation;

/// Sign `alice` in and book `l-rust` for tomorrow.
async fn booked(world: &World) -> Session {
    world.sign_in("alice").await;
    let listing = world
        .marketplace
        .load_listings()
        .await
        .unwrap()
        .into_iter()
        .find(|listing| listing.id == ListingId::new("l-rust"))
        .unwrap();
    world.marketplace.initiate_booking(listing).await.unwrap();
    let session = world
        .marketplace
        .finalize_booking(Some(world.clock.now() + Duration::days(1)))
        .await
        .unwrap();
    world.harness.log().clear();
    session
}

#[tokio::test]
async fn join_and_end_persist_each_status() {
    let world = World::new(5, 0);
    let session = booked(&world).await;

    assert!(world.marketplace.join(session.id.clone()).await.unwrap());
    assert_eq!(
        world.sessions.session(&session.id).unwrap().status,
        SessionStatus::Live
    );
    assert_eq!(
        world.marketplace.snapshot().await.active_session,
        Some(session.id.clone())
    );

    assert!(world.marketplace.end().await.unwrap());
    assert_eq!(
        world.sessions.session(&session.id).unwrap().status,
        SessionStatus::Completed
    );

    let snapshot = world.marketplace.snapshot().await;
    assert_eq!(snapshot.active_session, None);
    assert_eq!(
        snapshot.session(&session.id).map(|s| s.status),
        Some(SessionStatus::Completed)
    );
    assert_eq!(world.harness.log().count(Operation::UpdateSessionStatus), 2);
}

#[tokio::test]
async fn joining_a_live_session_again_writes_nothing() {
    let world = World::new(5, 0);
    let session = booked(&world).await;

    world.marketplace.join(session.id.clone()).await.unwrap();
    world.harness.log().clear();

    let persisted = world.marketplace.join(session.id.clone()).await.unwrap();

    assert!(!persisted);
    assert!(world.harness.log().is_empty());
    assert_eq!(
        world.marketplace.snapshot().await.active_session,
        Some(session.id)
    );
}

#[tokio::test]
async fn status_write_failure_does_not_block_the_call() {
    let world = World::new(5, 0);
    let session = booked(&world).await;
    world.harness.inject(
        Operation::UpdateSessionStatus,
        StoreError::Unavailable("connection reset".into()),
    );

    let persisted = world.marketplace.join(session.id.clone()).await.unwrap();

    assert!(!persisted);
    assert_eq!(
        world.sessions.session(&session.id).unwrap().status,
        SessionStatus::Scheduled
    );
    assert_eq!(
        world
            .marketplace
            .snapshot()
            .await
            .session(&session.id)
            .map(|s| s.status),
        Some(SessionStatus::Live)
    );
}

#[tokio::test]
async fn end_without_an_active_session_is_rejected() {
    let world = World::new(5, 0);
    booked(&world).await;

    let error = world.marketplace.end().await.unwrap_err();

    assert_eq!(error, EngineError::NoActiveSession);
    assert!(world.harness.log().is_empty());
}

#[tokio::test]
async fn completed_session_cannot_be_rejoined() {
    let world = World::new(5, 0);
    let session = booked(&world).await;
    world.marketplace.join(session.id.clone()).await.unwrap();
    world.marketplace.end().await.unwrap();
    world.harness.log().clear();

    let error = world.marketplace.join(session.id).await.unwrap_err();

    assert_eq!(
        error,
        EngineError::InvalidTransition {
            from: SessionStatus::Completed,
            to: SessionStatus::Live,
        }
    );
    assert!(world.harness.log().is_empty());
}

#[tokio::test]
async fn only_one_session_can_be_active() {
    let world = World::new(5, 0);
    let first = booked(&world).await;
    let listing = world.marketplace.snapshot().await.listings[0].clone();
    world.marketplace.initiate_booking(listing).await.unwrap();
    let second = world
        .marketplace
        .finalize_booking(Some(world.clock.now() + Duration::days(3)))
        .await
        .unwrap();

    world.marketplace.join(first.id.clone()).await.unwrap();
    let error = world.marketplace.join(second.id).await.unwrap_err();

    assert_eq!(
        error,
        EngineError::Validation(ValidationError::AnotherSessionActive(first.id))
    );
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let world = World::new(5, 0);
    world.sign_in("alice").await;

    let error = world
        .marketplace
        .join(SessionId::new("s-404"))
        .await
        .unwrap_err();

    assert_eq!(error, EngineError::SessionNotFound(SessionId::new("s-404")));
}

#[tokio::test]
async fn refresh_reloads_sessions_from_the_store() {
    let world = World::new(5, 0);
    let session = booked(&world).await;

    let sessions = world.marketplace.refresh_sessions().await.unwrap();

    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, session.id);
    assert_eq!(sessions[0].origin, Origin::Persisted);
    assert_eq!(sessions[0].expert.name, "Priya Patel");
    assert_eq!(sessions[0].skill_name.as_deref(), Some("Async Rust"));
    assert_eq!(world.harness.log().count(Operation::ListSessions), 1);
}
