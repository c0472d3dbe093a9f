//! Ledger invariants over generated balances and amounts.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::World;
use proptest::prelude::*;
use skillswap_core::types::Credits;
use skillswap_engine::EngineError;
use skillswap_testing::helpers;
use skillswap_testing::properties;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// A transfer either moves exactly the requested amount or changes nothing.
    #[test]
    fn transfers_conserve_credits(
        sender in properties::balance(),
        recipient in properties::balance(),
        requested in properties::amount(),
    ) {
        let (result, after_sender, after_recipient, cached) = tokio_test::block_on(async {
            let world = World::new(sender.amount(), recipient.amount());
            world.sign_in("alice").await;
            let result = world
                .marketplace
                .transfer(&helpers::email("bob"), requested)
                .await;
            let cached = world.marketplace.snapshot().await.balance();
            (
                result,
                world.stored_balance("alice"),
                world.stored_balance("bob"),
                cached,
            )
        });

        prop_assert_eq!(
            after_sender.amount() + after_recipient.amount(),
            sender.amount() + recipient.amount()
        );
        prop_assert_eq!(cached, Some(after_sender));
        match result {
            Ok(receipt) => {
                prop_assert!(requested.amount() > 0 && requested <= sender);
                prop_assert_eq!(receipt.balance, Credits::new(sender.amount() - requested.amount()));
                prop_assert_eq!(after_recipient, Credits::new(recipient.amount() + requested.amount()));
            }
            Err(error) => {
                prop_assert!(matches!(error, EngineError::Validation(_)));
                prop_assert!(requested.amount() == 0 || requested > sender);
                prop_assert_eq!(after_sender, sender);
            }
        }
    }

    /// Debits never drive a balance below zero.
    #[test]
    fn debits_never_overdraw(start in properties::balance(), amount in properties::positive_amount()) {
        let (result, stored) = tokio_test::block_on(async {
            let world = World::new(start.amount(), 0);
            world.sign_in("alice").await;
            let result = world.marketplace.debit_credits(amount).await;
            (result, world.stored_balance("alice"))
        });

        if amount <= start {
            prop_assert_eq!(result, Ok(Credits::new(start.amount() - amount.amount())));
            prop_assert_eq!(stored, Credits::new(start.amount() - amount.amount()));
        } else {
            prop_assert_eq!(result, Err(EngineError::insufficient(amount, start)));
            prop_assert_eq!(stored, start);
        }
    }

    /// Top-ups add exactly the purchased amount.
    #[test]
    fn top_ups_add_exactly(start in properties::balance(), amount in properties::positive_amount()) {
        let receipt = tokio_test::block_on(async {
            let world = World::new(start.amount(), 0);
            world.sign_in("alice").await;
            world.marketplace.add_credits(amount, None).await
        })
        .unwrap();

        prop_assert_eq!(receipt.balance, Credits::new(start.amount() + amount.amount()));
        prop_assert_eq!(receipt.amount, amount);
        prop_assert_eq!(receipt.price_charged, None);
    }
}
