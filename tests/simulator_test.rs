//! End-to-end matching scenarios through the simulated gateway.

use std::time::Duration;

use chrono::DateTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use terminal_core::account::CloseReason;
use terminal_core::config::CoreConfig;
use terminal_core::data::{Instrument, InstrumentKind, Point};
use terminal_core::gateway::Gateway;
use terminal_core::orders::{Order, OrderSide, OrderStatus};
use terminal_core::sim::SimGateway;
use terminal_core::stream::StreamAction;

async fn gateway(initial_balance: Decimal) -> SimGateway {
    let config = CoreConfig {
        initial_balance,
        descriptor: "sim-scenarios".into(),
        ..Default::default()
    };
    let mut gateway = SimGateway::new(config);
    gateway
        .subscribe(Instrument::new(
            "ES",
            InstrumentKind::Future,
            Duration::from_secs(60),
        ))
        .await;
    gateway
}

fn tick(gateway: &SimGateway, secs: i64, bid: Decimal, ask: Decimal) {
    gateway.process_point(Point::new(
        DateTime::from_timestamp(secs, 0).unwrap(),
        "ES",
        Some(bid),
        Some(ask),
        dec!(1),
        dec!(1),
    ));
}

#[tokio::test]
async fn single_market_buy_opens_position_without_touching_balance() {
    let mut gateway = gateway(dec!(50000)).await;
    tick(&gateway, 0, dec!(100), dec!(101));

    let response = gateway
        .create_orders(vec![Order::market("ES", OrderSide::Buy, dec!(1))
            .build()
            .unwrap()])
        .await;

    assert!(response.is_ok());
    let filled = &response.data().unwrap()[0];
    assert_eq!(filled.status, OrderStatus::Filled);
    assert_eq!(filled.transaction.as_ref().unwrap().price, dec!(101));

    gateway.with_account(|account| {
        let position = &account.active_positions["ES"];
        assert_eq!(position.side, OrderSide::Buy);
        assert_eq!(position.volume, dec!(1));
        assert_eq!(position.open_price, dec!(101));
        assert_eq!(account.balance, dec!(50000));
    });
}

#[tokio::test]
async fn increase_then_flat_close_realizes_against_average() {
    let mut gateway = gateway(dec!(50000)).await;

    tick(&gateway, 0, dec!(100), dec!(101));
    gateway
        .create_orders(vec![Order::market("ES", OrderSide::Buy, dec!(1))
            .build()
            .unwrap()])
        .await;

    tick(&gateway, 1, dec!(102), dec!(103));
    gateway
        .create_orders(vec![Order::market("ES", OrderSide::Buy, dec!(1))
            .build()
            .unwrap()])
        .await;

    gateway.with_account(|account| {
        let position = &account.active_positions["ES"];
        assert_eq!(position.volume, dec!(2));
        assert_eq!(position.open_price, dec!(102));
        // Superseded position archived, not realized.
        assert_eq!(account.positions.len(), 1);
        assert_eq!(account.positions[0].close_reason, Some(CloseReason::Merge));
        assert_eq!(account.balance, dec!(50000));
    });

    tick(&gateway, 2, dec!(105), dec!(106));
    gateway
        .create_orders(vec![Order::market("ES", OrderSide::Sell, dec!(2))
            .build()
            .unwrap()])
        .await;

    gateway.with_account(|account| {
        assert!(account.active_positions.is_empty());
        assert_eq!(account.balance, dec!(50006));
    });
}

#[tokio::test]
async fn stop_triggers_against_held_position() {
    let mut gateway = gateway(dec!(50000)).await;

    tick(&gateway, 0, dec!(100), dec!(101));
    gateway
        .create_orders(vec![Order::market("ES", OrderSide::Buy, dec!(1))
            .build()
            .unwrap()])
        .await;

    gateway
        .create_orders(vec![Order::stop("ES", OrderSide::Sell, dec!(1), dec!(99))
            .build()
            .unwrap()])
        .await;

    tick(&gateway, 1, dec!(98), dec!(99));

    gateway.with_account(|account| {
        assert!(account.active_positions.is_empty());
        assert!(account.active_orders.is_empty());
        let closed = account
            .positions
            .iter()
            .find(|p| p.close_reason == Some(CloseReason::Fill))
            .unwrap();
        assert_eq!(closed.close_price, Some(dec!(98)));
        assert_eq!(closed.gain_loss, Some(dec!(-3)));
        assert_eq!(account.balance, dec!(50000) + dec!(-3));
    });
}

#[tokio::test]
async fn brackets_cancelled_when_position_goes_flat() {
    let mut gateway = gateway(dec!(50000)).await;
    let mut orders = gateway.order_stream().subscribe();

    tick(&gateway, 0, dec!(100), dec!(101));

    let take_profit = Order::limit("ES", OrderSide::Sell, dec!(1), dec!(110))
        .build()
        .unwrap();
    let stop_loss = Order::stop("ES", OrderSide::Sell, dec!(1), dec!(95))
        .build()
        .unwrap();
    let entry = Order::market("ES", OrderSide::Buy, dec!(1))
        .with_child(take_profit)
        .with_child(stop_loss)
        .build()
        .unwrap();

    gateway.create_orders(vec![entry]).await;

    gateway.with_account(|account| {
        // Both children rest in the active set after the parent filled.
        assert_eq!(account.active_orders.len(), 2);
        assert_eq!(account.active_positions["ES"].orders.len(), 2);
    });

    // Manual flat close via opposite market order.
    tick(&gateway, 1, dec!(100), dec!(101));
    gateway
        .create_orders(vec![Order::market("ES", OrderSide::Sell, dec!(1))
            .build()
            .unwrap()])
        .await;

    gateway.with_account(|account| {
        assert!(account.active_positions.is_empty());
        assert!(account.active_orders.is_empty());
    });

    // Order stream saw both brackets deleted with Canceled status.
    let mut cancelled = 0;
    while let Some(event) = orders.try_recv() {
        if event.action == StreamAction::Delete && event.next.status == OrderStatus::Canceled {
            cancelled += 1;
        }
    }
    assert_eq!(cancelled, 2);
}

#[tokio::test]
async fn reversal_flips_side_and_realizes() {
    let mut gateway = gateway(dec!(50000)).await;

    tick(&gateway, 0, dec!(99), dec!(100));
    gateway
        .create_orders(vec![Order::market("ES", OrderSide::Buy, dec!(2))
            .build()
            .unwrap()])
        .await;

    tick(&gateway, 1, dec!(105), dec!(106));
    gateway
        .create_orders(vec![Order::market("ES", OrderSide::Sell, dec!(5))
            .build()
            .unwrap()])
        .await;

    gateway.with_account(|account| {
        let position = &account.active_positions["ES"];
        assert_eq!(position.side, OrderSide::Sell);
        assert_eq!(position.volume, dec!(3));
        assert_eq!(position.open_price, dec!(105));
        assert_eq!(account.balance, dec!(50010));
    });
}

#[tokio::test]
async fn every_fill_emits_exactly_one_position_delta() {
    let mut gateway = gateway(dec!(50000)).await;
    let mut positions = gateway.position_stream().subscribe();

    tick(&gateway, 0, dec!(100), dec!(101));
    gateway
        .create_orders(vec![Order::market("ES", OrderSide::Buy, dec!(1))
            .build()
            .unwrap()])
        .await;
    tick(&gateway, 1, dec!(102), dec!(103));
    gateway
        .create_orders(vec![Order::market("ES", OrderSide::Buy, dec!(1))
            .build()
            .unwrap()])
        .await;
    tick(&gateway, 2, dec!(105), dec!(106));
    gateway
        .create_orders(vec![Order::market("ES", OrderSide::Sell, dec!(2))
            .build()
            .unwrap()])
        .await;

    let mut deltas = Vec::new();
    while let Some(event) = positions.try_recv() {
        deltas.push(event.action);
    }
    assert_eq!(
        deltas,
        vec![StreamAction::Create, StreamAction::Update, StreamAction::Delete]
    );
}

#[tokio::test]
async fn balance_reconciles_with_realized_history() {
    let mut gateway = gateway(dec!(10000)).await;

    tick(&gateway, 0, dec!(100), dec!(101));
    gateway
        .create_orders(vec![Order::market("ES", OrderSide::Buy, dec!(3))
            .build()
            .unwrap()])
        .await;
    tick(&gateway, 1, dec!(104), dec!(105));
    gateway
        .create_orders(vec![Order::market("ES", OrderSide::Sell, dec!(1))
            .build()
            .unwrap()])
        .await;
    tick(&gateway, 2, dec!(96), dec!(97));
    gateway
        .create_orders(vec![Order::market("ES", OrderSide::Sell, dec!(4))
            .build()
            .unwrap()])
        .await;

    let account = gateway
        .get_account(Default::default())
        .await
        .data
        .unwrap();
    let realized: Decimal = account
        .positions
        .iter()
        .filter(|p| p.close_reason == Some(CloseReason::Fill))
        .filter_map(|p| p.gain_loss)
        .sum();
    assert_eq!(account.balance, account.initial_balance + realized);
    // Reversal leaves a short of 2 on the book.
    assert_eq!(account.active_positions["ES"].volume, dec!(2));
}

#[tokio::test]
async fn rejected_orders_leave_account_untouched() {
    let mut gateway = gateway(dec!(50000)).await;
    tick(&gateway, 0, dec!(100), dec!(101));

    let mut invalid = Order::market("ES", OrderSide::Buy, dec!(1)).build().unwrap();
    invalid.symbol = String::new();

    let response = gateway.create_orders(vec![invalid]).await;
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.data().unwrap()[0].status, OrderStatus::Rejected);

    gateway.with_account(|account| {
        assert!(account.active_orders.is_empty());
        assert!(account.active_positions.is_empty());
        assert_eq!(account.balance, dec!(50000));
    });
}
