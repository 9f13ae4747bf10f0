//! Wallet listener lifecycle: start/stop, polling fallback, reconnects, watchdog.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use rust_decimal::Decimal;

use payment_monitor::config::{EmptySettingsStore, SettingsStore};
use payment_monitor::engine::EngineError;
use payment_monitor::payments::{
    ConnectionKind, EntityId, MonitorError, MonitoredEntity, StartStatus, StopStatus, SubscriptionStatus,
};
use payment_monitor::PaymentEngine;

mod common;
use common::*;

fn store() -> Arc<dyn SettingsStore> {
    Arc::new(EmptySettingsStore)
}

fn campaign_status(engine: &PaymentEngine, id: &str) -> Option<SubscriptionStatus> {
    engine
        .supervisor()
        .get(&EntityId::campaign(id))
        .map(|h| h.status)
}

#[tokio::test]
async fn test_double_start_opens_one_connection() {
    let client = Arc::new(MockChainClient::new().with_websocket());
    client.set_head(100);
    let (engine, _rx) = build_engine(client.clone(), &test_config(), store()).await;
    let wallet = CAMPAIGN_WALLET.to_string();

    let (first, second) = tokio::join!(
        engine.start_campaign_listener("42", &wallet),
        engine.start_campaign_listener("42", &wallet),
    );
    let mut statuses = vec![first.unwrap().status, second.unwrap().status];
    statuses.sort_by_key(|s| *s == StartStatus::Started);
    assert_eq!(statuses, vec![StartStatus::AlreadyActive, StartStatus::Started]);

    eventually(|| campaign_status(&engine, "42") == Some(SubscriptionStatus::Active)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.subscribe_calls(), 1);
    assert_eq!(engine.campaign_listeners_status().len(), 1);

    let again = engine.start_campaign_listener("42", &wallet).await.unwrap();
    assert_eq!(again.status, StartStatus::AlreadyActive);
    assert_eq!(again.handle.connection_kind, ConnectionKind::WebSocket);
    assert_eq!(client.subscribe_calls(), 1);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let client = Arc::new(MockChainClient::new().with_websocket());
    let (engine, _rx) = build_engine(client.clone(), &test_config(), store()).await;

    engine
        .start_campaign_listener("7", &CAMPAIGN_WALLET.to_string())
        .await
        .unwrap();
    eventually(|| client.open_subscriptions() == 1).await;

    assert_eq!(engine.stop_campaign_listener("7"), StopStatus::Stopped);
    assert_eq!(engine.stop_campaign_listener("7"), StopStatus::NotActive);
    assert_eq!(engine.stop_campaign_listener("never-started"), StopStatus::NotActive);

    eventually(|| client.open_subscriptions() == 0).await;
    assert!(engine.campaign_listeners_status().is_empty());
}

#[tokio::test]
async fn test_polling_fallback_emits_transfers() {
    let client = Arc::new(MockChainClient::new());
    client.set_head(100);
    let (engine, mut rx) = build_engine(client.clone(), &test_config(), store()).await;

    let outcome = engine
        .start_campaign_listener("9", &CAMPAIGN_WALLET.to_string())
        .await
        .unwrap();
    assert_eq!(outcome.handle.connection_kind, ConnectionKind::HttpPoll);

    let supervisor = engine.supervisor();
    eventually(|| {
        supervisor
            .get(&EntityId::campaign("9"))
            .is_some_and(|h| h.last_seen_block == Some(100))
    })
    .await;

    client.add_transfer(transfer(0x21, CAMPAIGN_WALLET, 12_500_000, 103));
    client.add_transfer(transfer(0x22, STRANGER, 1_000_000, 102));
    client.set_head(104);

    let event = next_event(&mut rx).await;
    assert_eq!(event.entity_id, EntityId::campaign("9"));
    assert_eq!(event.tx_hash, tx_hash(0x21));
    assert_eq!(event.amount, Decimal::new(125, 1));
    assert_eq!(event.block_number, 103);
    assert_eq!(event.from, DONOR);
    assert_eq!(event.to, CAMPAIGN_WALLET);
    assert_eq!(event.token, USDT);

    eventually(|| {
        supervisor
            .get(&EntityId::campaign("9"))
            .is_some_and(|h| h.last_seen_block == Some(104) && h.status == SubscriptionStatus::Active)
    })
    .await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_oversized_transfer_is_still_emitted() {
    let client = Arc::new(MockChainClient::new());
    client.set_head(100);
    let (engine, mut rx) = build_engine(client.clone(), &test_config(), store()).await;

    engine
        .start_campaign_listener("10", &CAMPAIGN_WALLET.to_string())
        .await
        .unwrap();
    eventually(|| {
        engine
            .supervisor()
            .get(&EntityId::campaign("10"))
            .is_some_and(|h| h.last_seen_block == Some(100))
    })
    .await;

    // 10^30 raw units at 6 decimals overflows a 96-bit mantissa.
    let mut whale = transfer(0x23, CAMPAIGN_WALLET, 0, 101);
    whale.value = U256::from(10u8).pow(U256::from(30u8));
    client.add_transfer(whale);
    client.set_head(101);

    let event = next_event(&mut rx).await;
    assert_eq!(event.tx_hash, tx_hash(0x23));
    assert_eq!(event.amount, Decimal::from_i128_with_scale(10i128.pow(24), 0));
}

#[tokio::test]
async fn test_websocket_transfer_is_delivered() {
    let client = Arc::new(MockChainClient::new().with_websocket());
    client.set_head(100);
    let (engine, mut rx) = build_engine(client.clone(), &test_config(), store()).await;

    engine.start_platform_listener().await.unwrap().unwrap();
    eventually(|| {
        engine
            .supervisor()
            .get(&EntityId::Platform)
            .is_some_and(|h| h.status == SubscriptionStatus::Active)
    })
    .await;

    assert_eq!(client.push_live(transfer(0x31, PLATFORM, 50_000_000, 101)), 1);
    let event = next_event(&mut rx).await;
    assert_eq!(event.entity_id, EntityId::Platform);
    assert_eq!(event.amount, Decimal::from(50));

    // The platform listener is not a campaign listener.
    assert!(engine.campaign_listeners_status().is_empty());
    assert_eq!(engine.listeners_status().len(), 1);
}

#[tokio::test]
async fn test_reconnect_recovers_missed_transfers() {
    let client = Arc::new(MockChainClient::new().with_websocket());
    client.set_head(100);
    let (engine, mut rx) = build_engine(client.clone(), &test_config(), store()).await;

    engine
        .start_campaign_listener("5", &CAMPAIGN_WALLET.to_string())
        .await
        .unwrap();
    eventually(|| campaign_status(&engine, "5") == Some(SubscriptionStatus::Active)).await;

    // Mined while the socket was down.
    client.add_transfer(transfer(0x41, CAMPAIGN_WALLET, 3_000_000, 102));
    client.set_head(105);
    client.disconnect_all();

    let event = next_event(&mut rx).await;
    assert_eq!(event.tx_hash, tx_hash(0x41));
    assert_eq!(event.amount, Decimal::from(3));

    eventually(|| campaign_status(&engine, "5") == Some(SubscriptionStatus::Active)).await;
    assert_eq!(client.subscribe_calls(), 2);
    let handle = engine.supervisor().get(&EntityId::campaign("5")).unwrap();
    assert_eq!(handle.connection_kind, ConnectionKind::WebSocket);
    assert_eq!(handle.last_seen_block, Some(105));
}

#[tokio::test]
async fn test_start_all_counts_failures() {
    let client = Arc::new(MockChainClient::new());
    let (engine, _rx) = build_engine(client, &test_config(), store()).await;

    let campaigns = vec![
        MonitoredEntity {
            id: "1".to_string(),
            wallet: CAMPAIGN_WALLET.to_string(),
            active: true,
        },
        MonitoredEntity {
            id: "2".to_string(),
            wallet: "0x1234".to_string(),
            active: true,
        },
        MonitoredEntity {
            id: "3".to_string(),
            wallet: STRANGER.to_string(),
            active: false,
        },
    ];
    let summary = engine.start_all_campaign_listeners(&campaigns).await.unwrap();
    assert_eq!(summary.started, 1);
    assert_eq!(summary.already_active, 0);
    assert_eq!(summary.failed, 1);

    // Resuming again starts nothing new.
    let again = engine.start_all_campaign_listeners(&campaigns).await.unwrap();
    assert_eq!(again.started, 0);
    assert_eq!(again.already_active, 1);
    assert_eq!(again.failed, 1);

    let status = engine.campaign_listeners_status();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].entity_id, EntityId::campaign("1"));
}

#[tokio::test]
async fn test_invalid_wallet_is_rejected() {
    let (engine, _rx) = build_engine(Arc::new(MockChainClient::new()), &test_config(), store()).await;
    let err = engine.start_campaign_listener("1", "0xnope").await.unwrap_err();
    assert!(matches!(err, EngineError::Monitor(MonitorError::InvalidWallet(_))));
    assert!(engine.campaign_listeners_status().is_empty());
}

#[tokio::test]
async fn test_monitoring_disabled() {
    let client = Arc::new(MockChainClient::new());
    let (engine, _rx) = PaymentEngine::new(
        &test_config(),
        store(),
        provider_with(&[("blockchain_monitoring_enabled", "false")]),
        Arc::new(MockConnector(client.clone())),
    )
    .await
    .unwrap();

    let err = engine
        .start_campaign_listener("1", &CAMPAIGN_WALLET.to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Monitor(MonitorError::MonitoringDisabled(_))));
    assert!(engine.start_platform_listener().await.is_err());
    assert_eq!(client.subscribe_calls(), 0);
}

#[tokio::test]
async fn test_watchdog_restarts_dead_listener() {
    let client = Arc::new(MockChainClient::new());
    client.set_head(100);
    let (engine, rx) = build_engine(client.clone(), &test_config(), store()).await;
    let supervisor = engine.supervisor();

    let started = engine
        .start_campaign_listener("8", &CAMPAIGN_WALLET.to_string())
        .await
        .unwrap();
    eventually(|| campaign_status(&engine, "8") == Some(SubscriptionStatus::Active)).await;

    // With nobody receiving, the listener exits on its next event.
    drop(rx);
    client.add_transfer(transfer(0x51, CAMPAIGN_WALLET, 1_000_000, 101));
    client.set_head(101);
    eventually(|| campaign_status(&engine, "8") == Some(SubscriptionStatus::Stopped)).await;

    eventually(|| supervisor.restart_dead() == 1).await;
    let handle = supervisor.get(&EntityId::campaign("8")).unwrap();
    assert_eq!(handle.restarts, 1);
    assert_ne!(handle.subscription_id, started.handle.subscription_id);
}

#[tokio::test]
async fn test_shutdown_stops_everything() {
    let client = Arc::new(MockChainClient::new().with_websocket());
    let (engine, _rx) = build_engine(client.clone(), &test_config(), store()).await;

    engine.start_platform_listener().await.unwrap();
    engine
        .start_campaign_listener("1", &CAMPAIGN_WALLET.to_string())
        .await
        .unwrap();
    eventually(|| client.open_subscriptions() == 2).await;

    engine.shutdown().await;
    assert!(engine.listeners_status().is_empty());
    assert_eq!(client.open_subscriptions(), 0);
}
