//! The full happy path: connect, receive a mutation into the cache, lose the
//! transport, recover within the backoff window and resend the region
//! subscription registered before the drop.

use atlas_link::{
    topics, AtlasLinkClient, CacheKey, ConnectionState, DataCache, DataUpdate, EntityId,
    InMemoryCache, MutationType, RegionBounds, ServerMessage,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

mod common;
use common::*;

#[tokio::test(start_paused = true)]
async fn test_connect_mutate_drop_and_recover() {
    init_logging();
    let connector = MockConnector::new();
    let cache = Arc::new(InMemoryCache::new());
    let client = AtlasLinkClient::builder()
        .connector(Arc::new(connector.clone()))
        .cache(cache.clone())
        .connection_options(test_options().with_reconnect_delay_ms(1_000))
        .build()
        .unwrap();
    let mut status = client.watch_status();

    let (tx, mut updates) = mpsc::unbounded_channel();
    client.on(topics::DATA_UPDATE, move |event| {
        let _ = tx.send(event.clone());
        Ok(())
    });

    let bounds = RegionBounds::new(10.0, 0.0, 10.0, 0.0);
    client.subscribe(bounds).await.unwrap();

    // connect(tokenA) -> {connected: true, error: null}
    client.connect("tokenA").await.unwrap();
    let connected = client.status();
    assert!(connected.connected);
    assert_eq!(connected.error, None);
    settle().await;
    assert_eq!(connector.session(0).subscribes(), vec![bounds]);

    // data-update{insert, {id: 7, title: "X"}} -> cache holds id 7
    connector.session(0).push(ServerMessage::DataUpdate(DataUpdate {
        mutation_type: MutationType::Insert,
        entity: json!({"id": 7, "title": "X"}),
        timestamp: None,
    }));
    tokio::time::timeout(Duration::from_secs(5), updates.recv())
        .await
        .unwrap()
        .unwrap();
    let key = CacheKey::entity("entities", &EntityId::from(7));
    assert_eq!(cache.get(&key), Some(json!({"id": 7, "title": "X"})));

    // Unexpected drop -> {connecting: true, error: "Connection lost: transport-close"}
    connector.session(0).end_stream();
    let lost = wait_for_status(&mut status, |s| !s.connected).await;
    assert!(lost.connecting);
    assert_eq!(lost.error.as_deref(), Some("Connection lost: transport-close"));
    assert_eq!(lost.retry_count, 1);
    assert_eq!(lost.state, ConnectionState::Reconnecting { attempt: 1 });

    // Recovery within the backoff window -> connected again, region resent.
    let recovered = wait_for_status(&mut status, |s| s.connected).await;
    assert_eq!(recovered.error, None);
    settle().await;
    assert_eq!(connector.sessions().len(), 2);
    assert_eq!(connector.session(1).subscribes(), vec![bounds]);
    assert_eq!(connector.live_sessions(), 1);

    // The cache survives the reconnect.
    assert_eq!(cache.get(&key), Some(json!({"id": 7, "title": "X"})));

    client.shutdown().await;
    assert_eq!(client.status().state, ConnectionState::Closed);
    assert_eq!(connector.live_sessions(), 0);
}
