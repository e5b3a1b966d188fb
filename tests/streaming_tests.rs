use serde_json::{Value, json};
use sfmock::streaming::{EventBus, REPLAY_ALL, REPLAY_NEW};
use sfmock::{Catalog, MockOrg};
use std::time::Duration;

async fn bayeux(org: &MockOrg, message: Value) -> Vec<Value> {
    org.bayeux().handle(message).await
}

async fn handshake(org: &MockOrg) -> String {
    let reply = bayeux(org, json!([{"channel": "/meta/handshake", "id": "1"}])).await;
    reply[0]["clientId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn replay_all_delivers_history_in_publish_order() {
    let org = MockOrg::new(Catalog::new());
    for n in 1..=3 {
        org.create_record("Foo__e", json!({"Seq__c": n})).await.unwrap();
    }

    let client = handshake(&org).await;
    let subscribed = bayeux(
        &org,
        json!([{
            "channel": "/meta/subscribe",
            "clientId": client,
            "subscription": "/event/Foo__e",
            "ext": {"replay": {"/event/Foo__e": REPLAY_ALL}},
        }]),
    )
    .await;
    assert_eq!(subscribed[0]["successful"], true);

    let connected = bayeux(
        &org,
        json!([{"channel": "/meta/connect", "clientId": client, "connectionType": "long-polling"}]),
    )
    .await;
    assert_eq!(connected.len(), 4);
    let events = &connected[..3];
    let seqs: Vec<i64> = events
        .iter()
        .map(|e| e["data"]["payload"]["Seq__c"].as_i64().unwrap())
        .collect();
    assert_eq!(seqs, vec![1, 2, 3]);
    let replay_ids: Vec<i64> = events
        .iter()
        .map(|e| e["data"]["replayId"].as_i64().unwrap())
        .collect();
    assert!(replay_ids.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(connected[3]["channel"], "/meta/connect");
    assert_eq!(connected[3]["successful"], true);

    let again = bayeux(&org, json!({"channel": "/meta/connect", "clientId": client})).await;
    assert_eq!(again.len(), 1, "delivered events are not repeated");
}

#[tokio::test]
async fn new_only_subscription_skips_history() {
    let bus = EventBus::new();
    bus.publish("/event/Foo__e", json!({"n": 1})).await;

    let client = bus.create_client().await;
    bus.subscribe(&client, "/event/Foo__e", REPLAY_NEW).await.unwrap();
    assert!(bus.poll(&client).await.unwrap().is_empty());

    bus.publish("/event/Foo__e", json!({"n": 2})).await;
    let delivered = bus.poll(&client).await.unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].event.payload["n"], 2);
}

#[tokio::test]
async fn unknown_client_is_told_to_handshake() {
    let org = MockOrg::new(Catalog::new());
    let reply = bayeux(
        &org,
        json!([{"channel": "/meta/connect", "clientId": "mock-client-missing"}]),
    )
    .await;
    assert_eq!(reply[0]["successful"], false);
    assert_eq!(reply[0]["error"], "403::Unknown client");
    assert_eq!(reply[0]["advice"]["reconnect"], "handshake");
}

#[tokio::test]
async fn bounded_long_poll_wakes_on_publish() {
    let bus = std::sync::Arc::new(EventBus::new());
    let client = bus.create_client().await;
    bus.subscribe(&client, "/event/Foo__e", REPLAY_NEW).await.unwrap();

    let waiter = {
        let bus = bus.clone();
        let client = client.clone();
        tokio::spawn(async move { bus.wait_for_events(&client, Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    bus.publish("/event/Foo__e", json!({"n": 1})).await;

    let delivered = waiter.await.unwrap().unwrap();
    assert_eq!(delivered.len(), 1);
}

#[tokio::test]
async fn disconnect_removes_the_session() {
    let bus = EventBus::new();
    let client = bus.create_client().await;
    assert!(bus.disconnect(&client).await);
    assert!(!bus.has_client(&client).await);
    assert!(bus.poll(&client).await.is_err());
}
