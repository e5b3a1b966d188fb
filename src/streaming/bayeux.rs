//! Bayeux meta-protocol over one endpoint: a request is an array of messages,
//! each dispatched on its `channel`.

use super::bus::{EventBus, REPLAY_NEW};
use serde::Deserialize;
use serde_json::{Value as Json, json};
use std::time::Duration;
use tracing::{debug, warn};

pub const HANDSHAKE: &str = "/meta/handshake";
pub const SUBSCRIBE: &str = "/meta/subscribe";
pub const UNSUBSCRIBE: &str = "/meta/unsubscribe";
pub const CONNECT: &str = "/meta/connect";
pub const DISCONNECT: &str = "/meta/disconnect";

const UNKNOWN_CLIENT: &str = "403::Unknown client";
const SERVER_TIMEOUT_MS: u64 = 110_000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BayeuxMessage {
    #[serde(default)]
    pub channel: String,
    pub client_id: Option<String>,
    pub subscription: Option<String>,
    pub id: Option<Json>,
    pub ext: Option<Json>,
}

impl BayeuxMessage {
    /// Replay position from `ext.replay[subscription]`, or "new events only".
    pub fn replay_from(&self) -> i64 {
        let subscription = self.subscription.as_deref().unwrap_or_default();
        self.ext
            .as_ref()
            .and_then(|ext| ext.get("replay"))
            .and_then(|replay| replay.get(subscription))
            .and_then(Json::as_i64)
            .unwrap_or(REPLAY_NEW)
    }
}

fn retry_advice() -> Json {
    json!({ "reconnect": "retry", "interval": 0, "timeout": SERVER_TIMEOUT_MS })
}

fn unknown_client(message: &BayeuxMessage) -> Json {
    json!({
        "channel": message.channel,
        "clientId": message.client_id,
        "successful": false,
        "error": UNKNOWN_CLIENT,
        "advice": { "reconnect": "handshake", "interval": 0 },
        "id": message.id,
    })
}

/// Protocol front end over an `EventBus`.
pub struct BayeuxServer<'a> {
    bus: &'a EventBus,
    long_poll: Duration,
}

impl<'a> BayeuxServer<'a> {
    pub fn new(bus: &'a EventBus, long_poll: Duration) -> Self {
        Self { bus, long_poll }
    }

    /// Handle one request body: a message array, or a single message object.
    /// A bad message yields an error entry; the rest are still processed.
    pub async fn handle(&self, body: Json) -> Vec<Json> {
        let messages = match body {
            Json::Array(items) => items,
            other => vec![other],
        };

        let mut responses = Vec::new();
        for raw in messages {
            match serde_json::from_value::<BayeuxMessage>(raw) {
                Ok(message) => responses.extend(self.dispatch(&message).await),
                Err(err) => responses.push(json!({
                    "channel": "",
                    "successful": false,
                    "error": format!("400::Invalid message: {}", err),
                })),
            }
        }
        responses
    }

    async fn dispatch(&self, message: &BayeuxMessage) -> Vec<Json> {
        match message.channel.as_str() {
            HANDSHAKE => vec![self.handshake(message).await],
            SUBSCRIBE => vec![self.subscribe(message).await],
            UNSUBSCRIBE => vec![self.unsubscribe(message).await],
            CONNECT => self.connect(message).await,
            DISCONNECT => vec![self.disconnect(message).await],
            other => {
                warn!(channel = other, "unknown bayeux channel");
                vec![json!({
                    "channel": other,
                    "successful": false,
                    "error": format!("Unknown meta channel: {}", other),
                    "id": message.id,
                })]
            }
        }
    }

    async fn handshake(&self, message: &BayeuxMessage) -> Json {
        let client_id = self.bus.create_client().await;
        json!({
            "channel": HANDSHAKE,
            "version": "1.0",
            "minimumVersion": "1.0",
            "clientId": client_id,
            "supportedConnectionTypes": ["long-polling"],
            "successful": true,
            "id": message.id,
            "ext": { "replay": true, "payload": true },
            "advice": retry_advice(),
        })
    }

    async fn subscribe(&self, message: &BayeuxMessage) -> Json {
        let client_id = message.client_id.as_deref().unwrap_or_default();
        let Some(subscription) = message.subscription.as_deref() else {
            return json!({
                "channel": SUBSCRIBE,
                "clientId": message.client_id,
                "successful": false,
                "error": "400::subscription is required",
                "id": message.id,
            });
        };
        if self
            .bus
            .subscribe(client_id, subscription, message.replay_from())
            .await
            .is_err()
        {
            return unknown_client(message);
        }
        json!({
            "channel": SUBSCRIBE,
            "clientId": client_id,
            "subscription": subscription,
            "successful": true,
            "id": message.id,
        })
    }

    async fn unsubscribe(&self, message: &BayeuxMessage) -> Json {
        let client_id = message.client_id.as_deref().unwrap_or_default();
        let subscription = message.subscription.as_deref().unwrap_or_default();
        if self.bus.unsubscribe(client_id, subscription).await.is_err() {
            return unknown_client(message);
        }
        json!({
            "channel": UNSUBSCRIBE,
            "clientId": client_id,
            "subscription": subscription,
            "successful": true,
            "id": message.id,
        })
    }

    /// Due events first, then exactly one connect acknowledgment.
    async fn connect(&self, message: &BayeuxMessage) -> Vec<Json> {
        let client_id = message.client_id.as_deref().unwrap_or_default();
        let deliveries = match self.bus.wait_for_events(client_id, self.long_poll).await {
            Ok(deliveries) => deliveries,
            Err(_) => return vec![unknown_client(message)],
        };
        debug!(client_id, delivered = deliveries.len(), "bayeux connect");

        let mut responses: Vec<Json> = deliveries
            .iter()
            .map(|d| serde_json::to_value(d).unwrap_or(Json::Null))
            .collect();
        responses.push(json!({
            "channel": CONNECT,
            "clientId": client_id,
            "successful": true,
            "id": message.id,
            "advice": retry_advice(),
        }));
        responses
    }

    async fn disconnect(&self, message: &BayeuxMessage) -> Json {
        let client_id = message.client_id.as_deref().unwrap_or_default();
        self.bus.disconnect(client_id).await;
        json!({
            "channel": DISCONNECT,
            "clientId": client_id,
            "successful": true,
            "id": message.id,
        })
    }
}
