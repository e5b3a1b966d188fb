use crate::core::{MockError, Result, now_timestamp};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

/// Replay position meaning "everything retained".
pub const REPLAY_ALL: i64 = -2;
/// Replay position meaning "only events published from now on".
pub const REPLAY_NEW: i64 = -1;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub replay_id: i64,
    pub payload: serde_json::Value,
    pub created_date: String,
}

/// An event addressed to one subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    pub channel: String,
    #[serde(rename = "data")]
    pub event: Event,
}

#[derive(Debug, Default)]
struct Channel {
    events: Vec<Event>,
}

impl Channel {
    fn latest_replay_id(&self) -> Option<i64> {
        self.events.last().map(|e| e.replay_id)
    }
}

#[derive(Debug)]
struct ClientSession {
    /// Channel and replay cursor, in subscription order.
    subscriptions: Vec<(String, i64)>,
    connected_at: String,
}

struct Registry<T> {
    by_name: HashMap<String, Arc<RwLock<T>>>,
    order: Vec<String>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            by_name: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<T> Registry<T> {
    fn get(&self, name: &str) -> Option<Arc<RwLock<T>>> {
        self.by_name.get(name).cloned()
    }

    fn insert(&mut self, name: String, value: T) -> Arc<RwLock<T>> {
        let handle = Arc::new(RwLock::new(value));
        if self.by_name.insert(name.clone(), Arc::clone(&handle)).is_none() {
            self.order.push(name);
        }
        handle
    }

    fn remove(&mut self, name: &str) -> bool {
        if self.by_name.remove(name).is_none() {
            return false;
        }
        self.order.retain(|n| n != name);
        true
    }

    fn entries(&self) -> Vec<(String, Arc<RwLock<T>>)> {
        self.order
            .iter()
            .filter_map(|name| self.by_name.get(name).map(|h| (name.clone(), Arc::clone(h))))
            .collect()
    }

    fn clear(&mut self) {
        self.by_name.clear();
        self.order.clear();
    }
}

/// Platform event log and streaming client sessions.
///
/// Each channel and each client has its own lock; the registries are locked
/// only long enough to find or add a handle. Replay ids come from one global
/// counter, bumped while the channel's write lock is held.
pub struct EventBus {
    channels: RwLock<Registry<Channel>>,
    clients: RwLock<Registry<ClientSession>>,
    replay_counter: AtomicI64,
    published: Notify,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(Registry::default()),
            clients: RwLock::new(Registry::default()),
            replay_counter: AtomicI64::new(0),
            published: Notify::new(),
        }
    }

    async fn channel(&self, name: &str) -> Arc<RwLock<Channel>> {
        if let Some(handle) = self.channels.read().await.get(name) {
            return handle;
        }
        let mut registry = self.channels.write().await;
        match registry.get(name) {
            Some(handle) => handle,
            None => registry.insert(name.to_string(), Channel::default()),
        }
    }

    /// Append an event to `channel` and wake waiting subscribers.
    pub async fn publish(&self, channel: &str, payload: serde_json::Value) -> Event {
        let handle = self.channel(channel).await;
        let event = {
            let mut log = handle.write().await;
            let event = Event {
                replay_id: self.replay_counter.fetch_add(1, Ordering::SeqCst) + 1,
                payload,
                created_date: now_timestamp(),
            };
            log.events.push(event.clone());
            event
        };
        self.published.notify_waiters();
        info!(channel, replay_id = event.replay_id, "platform event published");
        event
    }

    pub async fn create_client(&self) -> String {
        let simple = uuid::Uuid::new_v4().simple().to_string();
        let client_id = format!("mock-client-{}", &simple[..12]);
        let session = ClientSession {
            subscriptions: Vec::new(),
            connected_at: now_timestamp(),
        };
        self.clients.write().await.insert(client_id.clone(), session);
        info!(client_id = %client_id, "streaming client connected");
        client_id
    }

    async fn client(&self, client_id: &str) -> Result<Arc<RwLock<ClientSession>>> {
        self.clients
            .read()
            .await
            .get(client_id)
            .ok_or_else(|| MockError::NotFound(format!("Unknown client: {}", client_id)))
    }

    pub async fn has_client(&self, client_id: &str) -> bool {
        self.clients.read().await.get(client_id).is_some()
    }

    /// Subscribe, or move the cursor of an existing subscription.
    ///
    /// `-1` is pinned to the channel's latest replay id here, or to 0 when the
    /// channel has never published, so exactly the events published after
    /// this call are delivered.
    pub async fn subscribe(&self, client_id: &str, channel: &str, replay_from: i64) -> Result<()> {
        let replay_from = if replay_from == REPLAY_NEW {
            let existing = self.channels.read().await.get(channel);
            match existing {
                Some(log) => log.read().await.latest_replay_id().unwrap_or(0),
                None => 0,
            }
        } else {
            replay_from
        };
        let handle = self.client(client_id).await?;
        let mut session = handle.write().await;
        match session.subscriptions.iter_mut().find(|(name, _)| name == channel) {
            Some(slot) => slot.1 = replay_from,
            None => session.subscriptions.push((channel.to_string(), replay_from)),
        }
        info!(client_id, channel, replay_from, "streaming subscription added");
        Ok(())
    }

    /// Returns whether the client was subscribed.
    pub async fn unsubscribe(&self, client_id: &str, channel: &str) -> Result<bool> {
        let handle = self.client(client_id).await?;
        let mut session = handle.write().await;
        let before = session.subscriptions.len();
        session.subscriptions.retain(|(name, _)| name != channel);
        Ok(session.subscriptions.len() != before)
    }

    /// Events due to `client_id`, advancing each subscription's cursor to
    /// its channel's latest replay id.
    pub async fn poll(&self, client_id: &str) -> Result<Vec<Delivery>> {
        let handle = self.client(client_id).await?;
        let mut session = handle.write().await;
        let mut deliveries = Vec::new();

        for (name, cursor) in session.subscriptions.iter_mut() {
            let Some(channel) = self.channels.read().await.get(name) else {
                continue;
            };
            let log = channel.read().await;
            let due = log.events.iter().filter(|event| match *cursor {
                REPLAY_ALL => true,
                after => event.replay_id > after,
            });
            deliveries.extend(due.map(|event| Delivery {
                channel: name.clone(),
                event: event.clone(),
            }));
            *cursor = log.latest_replay_id().unwrap_or(0).max(*cursor);
        }

        if !deliveries.is_empty() {
            debug!(client_id, delivered = deliveries.len(), "streaming events delivered");
        }
        Ok(deliveries)
    }

    /// Like `poll`, but when nothing is due wait up to `timeout` for a publish.
    ///
    /// Cancel-safe: dropping the future abandons the wait and loses no events,
    /// since cursors only move inside `poll`.
    pub async fn wait_for_events(&self, client_id: &str, timeout: Duration) -> Result<Vec<Delivery>> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.published.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let deliveries = self.poll(client_id).await?;
            if !deliveries.is_empty() || timeout.is_zero() {
                return Ok(deliveries);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    pub async fn disconnect(&self, client_id: &str) -> bool {
        let removed = self.clients.write().await.remove(client_id);
        if removed {
            info!(client_id, "streaming client disconnected");
        }
        removed
    }

    pub async fn event_count(&self) -> usize {
        let entries = self.channels.read().await.entries();
        let mut total = 0;
        for (_, channel) in entries {
            total += channel.read().await.events.len();
        }
        total
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.order.len()
    }

    /// Every retained event, grouped by channel.
    pub async fn all_events(&self) -> serde_json::Value {
        let mut channels = serde_json::Map::new();
        let entries = self.channels.read().await.entries();
        let mut total = 0;
        for (name, channel) in entries {
            let log = channel.read().await;
            total += log.events.len();
            channels.insert(name, json!({ "count": log.events.len(), "events": log.events }));
        }
        json!({ "channels": channels, "totalEvents": total })
    }

    pub async fn clients(&self) -> serde_json::Value {
        let entries = self.clients.read().await.entries();
        let mut clients = Vec::new();
        for (id, handle) in entries {
            let session = handle.read().await;
            let subscriptions: Vec<&str> = session.subscriptions.iter().map(|(c, _)| c.as_str()).collect();
            clients.push(json!({
                "id": id,
                "subscriptions": subscriptions,
                "connectedAt": session.connected_at,
            }));
        }
        json!({ "count": clients.len(), "clients": clients })
    }

    /// Drop all events and sessions and restart replay ids. Returns
    /// `(events_cleared, clients_cleared)`.
    pub async fn clear(&self) -> (usize, usize) {
        let events = self.event_count().await;
        let clients = self.client_count().await;
        self.channels.write().await.clear();
        self.clients.write().await.clear();
        self.replay_counter.store(0, Ordering::SeqCst);
        (events, clients)
    }
}
