//! Platform event log and the Bayeux/CometD long-poll protocol.

pub mod bayeux;
pub mod bus;

pub use bayeux::{BayeuxMessage, BayeuxServer};
pub use bus::{Delivery, Event, EventBus, REPLAY_ALL, REPLAY_NEW};
