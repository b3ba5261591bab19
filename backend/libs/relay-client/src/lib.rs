//! Client side of the referral notification relay.
//!
//! [`RelayClient`] keeps one WebSocket to the relay open for a user: it
//! subscribes on connect, sends heartbeats, reconnects with bounded
//! exponential backoff after abnormal closures, and hands every notification
//! to the callbacks registered in its [`SubscriptionManager`].

pub mod backoff;
pub mod client;
pub mod error;
pub mod subscriptions;

pub use backoff::ReconnectPolicy;
pub use client::{ClientConfig, ConnectionStatus, RelayClient, CONNECT_TIMEOUT, HEARTBEAT_INTERVAL};
pub use error::ClientError;
pub use subscriptions::{Callback, SubscriptionId, SubscriptionManager};
