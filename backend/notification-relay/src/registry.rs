/// Connection Registry
///
/// Maps each subscribed user to the one connection that currently receives
/// their notifications. Shared by every session actor and HTTP handler through
/// `AppState`; all mutations go through a single `RwLock`.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use relay_protocol::{ServerMessage, UserId};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::metrics;

/// Sending half of a session's outbound queue
pub type ConnectionSender = mpsc::UnboundedSender<ServerMessage>;

/// Unique identifier of one WebSocket connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Handle to a live connection as seen by the registry.
///
/// The session owns the receiving half of the queue; once it stops, the
/// receiver is dropped and the handle reports itself closed.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: ConnectionSender,
}

impl ConnectionHandle {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = Self {
            id: ConnectionId::new(),
            sender,
        };
        (handle, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    fn send(&self, message: ServerMessage) -> bool {
        self.sender.send(message).is_ok()
    }
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    // user_id -> the connection registered last for that user
    inner: Arc<RwLock<HashMap<UserId, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection` for `user_id`, replacing any earlier connection.
    ///
    /// The displaced connection is not notified; it simply stops receiving.
    pub async fn register(&self, user_id: impl Into<UserId>, connection: ConnectionHandle) {
        let user_id = user_id.into();
        let mut guard = self.inner.write().await;
        let connection_id = connection.id();

        if let Some(previous) = guard.insert(user_id.clone(), connection) {
            if previous.id() != connection_id {
                tracing::debug!(
                    user_id = %user_id,
                    previous = %previous.id(),
                    connection_id = %connection_id,
                    "Replaced existing connection"
                );
            }
        }

        metrics::set_active_connections(guard.len());
        tracing::info!(
            user_id = %user_id,
            connection_id = %connection_id,
            total = guard.len(),
            "User subscribed"
        );
    }

    /// Send `message` to the connection registered for `user_id`.
    ///
    /// Returns false, without side effects, when the user has no entry or the
    /// entry's connection is already closed. Never waits on the network.
    pub async fn deliver(&self, user_id: &UserId, message: ServerMessage) -> bool {
        let guard = self.inner.read().await;

        match guard.get(user_id) {
            Some(connection) if connection.is_open() => connection.send(message),
            Some(_) => {
                tracing::debug!(user_id = %user_id, "Registered connection is not open");
                false
            }
            None => false,
        }
    }

    /// Remove every entry that points at `connection_id`.
    ///
    /// Returns the user the connection was registered for, if any. Removing
    /// an unknown or already-replaced connection is a no-op.
    pub async fn remove(&self, connection_id: ConnectionId) -> Option<UserId> {
        let mut guard = self.inner.write().await;
        let mut removed = None;

        guard.retain(|user_id, connection| {
            if connection.id() == connection_id {
                removed = Some(user_id.clone());
                false
            } else {
                true
            }
        });

        if let Some(user_id) = &removed {
            metrics::set_active_connections(guard.len());
            tracing::info!(
                user_id = %user_id,
                connection_id = %connection_id,
                total = guard.len(),
                "User disconnected"
            );
        }

        removed
    }

    /// Whether `user_id` currently has an open connection
    pub async fn is_connected(&self, user_id: &UserId) -> bool {
        let guard = self.inner.read().await;
        guard
            .get(user_id)
            .map(ConnectionHandle::is_open)
            .unwrap_or(false)
    }

    /// Send `message` to every open connection, returning how many got it
    pub async fn broadcast(&self, message: ServerMessage) -> usize {
        let guard = self.inner.read().await;

        guard
            .values()
            .filter(|connection| connection.is_open())
            .filter(|connection| connection.send(message.clone()))
            .count()
    }

    pub async fn connected_users(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn connected_user_ids(&self) -> Vec<UserId> {
        self.inner.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_protocol::EventKind;

    fn new_user() -> UserId {
        UserId::from(Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_registry_creation() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.connected_users().await, 0);
        assert!(registry.connected_user_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_deliver_to_registered_user() {
        let registry = ConnectionRegistry::new();
        let user_id = new_user();
        let (handle, mut rx) = ConnectionHandle::new();

        registry.register(user_id.clone(), handle).await;
        assert!(registry.is_connected(&user_id).await);

        let message = ServerMessage::earning_update(125.0, "Purchase by X");
        assert!(registry.deliver(&user_id, message.clone()).await);
        assert_eq!(rx.recv().await, Some(message));
    }

    #[tokio::test]
    async fn test_later_register_replaces_earlier() {
        let registry = ConnectionRegistry::new();
        let user_id = new_user();
        let (first, mut first_rx) = ConnectionHandle::new();
        let (second, mut second_rx) = ConnectionHandle::new();

        registry.register(user_id.clone(), first).await;
        registry.register(user_id.clone(), second).await;
        assert_eq!(registry.connected_users().await, 1);

        let message = ServerMessage::referral_joined("Ravi", relay_protocol::ReferralLevel::Direct);
        assert!(registry.deliver(&user_id, message.clone()).await);

        assert_eq!(second_rx.recv().await, Some(message));
        assert!(first_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_plain_string_ids() {
        let registry = ConnectionRegistry::new();
        let user_a = UserId::new("userA").unwrap();
        let (handle, mut rx) = ConnectionHandle::new();

        registry.register(user_a.clone(), handle).await;

        let message = ServerMessage::earning_update(125.0, "Purchase by X");
        assert!(registry.deliver(&user_a, message.clone()).await);
        assert_eq!(rx.recv().await, Some(message));

        let user_b = UserId::new("B").unwrap();
        assert!(!registry.deliver(&user_b, ServerMessage::earning_update(1.0, "x")).await);
        assert_eq!(registry.connected_user_ids().await, vec![user_a]);
    }

    #[tokio::test]
    async fn test_deliver_to_unregistered_user() {
        let registry = ConnectionRegistry::new();
        let (handle, mut rx) = ConnectionHandle::new();
        registry.register(Uuid::new_v4(), handle).await;

        let delivered = registry
            .deliver(&new_user(), ServerMessage::earning_update(1.0, "x"))
            .await;

        assert!(!delivered);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_invalidates_delivery() {
        let registry = ConnectionRegistry::new();
        let user_id = new_user();
        let (handle, mut rx) = ConnectionHandle::new();
        let connection_id = handle.id();

        registry.register(user_id.clone(), handle).await;
        assert_eq!(registry.remove(connection_id).await, Some(user_id.clone()));

        assert!(!registry.is_connected(&user_id).await);
        assert!(
            !registry
                .deliver(&user_id, ServerMessage::earning_update(1.0, "x"))
                .await
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = ConnectionHandle::new();
        let connection_id = handle.id();

        registry.register(Uuid::new_v4(), handle).await;
        assert!(registry.remove(connection_id).await.is_some());
        assert!(registry.remove(connection_id).await.is_none());
        assert!(registry.remove(ConnectionId::new()).await.is_none());
        assert_eq!(registry.connected_users().await, 0);
    }

    #[tokio::test]
    async fn test_remove_displaced_connection_keeps_replacement() {
        let registry = ConnectionRegistry::new();
        let user_id = new_user();
        let (first, _first_rx) = ConnectionHandle::new();
        let (second, mut second_rx) = ConnectionHandle::new();
        let first_id = first.id();

        registry.register(user_id.clone(), first).await;
        registry.register(user_id.clone(), second).await;

        assert!(registry.remove(first_id).await.is_none());
        assert!(
            registry
                .deliver(&user_id, ServerMessage::earning_update(5.0, "x"))
                .await
        );
        assert!(second_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_closed_connection_is_not_delivered_to() {
        let registry = ConnectionRegistry::new();
        let user_id = new_user();
        let (handle, rx) = ConnectionHandle::new();

        registry.register(user_id.clone(), handle).await;
        drop(rx);

        assert!(!registry.is_connected(&user_id).await);
        assert!(
            !registry
                .deliver(&user_id, ServerMessage::earning_update(1.0, "x"))
                .await
        );
    }

    #[tokio::test]
    async fn test_broadcast_counts_open_connections() {
        let registry = ConnectionRegistry::new();
        let mut receivers = vec![];

        for _ in 0..3 {
            let (handle, rx) = ConnectionHandle::new();
            registry.register(Uuid::new_v4(), handle).await;
            receivers.push(rx);
        }
        let (closed, closed_rx) = ConnectionHandle::new();
        registry.register(Uuid::new_v4(), closed).await;
        drop(closed_rx);

        let message = ServerMessage::earning_update(10.0, "Bonus");
        assert_eq!(registry.broadcast(message).await, 3);

        for mut rx in receivers {
            let received = rx.recv().await.unwrap();
            assert_eq!(received.kind(), EventKind::EarningUpdate);
        }
    }

    #[tokio::test]
    async fn test_concurrent_registrations() {
        let registry = ConnectionRegistry::new();
        let mut tasks = vec![];

        for _ in 0..50 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (handle, rx) = ConnectionHandle::new();
                registry.register(Uuid::new_v4(), handle).await;
                rx
            }));
        }

        let mut receivers = vec![];
        for task in tasks {
            receivers.push(task.await.unwrap());
        }

        assert_eq!(registry.connected_users().await, 50);
    }
}
