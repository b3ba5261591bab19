use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use relay_protocol::{ClientMessage, EventKind, ServerMessage, UserId, NORMAL_CLOSURE};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame};
use tokio_tungstenite::tungstenite::Message;

use crate::backoff::ReconnectPolicy;
use crate::error::ClientError;
use crate::subscriptions::{Callback, SubscriptionId, SubscriptionManager};

/// Default interval between client heartbeats
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default bound on one TCP + WebSocket handshake
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub user_id: UserId,
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, user_id: impl Into<UserId>) -> Self {
        Self {
            url: url.into(),
            user_id: user_id.into(),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            connect_timeout: CONNECT_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// A handshake that takes longer counts as a failed attempt
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// First connection attempt in progress
    Connecting,
    /// Subscribed: the relay acknowledged our `subscribe`
    Connected,
    /// Waiting before reconnection attempt `attempt` (1-based)
    Reconnecting { attempt: u32 },
    /// Terminal: shut down, closed normally, or reconnect attempts exhausted
    Disconnected,
}

/// Handle to a running relay connection
pub struct RelayClient {
    subscriptions: SubscriptionManager,
    status: watch::Receiver<ConnectionStatus>,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RelayClient {
    /// Start connecting in the background. Must be called inside a tokio runtime.
    pub fn spawn(config: ClientConfig) -> Self {
        Self::spawn_with(config, SubscriptionManager::new())
    }

    /// Like [`RelayClient::spawn`], dispatching to an existing subscription table
    pub fn spawn_with(config: ClientConfig, subscriptions: SubscriptionManager) -> Self {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = Worker {
            config,
            subscriptions: subscriptions.clone(),
            status: status_tx,
            outbound: outbound_rx,
            shutdown: shutdown_rx,
        };
        let task = tokio::spawn(worker.run());

        Self {
            subscriptions,
            status: status_rx,
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            task,
        }
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub fn subscribe(&self, kind: EventKind, callback: Callback) -> SubscriptionId {
        self.subscriptions.subscribe(kind, callback)
    }

    pub fn unsubscribe(&self, kind: EventKind) -> usize {
        self.subscriptions.unsubscribe(kind)
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Send a control message over the open connection.
    ///
    /// Dropped with a warning when not connected; nothing is queued for later.
    pub fn send_message(&self, message: ClientMessage) -> bool {
        if !self.is_connected() {
            tracing::warn!(message = ?message, "Relay connection is not open, message dropped");
            return false;
        }
        self.outbound.send(message).is_ok()
    }

    /// Close with a normal-closure code and wait for the background task.
    /// No reconnection follows.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }

    /// Wait for the background task to end on its own
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

enum SessionEnd {
    Shutdown,
    NormalClose,
    Abnormal { subscribed: bool },
}

struct Worker {
    config: ClientConfig,
    subscriptions: SubscriptionManager,
    status: watch::Sender<ConnectionStatus>,
    outbound: mpsc::UnboundedReceiver<ClientMessage>,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self) {
        let mut attempt = 0u32;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            match self.connect_and_serve().await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::NormalClose) => {
                    tracing::info!("Relay closed the connection normally");
                    break;
                }
                Ok(SessionEnd::Abnormal { subscribed }) => {
                    if subscribed {
                        attempt = 0;
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %self.config.url, error = %e, "Relay connection failed");
                }
            }

            let Some(delay) = self.config.reconnect.delay(attempt) else {
                tracing::error!(
                    attempts = attempt,
                    "Giving up on relay connection after exhausting reconnect attempts"
                );
                break;
            };
            attempt += 1;
            self.set_status(ConnectionStatus::Reconnecting { attempt });
            tracing::info!(
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting to relay"
            );

            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.shutdown.changed() => break,
            }
        }

        self.set_status(ConnectionStatus::Disconnected);
    }

    fn set_status(&self, status: ConnectionStatus) {
        let _ = self.status.send(status);
    }

    async fn connect_and_serve(&mut self) -> Result<SessionEnd, ClientError> {
        let connect_timeout = self.config.connect_timeout;
        let connect = timeout(
            connect_timeout,
            tokio_tungstenite::connect_async(self.config.url.as_str()),
        );
        let (socket, _) = tokio::select! {
            result = connect => result.map_err(|_| ClientError::ConnectTimeout(connect_timeout))??,
            _ = self.shutdown.changed() => return Ok(SessionEnd::Shutdown),
        };
        let (mut sink, mut stream) = socket.split();

        // Anything queued during a previous session is stale.
        while self.outbound.try_recv().is_ok() {}

        let subscribe = ClientMessage::subscribe(self.config.user_id.clone()).to_json()?;
        sink.send(Message::Text(subscribe.into())).await?;
        tracing::debug!(user_id = %self.config.user_id, "Sent subscribe");

        let period = self.config.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        let mut subscribed = false;

        loop {
            let outgoing = tokio::select! {
                _ = self.shutdown.changed() => {
                    let close = CloseFrame {
                        code: CloseCode::from(NORMAL_CLOSURE),
                        reason: "Client shutting down".into(),
                    };
                    let _ = sink.send(Message::Close(Some(close))).await;
                    return Ok(SessionEnd::Shutdown);
                }
                _ = heartbeat.tick() => Some(ClientMessage::Heartbeat),
                Some(message) = self.outbound.recv() => Some(message),
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if self.handle_text(text.as_str()) {
                            subscribed = true;
                        }
                        None
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.as_ref().map(|f| u16::from(f.code));
                        if code == Some(NORMAL_CLOSURE) {
                            return Ok(SessionEnd::NormalClose);
                        }
                        tracing::warn!(code = ?code, "Relay closed the connection abnormally");
                        return Ok(SessionEnd::Abnormal { subscribed });
                    }
                    Some(Ok(_)) => None,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Relay connection error");
                        return Ok(SessionEnd::Abnormal { subscribed });
                    }
                    None => {
                        tracing::warn!("Relay connection ended without a close frame");
                        return Ok(SessionEnd::Abnormal { subscribed });
                    }
                },
            };

            if let Some(message) = outgoing {
                let json = message.to_json()?;
                if let Err(e) = sink.send(Message::Text(json.into())).await {
                    tracing::warn!(error = %e, "Failed to write to relay");
                    return Ok(SessionEnd::Abnormal { subscribed });
                }
            }
        }
    }

    /// Returns true when `text` is the relay's subscribe acknowledgment
    fn handle_text(&self, text: &str) -> bool {
        match ServerMessage::from_json(text) {
            Ok(ServerMessage::Connected(ack)) => {
                tracing::info!(user_id = %ack.user_id, "Subscribed to relay");
                self.set_status(ConnectionStatus::Connected);
                true
            }
            Ok(ServerMessage::HeartbeatResponse(response)) => {
                tracing::trace!(timestamp = %response.timestamp, "Heartbeat acknowledged");
                false
            }
            Ok(message) => {
                let invoked = self.subscriptions.dispatch(&message);
                tracing::debug!(kind = %message.kind(), callbacks = invoked, "Dispatched notification");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse relay message");
                false
            }
        }
    }
}
