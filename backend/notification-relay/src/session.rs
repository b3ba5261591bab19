/// WebSocket session actor
///
/// One actor per browser connection. It answers control frames (`subscribe`,
/// `heartbeat`), forwards notifications queued for it by the registry, and
/// removes its registry entry when the transport closes.
use std::time::{Duration, Instant};

use actix::{Actor, ActorContext, ActorFutureExt, AsyncContext, StreamHandler, WrapFuture};
use actix_web_actors::ws;
use relay_protocol::{ClientMessage, ProtocolError, ServerMessage, UserId};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::registry::{ConnectionHandle, ConnectionRegistry};

/// Upper bound on how often the idle watchdog looks at a session
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unsubscribed,
    Subscribed(UserId),
    Closed,
}

/// What a session must do in response to one inbound text frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Subscribe(UserId),
    Heartbeat,
    Ignored,
}

impl SessionState {
    /// Decide how to react to `text` in the current state.
    ///
    /// Protocol errors are logged here and never end the session. The owning
    /// user is set once: a subscribe for a different user on an already
    /// subscribed connection is ignored.
    pub fn on_text(&self, text: &str) -> Inbound {
        if *self == SessionState::Closed {
            return Inbound::Ignored;
        }

        match ClientMessage::parse(text) {
            Ok(ClientMessage::Subscribe { user_id }) => match self {
                SessionState::Subscribed(owner) if *owner != user_id => {
                    tracing::warn!(
                        owner = %owner,
                        requested = %user_id,
                        "Ignoring subscribe for a different user on a subscribed connection"
                    );
                    Inbound::Ignored
                }
                _ => Inbound::Subscribe(user_id),
            },
            Ok(ClientMessage::Heartbeat) => Inbound::Heartbeat,
            Err(ProtocolError::UnknownType(kind)) => {
                tracing::info!(kind = %kind, "Unknown message type");
                Inbound::Ignored
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse WebSocket message");
                Inbound::Ignored
            }
        }
    }
}

pub struct RelaySession {
    registry: ConnectionRegistry,
    handle: ConnectionHandle,
    outbound: Option<UnboundedReceiver<ServerMessage>>,
    state: SessionState,
    last_seen: Instant,
    idle_timeout: Option<Duration>,
}

impl RelaySession {
    pub fn new(registry: ConnectionRegistry, idle_timeout: Option<Duration>) -> Self {
        let (handle, outbound) = ConnectionHandle::new();
        Self {
            registry,
            handle,
            outbound: Some(outbound),
            state: SessionState::Unsubscribed,
            last_seen: Instant::now(),
            idle_timeout,
        }
    }

    fn send(&self, ctx: &mut ws::WebsocketContext<Self>, message: &ServerMessage) {
        match message.to_json() {
            Ok(json) => ctx.text(json),
            Err(e) => tracing::error!(
                connection_id = %self.handle.id(),
                error = %e,
                "Failed to encode outbound message"
            ),
        }
    }

    /// Register, then acknowledge. `ctx.wait` holds back further frames until
    /// the entry is visible, so a client that has seen `connected` can rely
    /// on pushes reaching it.
    fn subscribe(&mut self, user_id: UserId, ctx: &mut ws::WebsocketContext<Self>) {
        let registry = self.registry.clone();
        let handle = self.handle.clone();
        let registered = user_id.clone();

        ctx.wait(
            async move { registry.register(registered, handle).await }
                .into_actor(self)
                .map(move |_, act, ctx| {
                    act.send(ctx, &ServerMessage::connected(user_id.clone()));
                    act.state = SessionState::Subscribed(user_id);
                }),
        );
    }

    fn watch_idle(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(timeout) = self.idle_timeout else {
            return;
        };

        ctx.run_interval(IDLE_CHECK_INTERVAL.min(timeout), move |act, ctx| {
            if act.last_seen.elapsed() > timeout {
                tracing::warn!(
                    connection_id = %act.handle.id(),
                    timeout_secs = timeout.as_secs(),
                    "Session idle, disconnecting"
                );
                ctx.close(Some(ws::CloseReason {
                    code: ws::CloseCode::Away,
                    description: Some("idle timeout".to_string()),
                }));
                ctx.stop();
            }
        });
    }
}

impl Actor for RelaySession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(connection_id = %self.handle.id(), "WebSocket connection opened");

        if let Some(outbound) = self.outbound.take() {
            ctx.add_stream(UnboundedReceiverStream::new(outbound));
        }
        self.watch_idle(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.state = SessionState::Closed;
        tracing::info!(connection_id = %self.handle.id(), "WebSocket connection closed");

        let registry = self.registry.clone();
        let connection_id = self.handle.id();
        actix::spawn(async move {
            registry.remove(connection_id).await;
        });
    }
}

// Notifications queued by the registry
impl StreamHandler<ServerMessage> for RelaySession {
    fn handle(&mut self, message: ServerMessage, ctx: &mut Self::Context) {
        self.send(ctx, &message);
    }

    fn finished(&mut self, _ctx: &mut Self::Context) {
        // The session keeps a sender alive, so this only happens on shutdown.
    }
}

// Frames from the client
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RelaySession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        self.last_seen = Instant::now();

        match msg {
            Ok(ws::Message::Text(text)) => match self.state.on_text(&text) {
                Inbound::Subscribe(user_id) => self.subscribe(user_id, ctx),
                Inbound::Heartbeat => self.send(ctx, &ServerMessage::heartbeat_response()),
                Inbound::Ignored => {}
            },
            Ok(ws::Message::Ping(bytes)) => ctx.pong(&bytes),
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!(
                    connection_id = %self.handle.id(),
                    "Binary WebSocket messages not supported"
                );
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(
                    connection_id = %self.handle.id(),
                    reason = ?reason,
                    "Client initiated close"
                );
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.handle.id(),
                    error = %e,
                    "WebSocket protocol error"
                );
                ctx.stop();
            }
        }
    }
}
