/// The relay endpoint
///
/// One path serves both sides of the relay: browsers upgrade it to a
/// WebSocket, the purchase-processing workflow POSTs notifications to it.
use actix_web::{http::header, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use relay_protocol::{PushRequest, PushResponse};

use crate::error::{AppError, Result};
use crate::metrics;
use crate::session::RelaySession;
use crate::state::AppState;

fn is_websocket_upgrade(req: &HttpRequest) -> bool {
    req.headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

/// GET {relay_path} with `Upgrade: websocket`
pub async fn open_session(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> std::result::Result<HttpResponse, Error> {
    if !is_websocket_upgrade(&req) {
        return Ok(unsupported().await);
    }

    tracing::debug!(peer = ?req.peer_addr(), "WebSocket upgrade requested");

    let session = RelaySession::new(state.registry.clone(), state.config.idle_timeout());
    ws::WsResponseBuilder::new(session, &req, stream)
        .frame_size(state.config.max_frame_size)
        .start()
}

/// POST {relay_path} (also /api/v1/relay/push)
///
/// Body: `{type, userId, data}`. Delivers to the user's live connection or
/// reports 404 when there is none; nothing is queued.
pub async fn push_notification(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let request: PushRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "Rejected malformed push request");
        AppError::from(e)
    })?;
    let (user_id, message) = request.into_message().map_err(|e| {
        tracing::warn!(error = %e, "Rejected invalid push payload");
        AppError::from(e)
    })?;
    let kind = message.kind();

    let delivered = state.registry.deliver(&user_id, message).await;
    metrics::record_notification(kind, delivered);

    if delivered {
        tracing::info!(user_id = %user_id, kind = %kind, "Notification delivered");
        Ok(HttpResponse::Ok().json(PushResponse::delivered()))
    } else {
        tracing::info!(user_id = %user_id, kind = %kind, "User not connected, notification dropped");
        Err(AppError::NotConnected)
    }
}

/// Any other method on the relay path
pub async fn unsupported() -> HttpResponse {
    HttpResponse::BadRequest().body("Expected WebSocket connection or POST request")
}
