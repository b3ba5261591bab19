/// Relay administration and fan-out endpoints
use actix_web::{web, HttpResponse};
use relay_protocol::{BroadcastRequest, PurchaseFanoutRequest, UserId};
use serde_json::json;

use crate::error::Result;
use crate::metrics;
use crate::state::AppState;

/// Get relay connection status for a user
///
/// Endpoint: GET /api/v1/relay/status/{user_id}
pub async fn connection_status(
    path: web::Path<UserId>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let user_id = path.into_inner();
    let connected = state.registry.is_connected(&user_id).await;

    HttpResponse::Ok().json(json!({
        "userId": user_id.to_string(),
        "connected": connected
    }))
}

/// Endpoint: GET /api/v1/relay/stats
pub async fn relay_stats(state: web::Data<AppState>) -> HttpResponse {
    let connected_users = state.registry.connected_users().await;

    HttpResponse::Ok().json(json!({
        "connectedUsers": connected_users
    }))
}

/// Endpoint: GET /api/v1/relay/users
pub async fn list_connected_users(state: web::Data<AppState>) -> HttpResponse {
    let user_ids = state.registry.connected_user_ids().await;

    HttpResponse::Ok().json(json!({
        "count": user_ids.len(),
        "users": user_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
    }))
}

/// Push one notification to every connected user
///
/// Endpoint: POST /api/v1/relay/broadcast
pub async fn broadcast_notification(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let request: BroadcastRequest = serde_json::from_slice(&body)?;
    let message = request.into_message()?;
    let kind = message.kind();

    let sent = state.registry.broadcast(message).await;
    tracing::info!(kind = %kind, sent = sent, "Broadcast notification");

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "sent": sent
    })))
}

/// Notify every referrer who earns from a purchase
///
/// Each referrer gets `purchase_completed` then `earning_update`. Referrers
/// without a live connection are counted as skipped.
///
/// Endpoint: POST /api/v1/relay/purchases
pub async fn purchase_fanout(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let request: PurchaseFanoutRequest = serde_json::from_slice(&body)?;

    let mut delivered = 0usize;
    let mut skipped = 0usize;
    for (user_id, message) in request.messages() {
        let kind = message.kind();
        let ok = state.registry.deliver(&user_id, message).await;
        metrics::record_notification(kind, ok);
        if ok {
            delivered += 1;
        } else {
            skipped += 1;
        }
    }

    tracing::info!(
        referral_name = %request.referral_name,
        referrers = request.referrers.len(),
        delivered = delivered,
        skipped = skipped,
        "Purchase notifications fanned out"
    );

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "delivered": delivered,
        "skipped": skipped
    })))
}
