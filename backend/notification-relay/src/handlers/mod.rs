/// HTTP handlers for the notification relay
pub mod notifications;
pub mod relay;

use actix_web::web;

use crate::metrics;

/// Register relay routes. `relay_path` serves the WebSocket upgrade and the
/// push API on the same URL.
pub fn register_routes(cfg: &mut web::ServiceConfig, relay_path: &str) {
    cfg.route("/health", web::get().to(|| async { "OK" }))
        .route("/metrics", web::get().to(metrics::serve_metrics))
        .service(
            web::resource(relay_path)
                .route(web::get().to(relay::open_session))
                .route(web::post().to(relay::push_notification))
                .default_service(web::to(relay::unsupported)),
        )
        .service(
            web::scope("/api/v1/relay")
                .route("/push", web::post().to(relay::push_notification))
                .route("/broadcast", web::post().to(notifications::broadcast_notification))
                .route("/purchases", web::post().to(notifications::purchase_fanout))
                .route("/status/{user_id}", web::get().to(notifications::connection_status))
                .route("/stats", web::get().to(notifications::relay_stats))
                .route("/users", web::get().to(notifications::list_connected_users)),
        );
}
