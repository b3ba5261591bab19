pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod session;
pub mod state;

pub use config::Config;
pub use error::{AppError, Result};
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};
pub use state::AppState;

use actix_web::web;

/// Wire shared state and every relay route into an actix `App`
pub fn configure(state: AppState) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        let relay_path = state.config.path.clone();
        cfg.app_data(web::Data::new(state));
        handlers::register_routes(cfg, &relay_path);
    }
}
