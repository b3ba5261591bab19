use std::sync::Arc;

use crate::{config::Config, registry::ConnectionRegistry};

#[derive(Clone)]
pub struct AppState {
    pub registry: ConnectionRegistry,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            config: Arc::new(config),
        }
    }
}
