use actix_web::{middleware, App, HttpServer};
use notification_relay::{logging, metrics::MetricsMiddleware, AppState, Config};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    logging::init_tracing(config.log_format);

    tracing::info!("Starting notification relay");

    let bind_addr = config.bind_addr();
    let workers = config.workers;
    let relay_path = config.path.clone();
    let state = AppState::new(config);

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(MetricsMiddleware)
            .configure(notification_relay::configure(state.clone()))
    });
    if let Some(workers) = workers {
        server = server.workers(workers);
    }

    tracing::info!(
        host = %bind_addr.0,
        port = bind_addr.1,
        relay_path = %relay_path,
        "Starting HTTP server"
    );

    server.bind(bind_addr)?.run().await?;

    tracing::info!("Notification relay stopped");
    Ok(())
}
