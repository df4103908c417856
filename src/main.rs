use axum::http::Method;
use buzz_server::config::Config;
use buzz_server::media::LocalMediaStorage;
use buzz_server::repositories::init_pool;
use buzz_server::{AppState, create_router};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Logging (rispetta RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,buzz_server=debug")),
        )
        .init();

    // 2. Configurazione
    let config = Config::from_env()?;
    config.print_info();

    // 3. Database e media storage
    let pool = init_pool(
        &config.database_url,
        config.max_connections,
        Duration::from_secs(config.connection_lifetime_secs),
    )
    .await?;
    info!("Database ready");

    let media =
        LocalMediaStorage::new(config.media_dir.clone(), config.media_public_url.clone()).await?;

    let state = Arc::new(
        AppState::new(pool, config.jwt_secret.clone(), Arc::new(media))
            .with_ws_idle_timeout(Duration::from_secs(config.ws_idle_timeout_secs))
            .with_max_upload_bytes(config.max_upload_bytes),
    );

    // 4. Router: API, canale live e allegati caricati
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let app = create_router(state)
        .nest_service("/media", ServeDir::new(&config.media_dir))
        .layer(cors);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("Unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
