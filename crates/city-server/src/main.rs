mod app;
mod config;

use std::sync::Arc;

use tracing::info;

use city_api::auth::{AppState, AppStateInner};

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "city_server=debug,city_api=debug,city_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = ServerConfig::from_env()?;
    info!(
        db = %config.db_path.display(),
        invalid_tier = ?config.subscriptions.invalid_tier,
        cancel_prior = config.subscriptions.cancel_prior,
        mail_page_limit = config.mail_page_limit,
        "Loaded configuration"
    );

    let db = city_db::Database::open(&config.db_path)?;
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        subscriptions: config.subscriptions,
        mail_page_limit: config.mail_page_limit,
    });

    let app = app::build_router(state);

    let addr = config.addr()?;
    info!("City server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
