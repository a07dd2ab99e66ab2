mod auth;
mod checkout;
mod config;
mod error;
mod routes;
mod subscriptions;
mod webhook;

use std::sync::Arc;

use config::AppConfig;
use routes::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vcnotebook_api=info".parse()?),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting vcnotebook-api with config: {:?}", config);
    if config.dodo_webhook_secret.is_none() {
        tracing::warn!("DODO_WEBHOOK_SECRET not set; payment webhooks will not be verified");
    }

    let state = AppState::from_config(config);
    let bind_addr = state.config.bind_addr.clone();
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("vcnotebook-api listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
