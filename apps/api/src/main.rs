mod config;
mod enhancement;
mod enhancement_client;
mod errors;
mod models;
mod routes;
mod state;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::enhancement::context_builders::ContextBuilder;
use crate::enhancement::registry::FieldRegistry;
use crate::enhancement_client::EnhancementClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::DocumentStore;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting enhance-api v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the enhancement backend client
    let client = EnhancementClient::new(
        &config.enhance_api_base_url,
        config.enhance_api_key.clone(),
        config.http_timeout,
    )?;
    if config.enhance_api_key.is_none() {
        warn!("ENHANCE_API_KEY is not set; every enhancement will fail until it is");
    }
    info!(
        "Enhancement backend: {} (poll every {}ms, give up after {}s)",
        config.enhance_api_base_url,
        config.poll_interval.as_millis(),
        config.max_wait.as_secs()
    );

    let documents = Arc::new(DocumentStore::new());
    let fields = Arc::new(FieldRegistry::new(
        Arc::new(client),
        ContextBuilder::new(config.current_year),
        config.poll_settings(),
    ));

    let state = AppState {
        config: config.clone(),
        documents: documents.clone(),
        fields,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    documents.clear();
    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
