//! # SAML Web SSO Server
//!
//! Serves the hosted service and identity provider endpoints.

#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use saml_websso::config::{SamlConfiguration, ServerConfig};
use saml_websso::endpoints::{saml_router, SamlState};
use saml_websso::provisioning::StaticMetadataCache;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server = ServerConfig::from_env();
    let configuration = SamlConfiguration::load(&server.config_path)
        .with_context(|| format!("loading {}", server.config_path.display()))?;
    tracing::info!(
        config = %server.config_path.display(),
        identity_providers = configuration.service_provider.providers.len(),
        service_providers = configuration.identity_provider.providers.len(),
        "configuration loaded"
    );

    // only inline metadata and documents registered here are available
    let cache = Arc::new(StaticMetadataCache::new());
    let state = SamlState::from_configuration(configuration, cache)
        .context("invalid session limits")?;
    let app = saml_router(&state.configuration).with_state(state);

    let address = server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    tracing::info!(%address, "SAML server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("SAML server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "unable to listen for shutdown signal");
    }
}
