//! ML Control Plane Server
//!
//! Bootstraps the control plane, starts the feature refresh loop and serves
//! the HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ml_control_plane::{
    config::Config,
    create_router,
    logic::control::ControlPlane,
    logic::features::{FeatureKind, StaticSource},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    // Initialize logging
    let json = config.json_logs();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ml_control_plane=debug,tower_http=debug".into()))
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer()))
        .init();

    tracing::info!("ML Control Plane starting ({})...", config.environment);
    if config.is_production() && !json {
        tracing::warn!("Plain-text logs in production; set LOG_FORMAT=json for log shipping");
    }

    let control = Arc::new(
        ControlPlane::bootstrap(&config.control_settings())
            .context("Failed to bootstrap control plane")?,
    );

    if !config.static_features.is_empty() {
        let source = config
            .static_features
            .iter()
            .fold(StaticSource::new("static", FeatureKind::Batch), |s, (name, value)| {
                s.with(name, *value)
            });
        control.add_source(Arc::new(source));
    }
    control.refresh_features();

    if config.refresh_interval_secs > 0 {
        let control = Arc::clone(&control);
        let period = Duration::from_secs(config.refresh_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                control.refresh_features();
            }
        });
        tracing::info!("Feature refresh every {}s", config.refresh_interval_secs);
    }

    let state = AppState {
        control,
        config: config.clone(),
    };
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
