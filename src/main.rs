//! Job Radar — Binary Entrypoint
//! Boots the admin HTTP server and the background source rotation.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use job_radar::metrics::Metrics;
use job_radar::notify::telegram::TelegramTransport;
use job_radar::{Radar, RadarConfig};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - RADAR_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("RADAR_LOG").ok().is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("job_radar=info,warn"));

    // The host runtime may already own the global subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    enable_dev_tracing();

    // Recorder first, so metric descriptions land in it.
    let metrics = Metrics::init()?;

    let cfg = RadarConfig::load_default()?;
    let transport = Arc::new(TelegramTransport::from_env()?);
    let radar = Radar::from_config(&cfg, transport).await?;

    let shutdown = CancellationToken::new();
    radar.spawn_scheduler(shutdown.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            shutdown.cancel();
        }
    });

    let router = radar.router().merge(metrics.router());
    Ok(router.into())
}
