use std::sync::Arc;

use anyhow::Context;
use notification_hub::backbone::{Backbone, RedisBackbone};
use notification_hub::http::{build_router, AppState};
use notification_hub::localizer::{CatalogLocalizer, Localizer};
use notification_hub::{global, logging, Config, Hub, Publisher};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        host = %config.app.host,
        port = config.app.port,
        test_mode = config.hub.test_mode,
        "Starting notification hub"
    );

    let localizer: Option<Arc<dyn Localizer>> = match &config.hub.locales_dir {
        Some(dir) => {
            let catalog = CatalogLocalizer::load_dir(dir)
                .with_context(|| format!("Failed to load message catalogs from {}", dir))?;
            info!(languages = ?catalog.languages(), "Message catalogs loaded");
            Some(Arc::new(catalog))
        }
        None => {
            warn!("HUB_LOCALES_DIR not set, localized messages fall back to their keys");
            None
        }
    };

    let backbone: Option<Arc<dyn Backbone>> = if config.hub.test_mode {
        warn!("Test mode enabled, backbone disabled and publishes are logged only");
        None
    } else {
        let redis = RedisBackbone::connect(&config.redis.url)
            .await
            .context("Failed to connect to Redis")?;
        Some(Arc::new(redis))
    };

    let mut builder = Hub::builder(config.hub.clone()).with_subscription(config.bridge.subscription());
    if let Some(backbone) = &backbone {
        builder = builder.with_backbone(backbone.clone());
    }
    if let Some(localizer) = localizer {
        builder = builder.with_localizer(localizer);
    }
    let hub = Arc::new(builder.start().await.context("Failed to start hub")?);
    global::install(hub.clone());

    let state = AppState {
        hub: hub.handle(),
        publisher: Publisher::from_test_mode(config.hub.test_mode, backbone),
        default_language: config.app.default_language.clone(),
    };
    let app = build_router(state);

    let addr = format!("{}:{}", config.app.host, config.app.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Close the hub even when the server failed
    if let Err(e) = hub.close().await {
        error!(error = %e, "Notification hub shut down with errors");
    }

    served.context("HTTP server error")?;
    info!("Notification hub exited");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
}
