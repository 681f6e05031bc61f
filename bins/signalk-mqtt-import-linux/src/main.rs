use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use signalk_mqtt_server::{
    delivery_channel, load_config, spawn_forwarder, BridgeConfig, DeltaOutput, FileRuleStorage,
    ImportService, MqttBridge, DELIVERY_CHANNEL_CAPACITY,
};

const CONFIG_ENV: &str = "SIGNALK_MQTT_IMPORT_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "mqtt-import.json";
const FORWARD_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,signalk_mqtt_server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Signal K MQTT import starting...");

    let config_path = config_path();
    let config = load_config(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    tracing::info!("Configuration: {}", config_path.display());

    let http_addr: SocketAddr = config
        .http_bind
        .parse()
        .with_context(|| format!("invalid httpBind '{}'", config.http_bind))?;
    let output = DeltaOutput::parse(&config.output)?;

    let storage = Arc::new(FileRuleStorage::from_config(&config));
    tracing::info!("Rule file: {}", storage.path().display());
    let (sink, rx) = delivery_channel(DELIVERY_CHANNEL_CAPACITY);
    let service = Arc::new(ImportService::new(&config, storage, Arc::new(sink))?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Delta output
    let forwarder = spawn_forwarder(rx, output);

    // MQTT bridge
    let bridge_handle = if config.enabled {
        let bridge_config = BridgeConfig::from_config(&config, service.status().client_id())?;
        let bridge = MqttBridge::new(&bridge_config, service.clone());
        Some(tokio::spawn(bridge.run(shutdown_rx.clone())))
    } else {
        tracing::warn!("MQTT import disabled in configuration, not connecting");
        None
    };

    // HTTP API
    let app = signalk_mqtt_web::create_router(service.clone(), Some(Path::new(&config.public_dir)));
    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("binding {}", http_addr))?;
    let mut http_shutdown = shutdown_rx.clone();
    let mut http_handle = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = http_shutdown.wait_for(|stop| *stop).await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    tracing::info!("Signal K MQTT import ready");
    tracing::info!("   Broker:   {}", config.mqtt_broker);
    tracing::info!("   HTTP API: http://{}/api/rules", http_addr);

    // Wait for shutdown signal
    let http_stopped = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
            false
        }
        _ = &mut http_handle => {
            tracing::warn!("HTTP server stopped");
            true
        }
    };

    let _ = shutdown_tx.send(true);
    if let Some(handle) = bridge_handle {
        if let Err(e) = handle.await {
            tracing::error!("MQTT bridge task failed: {}", e);
        }
    }
    if !http_stopped {
        if let Err(e) = http_handle.await {
            tracing::error!("HTTP server task failed: {}", e);
        }
    }
    service.shutdown();
    // Last handle on the delivery sink; dropping it lets the forwarder drain.
    drop(service);
    forwarder.finish(FORWARD_GRACE).await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// First argument, then `SIGNALK_MQTT_IMPORT_CONFIG`, then `mqtt-import.json`.
fn config_path() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os(CONFIG_ENV))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}
