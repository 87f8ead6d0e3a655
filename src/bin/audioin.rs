//! Audio-In Driver
//!
//! Registers the audio-in model, constructs the configured components and
//! takes readings from each of them on a fixed interval until Ctrl+C.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audio_in::{
    audio::{AudioBackend, CpalBackend, SimulatedBackend},
    config::AppConfig,
    register_models,
    sensor::Extra,
    Registry, Sensor,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting audio-in driver v{}", env!("CARGO_PKG_VERSION"));

    let backend: Arc<dyn AudioBackend> = if config.simulate {
        tracing::info!("Using simulated capture backend");
        Arc::new(SimulatedBackend::default())
    } else {
        let backend = match config.host.as_deref() {
            Some(name) => CpalBackend::from_host_name(name)?,
            None => CpalBackend::new(),
        };
        Arc::new(backend)
    };

    let mut registry = Registry::new();
    register_models(&mut registry, backend)?;

    let mut sensors: Vec<Arc<dyn Sensor>> = Vec::new();
    for component in &config.components {
        let sensor = registry
            .construct(component)
            .with_context(|| format!("Failed to construct component {}", component.name))?;
        sensors.push(Arc::from(sensor));
    }

    if sensors.is_empty() {
        tracing::warn!("No components configured");
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(config.interval());

    tracing::info!("Taking readings every {:?} - press Ctrl+C to stop", config.interval());

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                for sensor in &sensors {
                    take_reading(sensor.clone()).await;
                }
            }
        }
    }

    tracing::info!("Shutting down");
    for sensor in &sensors {
        if let Err(e) = sensor.close() {
            tracing::warn!(sensor = sensor.name(), "Close failed: {}", e);
        }
    }

    Ok(())
}

/// Readings block for the whole capture window, so they run off the runtime
async fn take_reading(sensor: Arc<dyn Sensor>) {
    let name = sensor.name().to_string();

    match tokio::task::spawn_blocking(move || sensor.readings(&Extra::new())).await {
        Ok(Ok(readings)) => {
            let peak = readings
                .to_pcm_samples()
                .iter()
                .map(|s| s.unsigned_abs())
                .max()
                .unwrap_or(0);
            tracing::info!(
                sensor = %name,
                sample_count = readings.sample_count,
                peak,
                "Collected readings"
            );
        }
        Ok(Err(e)) => tracing::warn!(sensor = %name, "Readings failed: {}", e),
        Err(e) => tracing::error!(sensor = %name, "Reading task panicked: {}", e),
    }
}
