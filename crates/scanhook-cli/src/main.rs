//! scanhook demo binary.
//!
//! Headless consumer of the capture pipeline: loads a TOML config, starts a
//! [`BarcodeScanner`] on the platform backend, and prints every completed
//! barcode and device hotplug event until Ctrl-C.
//!
//! ```text
//! main()
//!  └─ AppConfig::load()     -- framing rules, device filter, backend choice
//!  └─ platform_backend()    -- raw input / global hook / libinput
//!  └─ BarcodeScanner        -- capture thread + pump thread
//!  └─ ctrl_c().await        -- block until shutdown
//! ```

mod config;

use std::path::Path;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scanhook_capture::{platform_backend, BarcodeScanner};

use crate::config::AppConfig;

const DEFAULT_CONFIG_PATH: &str = "scanhook.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = AppConfig::load(Path::new(&config_path))
        .with_context(|| format!("loading {config_path}"))?;

    // Structured logging; the config level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.scanner.log_level.clone())),
        )
        .init();

    info!("scanhook starting (config: {config_path})");

    let backend = platform_backend(config.backend_kind()?).context("selecting capture backend")?;
    let mut scanner = BarcodeScanner::new(
        config.framing.clone(),
        config.scanner.device_filter.clone(),
        backend,
        |read| {
            let device = read.device.as_deref().unwrap_or("<unknown device>");
            println!("{device}\t{}", read.barcode);
        },
        |event| {
            let verb = if event.attached { "attached" } else { "detached" };
            info!(
                "device {verb}: {} ({}) [{}]",
                event.device.name, event.device.stable_id, event.device.path
            );
        },
    );

    scanner.start().context("starting barcode scanner")?;

    for device in scanner.list_devices() {
        info!("attached at startup: {} ({})", device.name, device.stable_id);
    }
    if !config.scanner.device_filter.is_empty() {
        info!("listening only to device {}", config.scanner.device_filter);
    }
    info!("scanhook ready. Press Ctrl-C to exit.");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("shutdown signal received");

    scanner.stop();
    info!("scanhook stopped");
    Ok(())
}
