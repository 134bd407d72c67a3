/*
 *  main.rs
 *
 *  LyMatrix - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::path::Path;

use anyhow::Context;
use env_logger::Env;
use log::{error, info, warn};
use local_ip_address::local_ip;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use lymatrix::config;
use lymatrix::display::{BoxedDriver, HeadlessPanel, PanelDriver};
use lymatrix::lifecycle::{self, LifecycleSettings};
use lymatrix::normalize::normalize;
use lymatrix::receiver::ConfigReceiver;
use lymatrix::render_loop::RenderSettings;
use lymatrix::scenes::Configuration;
use lymatrix::shared::SharedConfig;

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Asynchronously waits for a SIGINT, SIGTERM, or SIGHUP signal.
#[cfg(unix)]
async fn signal_handler() -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn signal_handler() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received. Initiating graceful shutdown.");
    Ok(())
}

/// Scenes shown before any client connects
fn initial_scenes(path: Option<&Path>) -> anyhow::Result<Configuration> {
    let Some(path) = path else {
        return Ok(Configuration::welcome());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenes from {}", path.display()))?;
    let scenes = normalize(&raw).with_context(|| format!("invalid scenes in {}", path.display()))?;
    info!("Loaded {} scene(s) from {}", scenes.scene_count(), path.display());
    Ok(scenes)
}

#[tokio::main] // Requires the `tokio` runtime with `macros` and `rt-multi-thread` features
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;

    env_logger::Builder::from_env(Env::default().default_filter_or(cfg.log_level()))
        .format_timestamp_secs()
        .init();

    info!("This {} worth the Squeeze", env!("CARGO_PKG_NAME"));
    info!("v.{} built {} ({})", env!("CARGO_PKG_VERSION"), BUILD_DATE, BUILD_PROFILE);

    let panel = cfg.panel();
    let font = panel
        .font()
        .with_context(|| format!("unknown font '{}'", panel.font_name()))?;

    let shared = SharedConfig::new(initial_scenes(cfg.scenes.as_deref())?);

    let mut driver: BoxedDriver = Box::new(HeadlessPanel::new(&panel)?);
    driver.init().context("panel initialization")?;
    let caps = driver.capabilities();
    info!("Panel {} {}x{} font {}", caps.name, caps.width, caps.height, panel.font_name());

    let receiver = ConfigReceiver::bind(&cfg.listen_addr(), shared.clone()).await?;
    match local_ip() {
        Ok(inet) => info!("Send scenes to ws://{}:{}", inet, cfg.port()),
        Err(e) => warn!("Could not determine local address: {}", e),
    }

    let settings = LifecycleSettings {
        shutdown_timeout: cfg.shutdown_timeout(),
        render: RenderSettings { font, ..RenderSettings::default() },
    };

    let shutdown = async {
        if let Err(e) = signal_handler().await {
            error!("Signal handling unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let report = lifecycle::run(receiver, driver, shared, settings, shutdown).await?;
    info!("Shutdown complete, {} scene(s) shown", report.scenes_completed);
    Ok(())
}
