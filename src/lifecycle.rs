/*
 *  lifecycle.rs
 *
 *  LyMatrix - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Startup and ordered shutdown of the render loop and the receiver
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

use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::display::traits::BoxedDriver;
use crate::receiver::ConfigReceiver;
use crate::render_loop::{RenderLoop, RenderReport, RenderSettings};
use crate::shared::SharedConfig;

#[derive(Debug, Clone, Copy)]
pub struct LifecycleSettings {
    /// Bound on each shutdown wait (render loop, then connections)
    pub shutdown_timeout: Duration,
    pub render: RenderSettings,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self { shutdown_timeout: Duration::from_secs(5), render: RenderSettings::default() }
    }
}

/// Run render loop and receiver until `shutdown_signal` resolves.
///
/// Shutdown stops the render loop first (it blanks the panel), then the
/// receiver and its open connections. An error means a panel failure or a
/// shutdown that did not finish in time.
pub async fn run<F>(
    receiver: ConfigReceiver,
    driver: BoxedDriver,
    shared: SharedConfig,
    settings: LifecycleSettings,
    shutdown_signal: F,
) -> anyhow::Result<RenderReport>
where
    F: Future<Output = ()>,
{
    let server_token = CancellationToken::new();
    let render_token = server_token.child_token();
    let tracker = TaskTracker::new();

    tracker.spawn(receiver.serve(server_token.clone(), tracker.clone()));
    let mut render = tokio::spawn(
        RenderLoop::new(driver, shared, render_token.clone(), settings.render).run(),
    );

    tokio::pin!(shutdown_signal);
    let joined = tokio::select! {
        _ = &mut shutdown_signal => {
            info!("Shutdown requested, stopping render loop");
            render_token.cancel();
            match tokio::time::timeout(settings.shutdown_timeout, &mut render).await {
                Ok(joined) => joined,
                Err(_) => {
                    render.abort();
                    stop_receiver(&server_token, &tracker, settings.shutdown_timeout).await;
                    bail!("render loop did not stop within {:?}", settings.shutdown_timeout);
                }
            }
        }
        joined = &mut render => {
            error!("Render loop ended before shutdown was requested");
            joined
        }
    };

    stop_receiver(&server_token, &tracker, settings.shutdown_timeout).await;

    match joined {
        Ok(result) => result.context("panel failure"),
        Err(e) => Err(anyhow!("render task failed: {}", e)),
    }
}

async fn stop_receiver(token: &CancellationToken, tracker: &TaskTracker, timeout: Duration) {
    token.cancel();
    tracker.close();
    if tokio::time::timeout(timeout, tracker.wait()).await.is_err() {
        warn!("{} connection task(s) still running after {:?}", tracker.len(), timeout);
    } else {
        info!("Receiver stopped");
    }
}
