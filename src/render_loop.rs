/*
 *  render_loop.rs
 *
 *  LyMatrix - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Render loop - walks the live scene list, restarting on every change
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

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use embedded_graphics::mono_font::ascii::FONT_10X20;
use embedded_graphics::mono_font::MonoFont;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::display::error::DisplayError;
use crate::display::surface::SurfaceLease;
use crate::display::traits::BoxedDriver;
use crate::renderer::{Interrupt, Interruption, SceneError, SceneOutcome, SceneRenderer};
use crate::scenes::{Action, Configuration};
use crate::shared::SharedConfig;

/// Short shutdown-aware pause at the top of every pass
pub const PASS_PAUSE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    /// Nothing to show; wait for a configuration or shutdown
    Idle,
    RunningScene,
    /// Re-read the configuration and start from the first scene
    Restarting,
    ShuttingDown,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderSettings {
    pub font: &'static MonoFont<'static>,
    pub pass_pause: Duration,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self { font: &FONT_10X20, pass_pause: PASS_PAUSE }
    }
}

/// What the loop did before it stopped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderReport {
    /// Passes started over the scene list, including restarts
    pub passes: u64,
    pub scenes_completed: u64,
    pub scenes_skipped: u64,
}

/// Scenes already reported as skipped under the current configuration.
///
/// A looping list of broken scenes comes round every pass; only the first
/// failure of each scene is worth a warning.
#[derive(Debug, Default)]
pub struct SkipNotes {
    seen: HashSet<usize>,
}

impl SkipNotes {
    /// True the first time `index` is noted since the last reset
    pub fn first(&mut self, index: usize) -> bool {
        self.seen.insert(index)
    }

    pub fn reset(&mut self) {
        self.seen.clear();
    }
}

pub struct RenderLoop {
    driver: BoxedDriver,
    shared: SharedConfig,
    shutdown: CancellationToken,
    settings: RenderSettings,
    report: RenderReport,
    skips: SkipNotes,
}

impl RenderLoop {
    pub fn new(driver: BoxedDriver, shared: SharedConfig, shutdown: CancellationToken, settings: RenderSettings) -> Self {
        Self {
            driver,
            shared,
            shutdown,
            settings,
            report: RenderReport::default(),
            skips: SkipNotes::default(),
        }
    }

    /// Run until shutdown. Only a panel failure ends the loop early.
    pub async fn run(mut self) -> Result<RenderReport, DisplayError> {
        let shared = self.shared.clone();
        let shutdown = self.shutdown.clone();
        let interrupt = Interrupt::new(&shared, &shutdown);

        let mut config: Arc<Configuration> = shared.snapshot();
        let mut index = 0usize;
        let mut state = RenderState::Restarting;
        let mut fresh = true;

        loop {
            state = match state {
                RenderState::Restarting => {
                    shared.clear_changed();
                    let next = shared.snapshot();
                    if !Arc::ptr_eq(&next, &config) {
                        fresh = true;
                        self.skips.reset();
                    }
                    config = next;
                    index = 0;
                    self.report.passes += 1;
                    if fresh {
                        info!(
                            "Starting pass {} over {} scene(s), action={}",
                            self.report.passes,
                            config.scene_count(),
                            config.options.action.as_str()
                        );
                        fresh = false;
                    } else {
                        debug!("Starting pass {}", self.report.passes);
                    }
                    if config.data.scenes.is_empty() {
                        RenderState::Idle
                    } else {
                        match interrupt.pause(self.settings.pass_pause).await {
                            Some(Interruption::Shutdown) => RenderState::ShuttingDown,
                            _ => RenderState::RunningScene,
                        }
                    }
                }

                RenderState::RunningScene => match interrupt.check() {
                    Some(Interruption::Shutdown) => RenderState::ShuttingDown,
                    Some(Interruption::ConfigChanged) => {
                        debug!("Configuration changed, restarting");
                        RenderState::Restarting
                    }
                    None => {
                        let outcome = match config.data.scenes.get(index) {
                            Some(scene) => {
                                debug!("Scene {}: {} '{}'", index, scene.content.kind(), scene.content.value());
                                SceneRenderer::new(self.driver.as_mut(), self.settings.font)
                                    .render(scene, &config, &interrupt)
                                    .await
                            }
                            None => Ok(SceneOutcome::Completed),
                        };
                        match outcome {
                            Ok(SceneOutcome::Completed) => {
                                self.report.scenes_completed += 1;
                                index += 1;
                                self.after_scene(index, &config)
                            }
                            Ok(SceneOutcome::Interrupted(Interruption::Shutdown)) => RenderState::ShuttingDown,
                            Ok(SceneOutcome::Interrupted(Interruption::ConfigChanged)) => {
                                debug!("Configuration changed mid-scene, restarting");
                                RenderState::Restarting
                            }
                            Err(SceneError::Hardware(e)) => {
                                error!("Panel failure, render loop stopping: {}", e);
                                return Err(e);
                            }
                            Err(e) => {
                                if self.skips.first(index) {
                                    warn!("Skipping scene {}: {}", index, e);
                                } else {
                                    debug!("Skipping scene {}: {}", index, e);
                                }
                                self.report.scenes_skipped += 1;
                                index += 1;
                                self.after_scene(index, &config)
                            }
                        }
                    }
                },

                RenderState::Idle => {
                    debug!("Render loop idle");
                    tokio::select! {
                        _ = shutdown.cancelled() => RenderState::ShuttingDown,
                        _ = shared.wait_for_change() => RenderState::Restarting,
                    }
                }

                RenderState::ShuttingDown => {
                    self.blank();
                    info!(
                        "Render loop stopped after {} pass(es), {} scene(s) shown, {} skipped",
                        self.report.passes, self.report.scenes_completed, self.report.scenes_skipped
                    );
                    return Ok(self.report);
                }
            };
        }
    }

    /// Next state once scene `index - 1` is done
    fn after_scene(&self, index: usize, config: &Configuration) -> RenderState {
        if index < config.data.scenes.len() {
            return RenderState::RunningScene;
        }
        match config.options.action {
            Action::Loop => RenderState::Restarting,
            Action::Once => {
                info!("Single pass complete");
                RenderState::Idle
            }
        }
    }

    /// Leave the panel dark; failures here only get logged
    fn blank(&mut self) {
        let result = SurfaceLease::acquire(self.driver.as_mut()).and_then(|mut lease| {
            lease.clear();
            lease.present()
        });
        if let Err(e) = result {
            warn!("Could not blank panel on shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::drivers::mock::{MockPanel, MockPanelState};
    use crate::normalize::normalize;
    use std::sync::Mutex;

    fn start(json: &str) -> (SharedConfig, CancellationToken, Arc<Mutex<MockPanelState>>, tokio::task::JoinHandle<Result<RenderReport, DisplayError>>) {
        let panel = MockPanel::new(128, 32);
        let state = panel.state();
        let shared = SharedConfig::new(normalize(json).unwrap());
        let token = CancellationToken::new();
        let render = RenderLoop::new(Box::new(panel), shared.clone(), token.clone(), RenderSettings::default());
        let handle = tokio::spawn(render.run());
        (shared, token, state, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_repeats_passes() {
        let (_shared, token, _state, handle) = start(
            r#"{"data":{"scenes":[{"type":"string","value":"A","time":1},{"type":"string","value":"B","time":1}]}}"#,
        );
        tokio::time::sleep(Duration::from_millis(4500)).await;
        token.cancel();
        let report = handle.await.unwrap().unwrap();
        assert!(report.passes >= 2, "{:?}", report);
        assert!(report.scenes_completed >= 4, "{:?}", report);
    }

    #[tokio::test(start_paused = true)]
    async fn test_once_goes_idle() {
        let (_shared, token, state, handle) = start(
            r#"{"options":{"action":"once"},"data":{"scenes":[{"type":"string","value":"A","time":1}]}}"#,
        );
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(state.lock().unwrap().presents.len(), 1);
        token.cancel();
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.passes, 1);
        assert_eq!(report.scenes_completed, 1);
        // scene frame plus the blank shutdown frame
        let state = state.lock().unwrap();
        assert_eq!(state.presents.len(), 2);
        assert!(state.presents[1].is_blank());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_list_idles_until_publish() {
        let (shared, token, state, handle) = start(r#"{"data":{"scenes":[]}}"#);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(state.lock().unwrap().presents.is_empty());

        shared.publish(normalize(r#"{"options":{"action":"once"},"data":{"scenes":[{"type":"string","value":"Go","time":1}]}}"#).unwrap());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(state.lock().unwrap().lit_presents().len(), 1);

        token.cancel();
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.passes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_change_restarts_from_first_scene() {
        let (shared, token, state, handle) = start(
            r#"{"data":{"scenes":[{"type":"string","value":"Long","time":600}]}}"#,
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        shared.publish(normalize(r#"{"options":{"action":"once"},"data":{"scenes":[{"type":"string","value":"New","display":"left","time":1}]}}"#).unwrap());

        // the long hold is only cut by shutdown; the change lands after it
        tokio::time::sleep(Duration::from_secs(601)).await;
        token.cancel();
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.passes, 2);

        let state = state.lock().unwrap();
        let lit = state.lit_presents();
        assert_eq!(lit.len(), 2);
        assert_eq!(lit[1].first_column.map(|c| c < 10), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_image_is_skipped() {
        let (_shared, token, state, handle) = start(
            r#"{"options":{"action":"once"},"data":{"scenes":[
                {"type":"image","value":"missing"},
                {"type":"string","value":"After","time":1}]}}"#,
        );
        tokio::time::sleep(Duration::from_secs(3)).await;
        token.cancel();
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.scenes_skipped, 1);
        assert_eq!(report.scenes_completed, 1);
        assert_eq!(state.lock().unwrap().lit_presents().len(), 1);
    }

    #[test]
    fn test_skip_notes_warn_once_per_scene() {
        let mut notes = SkipNotes::default();
        assert!(notes.first(0));
        assert!(notes.first(1));
        assert!(!notes.first(0));
        assert!(!notes.first(1));
        notes.reset();
        assert!(notes.first(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_skipped_loop_keeps_cycling() {
        let (_shared, token, state, handle) = start(
            r#"{"data":{"scenes":[{"type":"image","value":"missing"},{"type":"image","value":"gone"}]}}"#,
        );
        tokio::time::sleep(Duration::from_millis(105)).await;
        token.cancel();
        let report = handle.await.unwrap().unwrap();
        // one pass per pause; the last may be cut before its scenes run
        assert!(report.passes >= 5, "{:?}", report);
        assert!(report.scenes_skipped >= (report.passes - 1) * 2, "{:?}", report);
        assert!(report.scenes_skipped <= report.passes * 2, "{:?}", report);
        assert_eq!(report.scenes_completed, 0);
        assert_eq!(state.lock().unwrap().lit_presents().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hardware_failure_ends_loop() {
        let (_shared, _token, state, handle) = start(
            r#"{"data":{"scenes":[{"type":"string","value":"A","effect":"scroll"}]}}"#,
        );
        state.lock().unwrap().fail_after_presents = Some(3);
        let result = tokio::time::timeout(Duration::from_secs(10), handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(DisplayError::PresentFailed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_idle_blanks_panel() {
        let (_shared, token, state, handle) = start(r#"{}"#);
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        handle.await.unwrap().unwrap();
        let state = state.lock().unwrap();
        assert_eq!(state.presents.len(), 1);
        assert!(state.presents[0].is_blank());
        assert_eq!(state.outstanding(), 0);
    }
}
