/*
 *  renderer.rs
 *
 *  LyMatrix - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Scene renderer - one scene, frame by frame, until done or interrupted
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

use std::time::Duration;

use embedded_graphics::mono_font::MonoFont;
use log::{debug, trace};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::display::error::DisplayError;
use crate::display::surface::{Surface, SurfaceLease};
use crate::display::traits::PanelDriver;
use crate::imaging::{self, ImageError};
use crate::scenes::{Alignment, Configuration, Effect, Options, Scene, SceneContent};
use crate::shared::SharedConfig;

/// Why a scene stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    ConfigChanged,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneOutcome {
    Completed,
    Interrupted(Interruption),
}

#[derive(Debug, Error)]
pub enum SceneError {
    /// Missing or undecodable image; the scene is skipped
    #[error(transparent)]
    Image(#[from] ImageError),
    /// Panel failure; fatal for the render loop
    #[error("panel failure: {0}")]
    Hardware(#[from] DisplayError),
}

impl SceneError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SceneError::Hardware(_))
    }
}

/// The render side's view of the two stop signals
pub struct Interrupt<'a> {
    shared: &'a SharedConfig,
    shutdown: &'a CancellationToken,
}

impl<'a> Interrupt<'a> {
    pub fn new(shared: &'a SharedConfig, shutdown: &'a CancellationToken) -> Self {
        Self { shared, shutdown }
    }

    /// Shutdown wins over a pending configuration change
    pub fn check(&self) -> Option<Interruption> {
        if self.shutdown.is_cancelled() {
            Some(Interruption::Shutdown)
        } else if self.shared.is_changed() {
            Some(Interruption::ConfigChanged)
        } else {
            None
        }
    }

    /// Sleep for `duration`, cut short only by shutdown.
    ///
    /// Configuration changes are picked up at the next frame check.
    pub async fn pause(&self, duration: Duration) -> Option<Interruption> {
        if self.shutdown.is_cancelled() {
            return Some(Interruption::Shutdown);
        }
        if duration.is_zero() {
            return None;
        }
        tokio::select! {
            _ = self.shutdown.cancelled() => Some(Interruption::Shutdown),
            _ = tokio::time::sleep(duration) => None,
        }
    }
}

/// Floor of the centered position, also for text wider than the panel
pub fn centered(surface_width: i32, content_width: i32) -> i32 {
    (surface_width - content_width).div_euclid(2)
}

/// Starting x for non-scrolling text
pub fn static_offset(display: Alignment, surface_width: i32, text_width: i32) -> i32 {
    match display {
        Alignment::Left => 0,
        Alignment::Center => centered(surface_width, text_width),
        Alignment::Right => surface_width - text_width,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollStep {
    /// Keep scrolling after the normal frame delay
    Continue,
    /// Text just reached the center; hold there before continuing
    Dwell,
    /// Trailing edge is past the left edge
    Finished,
}

/// Horizontal scroll position, right edge to fully off the left
#[derive(Debug, Clone)]
pub struct ScrollCursor {
    offset: i32,
    text_width: i32,
    center: i32,
    dwell: bool,
}

impl ScrollCursor {
    pub fn new(surface_width: i32, text_width: i32, dwell: bool) -> Self {
        Self {
            offset: surface_width,
            text_width,
            center: centered(surface_width, text_width),
            dwell,
        }
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }

    /// Move one pixel left
    pub fn advance(&mut self) -> ScrollStep {
        self.offset -= 1;
        if self.offset + self.text_width < 0 {
            ScrollStep::Finished
        } else if self.dwell && self.offset == self.center {
            ScrollStep::Dwell
        } else {
            ScrollStep::Continue
        }
    }
}

/// Renders single scenes onto a borrowed panel driver
pub struct SceneRenderer<'a> {
    driver: &'a mut dyn PanelDriver,
    font: &'static MonoFont<'static>,
}

macro_rules! bail_if {
    ($interruption:expr) => {
        if let Some(i) = $interruption {
            return Ok(SceneOutcome::Interrupted(i));
        }
    };
}

impl<'a> SceneRenderer<'a> {
    pub fn new(driver: &'a mut dyn PanelDriver, font: &'static MonoFont<'static>) -> Self {
        Self { driver, font }
    }

    /// Render `scene` to completion, checking `interrupt` before every frame
    pub async fn render(
        &mut self,
        scene: &Scene,
        config: &Configuration,
        interrupt: &Interrupt<'_>,
    ) -> Result<SceneOutcome, SceneError> {
        match &scene.content {
            SceneContent::Text(text) => self.render_text(scene, text, &config.options, interrupt).await,
            SceneContent::Image(name) => self.render_image(scene, name, config, interrupt).await,
            SceneContent::Unsupported { kind, .. } => {
                debug!("Skipping scene of unsupported type '{}'", kind);
                Ok(SceneOutcome::Completed)
            }
        }
    }

    async fn render_text(
        &mut self,
        scene: &Scene,
        text: &str,
        options: &Options,
        interrupt: &Interrupt<'_>,
    ) -> Result<SceneOutcome, SceneError> {
        let font = self.font;
        let color = scene.color.to_rgb888();
        let text_width = Surface::measure_text(font, text);

        let mut lease = SurfaceLease::acquire(&mut *self.driver)?;
        let width = lease.width() as i32;
        let middle = lease.height() as i32 / 2;

        match scene.effect {
            Effect::Scroll => {
                debug!("Scrolling '{}' ({}px) across {}px", text, text_width, width);
                let mut cursor = ScrollCursor::new(width, text_width, scene.time > 0.0);
                loop {
                    bail_if!(interrupt.check());
                    lease.clear();
                    lease.draw_text(font, cursor.offset(), middle, color, text);
                    lease.present()?;
                    trace!("frame at x={}", cursor.offset());

                    match cursor.advance() {
                        ScrollStep::Finished => return Ok(SceneOutcome::Completed),
                        ScrollStep::Dwell => bail_if!(interrupt.pause(scene.hold()).await),
                        ScrollStep::Continue => {}
                    }
                    bail_if!(interrupt.pause(options.scroll_delay()).await);
                }
            }
            Effect::None => {
                bail_if!(interrupt.check());
                let x = static_offset(scene.display, width, text_width);
                debug!("Showing '{}' at x={} for {:?}", text, x, scene.hold());
                lease.clear();
                lease.draw_text(font, x, middle, color, text);
                lease.present()?;
                bail_if!(interrupt.pause(scene.hold()).await);
                Ok(SceneOutcome::Completed)
            }
        }
    }

    async fn render_image(
        &mut self,
        scene: &Scene,
        name: &str,
        config: &Configuration,
        interrupt: &Interrupt<'_>,
    ) -> Result<SceneOutcome, SceneError> {
        bail_if!(interrupt.check());
        let image = imaging::load(config, name)?;

        let mut lease = SurfaceLease::acquire(&mut *self.driver)?;
        // images are always centered, `display` does not apply
        let x = centered(lease.width() as i32, image.width() as i32);
        debug!("Showing image '{}' {}x{} at x={}", name, image.width(), image.height(), x);

        lease.clear();
        lease.draw_image(x, &image);
        lease.present()?;
        bail_if!(interrupt.pause(scene.hold()).await);
        Ok(SceneOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::drivers::mock::MockPanel;
    use crate::imaging::tests::png_base64;
    use crate::normalize::normalize;
    use embedded_graphics::mono_font::ascii::FONT_10X20;
    use embedded_graphics::pixelcolor::Rgb888;

    fn scene_of(json: &str) -> (Configuration, Scene) {
        let config = normalize(json).unwrap();
        let scene = config.data.scenes[0].clone();
        (config, scene)
    }

    #[test]
    fn test_scroll_cursor_walks_full_width() {
        let mut cursor = ScrollCursor::new(128, 40, false);
        assert_eq!(cursor.offset(), 128);

        let mut drawn = vec![cursor.offset()];
        while cursor.advance() != ScrollStep::Finished {
            drawn.push(cursor.offset());
        }

        assert_eq!(cursor.offset(), -41);
        assert_eq!(*drawn.last().unwrap(), -40);
        // 168 advances between the first and the last drawn position
        assert_eq!(drawn.len() - 1, 168);
    }

    #[test]
    fn test_scroll_cursor_dwells_once_at_center() {
        let mut cursor = ScrollCursor::new(128, 40, true);
        let mut dwells = Vec::new();
        loop {
            match cursor.advance() {
                ScrollStep::Finished => break,
                ScrollStep::Dwell => dwells.push(cursor.offset()),
                ScrollStep::Continue => {}
            }
        }
        assert_eq!(dwells, vec![44]);
    }

    #[test]
    fn test_static_offsets() {
        assert_eq!(static_offset(Alignment::Left, 128, 40), 0);
        assert_eq!(static_offset(Alignment::Right, 128, 40), 88);
        assert_eq!(static_offset(Alignment::Center, 128, 40), 44);
        assert_eq!(static_offset(Alignment::Center, 128, 41), 43);
        assert_eq!(static_offset(Alignment::Center, 20, 41), -11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_scene_frame_count() {
        let mut panel = MockPanel::new(128, 32);
        let state = panel.state();
        let shared = SharedConfig::new(Configuration::default());
        let token = CancellationToken::new();
        let (config, scene) = scene_of(
            r#"{"data":{"scenes":[{"type":"string","value":"ABCD","effect":"scroll"}]}}"#,
        );

        let outcome = SceneRenderer::new(&mut panel, &FONT_10X20)
            .render(&scene, &config, &Interrupt::new(&shared, &token))
            .await
            .unwrap();

        assert_eq!(outcome, SceneOutcome::Completed);
        let state = state.lock().unwrap();
        // offsets 128 down to -40 inclusive
        assert_eq!(state.presents.len(), 169);
        assert!(state.presents.first().unwrap().is_blank());
        assert!(state.presents.last().unwrap().is_blank());
        assert_eq!(state.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_respects_delay_and_dwell() {
        let mut panel = MockPanel::new(128, 32);
        let shared = SharedConfig::new(Configuration::default());
        let token = CancellationToken::new();
        let (config, scene) = scene_of(
            r#"{"options":{"scrolldelay":0.01},
                "data":{"scenes":[{"type":"string","value":"ABCD","effect":"scroll","time":3}]}}"#,
        );

        let started = tokio::time::Instant::now();
        SceneRenderer::new(&mut panel, &FONT_10X20)
            .render(&scene, &config, &Interrupt::new(&shared, &token))
            .await
            .unwrap();
        let elapsed = started.elapsed();

        // 168 frame delays plus one 3s dwell
        let expected = Duration::from_secs_f64(168.0 * 0.01) + Duration::from_secs(3);
        assert!(elapsed >= expected, "elapsed {:?}", elapsed);
        assert!(elapsed < expected + Duration::from_millis(500), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_static_text_alignment() {
        for (display, first, last) in [("left", 0u32, 40u32), ("right", 88, 128), ("center", 44, 84)] {
            let mut panel = MockPanel::new(128, 32);
            let state = panel.state();
            let shared = SharedConfig::new(Configuration::default());
            let token = CancellationToken::new();
            let (config, scene) = scene_of(&format!(
                r#"{{"data":{{"scenes":[{{"type":"string","value":"ABCD","display":"{}","time":1}}]}}}}"#,
                display
            ));

            let outcome = SceneRenderer::new(&mut panel, &FONT_10X20)
                .render(&scene, &config, &Interrupt::new(&shared, &token))
                .await
                .unwrap();
            assert_eq!(outcome, SceneOutcome::Completed);

            let state = state.lock().unwrap();
            assert_eq!(state.presents.len(), 1, "{}", display);
            let frame = &state.presents[0];
            assert!(frame.first_column.unwrap() >= first, "{}", display);
            assert!(frame.last_column.unwrap() < last, "{}", display);
            assert_eq!(frame.first_color, Some(Rgb888::new(255, 255, 0)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_change_interrupts_scroll() {
        let mut panel = MockPanel::new(128, 32);
        let state = panel.state();
        let shared = SharedConfig::new(Configuration::default());
        let token = CancellationToken::new();
        let (config, scene) = scene_of(
            r#"{"data":{"scenes":[{"type":"string","value":"ABCD","effect":"scroll"}]}}"#,
        );

        let publisher = {
            let shared = shared.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(520)).await;
                shared.publish(Configuration::welcome());
            })
        };

        let outcome = SceneRenderer::new(&mut panel, &FONT_10X20)
            .render(&scene, &config, &Interrupt::new(&shared, &token))
            .await
            .unwrap();
        publisher.await.unwrap();

        assert_eq!(outcome, SceneOutcome::Interrupted(Interruption::ConfigChanged));
        let state = state.lock().unwrap();
        assert!(state.presents.len() < 169);
        assert_eq!(state.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cuts_dwell_short() {
        let mut panel = MockPanel::new(128, 32);
        let shared = SharedConfig::new(Configuration::default());
        let token = CancellationToken::new();
        let (config, scene) = scene_of(
            r#"{"data":{"scenes":[{"type":"string","value":"Hi","time":600}]}}"#,
        );

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                token.cancel();
            })
        };

        let started = tokio::time::Instant::now();
        let outcome = SceneRenderer::new(&mut panel, &FONT_10X20)
            .render(&scene, &config, &Interrupt::new(&shared, &token))
            .await
            .unwrap();
        canceller.await.unwrap();

        assert_eq!(outcome, SceneOutcome::Interrupted(Interruption::Shutdown));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_scene_centered() {
        let mut panel = MockPanel::new(128, 32);
        let state = panel.state();
        let shared = SharedConfig::new(Configuration::default());
        let token = CancellationToken::new();
        let json = format!(
            r#"{{"data":{{"scenes":[{{"type":"image","value":"logo","display":"left","time":1}}],
                "images":{{"logo":"data:image/png;base64,{}"}}}}}}"#,
            png_base64(8, 8, [0, 0, 255, 255])
        );
        let (config, scene) = scene_of(&json);

        let outcome = SceneRenderer::new(&mut panel, &FONT_10X20)
            .render(&scene, &config, &Interrupt::new(&shared, &token))
            .await
            .unwrap();
        assert_eq!(outcome, SceneOutcome::Completed);

        let state = state.lock().unwrap();
        let frame = &state.presents[0];
        assert_eq!(frame.first_column, Some(60));
        assert_eq!(frame.last_column, Some(67));
        assert_eq!(frame.lit, 64);
        assert_eq!(frame.first_color, Some(Rgb888::new(0, 0, 255)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_errors_are_not_fatal() {
        let mut panel = MockPanel::new(128, 32);
        let state = panel.state();
        let shared = SharedConfig::new(Configuration::default());
        let token = CancellationToken::new();
        let (config, scene) = scene_of(
            r#"{"data":{"scenes":[{"type":"image","value":"missing"},{"type":"image","value":"junk"}],
                "images":{"junk":"data:image/png;base64,@@@"}}}"#,
        );
        let junk = config.data.scenes[1].clone();
        let interrupt = Interrupt::new(&shared, &token);
        let mut renderer = SceneRenderer::new(&mut panel, &FONT_10X20);

        let err = renderer.render(&scene, &config, &interrupt).await.unwrap_err();
        assert!(matches!(err, SceneError::Image(ImageError::Lookup(_))));
        assert!(!err.is_fatal());

        let err = renderer.render(&junk, &config, &interrupt).await.unwrap_err();
        assert!(matches!(err, SceneError::Image(ImageError::Decode { .. })));

        let state = state.lock().unwrap();
        assert!(state.presents.is_empty());
        assert_eq!(state.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_present_failure_is_fatal() {
        let mut panel = MockPanel::new(128, 32);
        panel.state().lock().unwrap().simulate_present_failure = true;
        let shared = SharedConfig::new(Configuration::default());
        let token = CancellationToken::new();
        let (config, scene) = scene_of(r#"{"data":{"scenes":[{"type":"string","value":"Hi"}]}}"#);

        let err = SceneRenderer::new(&mut panel, &FONT_10X20)
            .render(&scene, &config, &Interrupt::new(&shared, &token))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_unsupported_scene_is_noop() {
        let mut panel = MockPanel::new(128, 32);
        let state = panel.state();
        let shared = SharedConfig::new(Configuration::default());
        let token = CancellationToken::new();
        let (config, scene) = scene_of(r#"{"data":{"scenes":[{"type":"video","value":"x"}]}}"#);

        let outcome = SceneRenderer::new(&mut panel, &FONT_10X20)
            .render(&scene, &config, &Interrupt::new(&shared, &token))
            .await
            .unwrap();
        assert_eq!(outcome, SceneOutcome::Completed);
        assert_eq!(state.lock().unwrap().created, 0);
    }
}
