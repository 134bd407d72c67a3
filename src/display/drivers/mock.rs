/*
 *  display/drivers/mock.rs
 *
 *  LyMatrix - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Mock panel driver for testing without hardware
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

use std::sync::{Arc, Mutex};

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;

use crate::display::error::DisplayError;
use crate::display::surface::Surface;
use crate::display::traits::{check_surface, PanelCapabilities, PanelDriver};

/// Mock panel driver for testing
///
/// This driver simulates a panel without requiring hardware. Every present is
/// summarised into a [`PresentedFrame`] so tests can check where content
/// landed, how many frames a scene produced, and that surfaces are returned.
pub struct MockPanel {
    capabilities: PanelCapabilities,

    /// Last presented surface
    front: Surface,

    /// Shared state for testing
    state: Arc<Mutex<MockPanelState>>,
}

/// Summary of one presented frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedFrame {
    /// Number of non-black pixels
    pub lit: usize,

    /// Leftmost column with a lit pixel
    pub first_column: Option<u32>,

    /// Rightmost column with a lit pixel
    pub last_column: Option<u32>,

    /// Color of the first lit pixel found (row-major)
    pub first_color: Option<Rgb888>,
}

impl PresentedFrame {
    fn of(surface: &Surface) -> Self {
        let mut frame = PresentedFrame { lit: 0, first_column: None, last_column: None, first_color: None };
        let width = surface.width().max(1);
        for (i, &px) in surface.as_slice().iter().enumerate() {
            if px == Rgb888::BLACK {
                continue;
            }
            let x = i as u32 % width;
            frame.lit += 1;
            frame.first_column = Some(frame.first_column.map_or(x, |c| c.min(x)));
            frame.last_column = Some(frame.last_column.map_or(x, |c| c.max(x)));
            frame.first_color.get_or_insert(px);
        }
        frame
    }

    pub fn is_blank(&self) -> bool {
        self.lit == 0
    }
}

/// Internal state for the mock driver (shared for inspection in tests)
#[derive(Debug, Default)]
pub struct MockPanelState {
    /// Number of times init() was called
    pub init_count: usize,

    /// Surfaces handed out by create_surface()
    pub created: usize,

    /// Surfaces handed back through recycle()
    pub recycled: usize,

    /// Every presented frame, in order
    pub presents: Vec<PresentedFrame>,

    /// Simulate failures (for error testing)
    pub simulate_present_failure: bool,
    pub simulate_init_failure: bool,

    /// Fail presents once this many have succeeded
    pub fail_after_presents: Option<usize>,
}

impl MockPanelState {
    /// Surfaces still out with a caller
    pub fn outstanding(&self) -> usize {
        self.created.saturating_sub(self.recycled)
    }

    /// Presents that actually showed something
    pub fn lit_presents(&self) -> Vec<&PresentedFrame> {
        self.presents.iter().filter(|f| !f.is_blank()).collect()
    }
}

impl MockPanel {
    pub fn new(width: u32, height: u32) -> Self {
        let capabilities = PanelCapabilities {
            width,
            height,
            name: "mock".to_string(),
        };

        Self {
            front: Surface::new(width, height),
            capabilities,
            state: Arc::new(Mutex::new(MockPanelState::default())),
        }
    }

    /// Get reference to state for inspection in tests
    pub fn state(&self) -> Arc<Mutex<MockPanelState>> {
        Arc::clone(&self.state)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockPanelState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PanelDriver for MockPanel {
    fn capabilities(&self) -> &PanelCapabilities {
        &self.capabilities
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        let mut state = self.lock();

        if state.simulate_init_failure {
            return Err(DisplayError::InitializationFailed("Simulated init failure".to_string()));
        }

        state.init_count += 1;
        Ok(())
    }

    fn create_surface(&mut self) -> Result<Surface, DisplayError> {
        self.lock().created += 1;
        Ok(Surface::new(self.capabilities.width, self.capabilities.height))
    }

    fn present(&mut self, mut surface: Surface) -> Result<Surface, DisplayError> {
        check_surface(&self.capabilities, &surface)?;
        {
            let mut state = self.lock();
            let exhausted = state
                .fail_after_presents
                .is_some_and(|limit| state.presents.len() >= limit);
            if state.simulate_present_failure || exhausted {
                return Err(DisplayError::PresentFailed("Simulated present failure".to_string()));
            }
            state.presents.push(PresentedFrame::of(&surface));
        }
        std::mem::swap(&mut self.front, &mut surface);
        Ok(surface)
    }

    fn recycle(&mut self, _surface: Surface) {
        self.lock().recycled += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::mono_font::ascii::FONT_6X10;

    #[test]
    fn test_mock_panel_creation() {
        let panel = MockPanel::new(128, 32);
        assert_eq!(panel.capabilities().width, 128);
        assert_eq!(panel.capabilities().height, 32);
        assert_eq!(panel.state().lock().unwrap().presents.len(), 0);
    }

    #[test]
    fn test_mock_panel_init() {
        let mut panel = MockPanel::new(128, 32);
        let state = panel.state();
        assert_eq!(state.lock().unwrap().init_count, 0);

        panel.init().unwrap();
        assert_eq!(state.lock().unwrap().init_count, 1);

        state.lock().unwrap().simulate_init_failure = true;
        assert!(panel.init().is_err());
    }

    #[test]
    fn test_mock_panel_records_frames() {
        let mut panel = MockPanel::new(64, 16);
        let mut surface = panel.create_surface().unwrap();
        surface.draw_text(&FONT_6X10, 10, 8, Rgb888::RED, "Hi");
        let next = panel.present(surface).unwrap();
        panel.recycle(next);

        let state = panel.state();
        let state = state.lock().unwrap();
        let frame = &state.presents[0];
        assert!(frame.lit > 0);
        assert!(frame.first_column.unwrap() >= 10);
        assert!(frame.last_column.unwrap() < 22);
        assert_eq!(frame.first_color, Some(Rgb888::RED));
        assert_eq!(state.outstanding(), 0);
    }

    #[test]
    fn test_mock_panel_fail_after() {
        let mut panel = MockPanel::new(8, 8);
        panel.state().lock().unwrap().fail_after_presents = Some(1);
        let s = panel.create_surface().unwrap();
        let s = panel.present(s).unwrap();
        assert!(panel.present(s).is_err());
    }
}
