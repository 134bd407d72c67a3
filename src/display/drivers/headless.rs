/*
 *  display/drivers/headless.rs
 *
 *  LyMatrix - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Software panel - double buffered, optional PPM snapshots of the front buffer
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

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::config::PanelConfig;
use crate::display::error::DisplayError;
use crate::display::surface::Surface;
use crate::display::traits::{check_surface, PanelCapabilities, PanelDriver};
use crate::pacer::Pacer;

/// Panel driver with no hardware behind it.
///
/// Keeps the front buffer in memory and, when a snapshot path is configured,
/// writes it out as a PPM image at most `snapshot_fps` times per second so
/// the current output can be watched from another machine.
pub struct HeadlessPanel {
    capabilities: PanelCapabilities,
    front: Surface,
    spare: Option<Surface>,
    frames: u64,
    snapshot: Option<PathBuf>,
    pacer: Pacer,
}

impl HeadlessPanel {
    pub fn new(config: &PanelConfig) -> Result<Self, DisplayError> {
        let (width, height) = (config.width(), config.height());
        if width == 0 || height == 0 {
            return Err(DisplayError::InvalidConfiguration(format!(
                "panel must have a size, got {}x{}", width, height
            )));
        }

        let capabilities = PanelCapabilities {
            width,
            height,
            name: "headless".to_string(),
        };

        Ok(Self {
            capabilities,
            front: Surface::new(width, height),
            spare: None,
            frames: 0,
            snapshot: config.snapshot.clone(),
            pacer: Pacer::new(config.snapshot_fps()),
        })
    }

    #[cfg(test)]
    /// Create a headless panel with specific dimensions
    pub fn new_with_size(width: u32, height: u32) -> Result<Self, DisplayError> {
        let config = PanelConfig {
            rows: Some(height),
            cols: Some(width),
            chain_length: Some(1),
            parallel: Some(1),
            ..Default::default()
        };
        Self::new(&config)
    }

    #[cfg(test)]
    /// What is on the panel right now
    pub fn front(&self) -> &Surface {
        &self.front
    }

    #[cfg(test)]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn write_snapshot(&self, path: &Path) {
        // write-then-rename so readers never see a torn image
        let tmp = path.with_extension("ppm.tmp");
        let result = fs::write(&tmp, self.front.to_ppm()).and_then(|_| fs::rename(&tmp, path));
        if let Err(e) = result {
            warn!("Snapshot to {} failed: {}", path.display(), e);
        }
    }
}

impl PanelDriver for HeadlessPanel {
    fn capabilities(&self) -> &PanelCapabilities {
        &self.capabilities
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        self.front.clear();
        if let Some(path) = self.snapshot.as_ref() {
            info!("Headless panel {}x{}, snapshots to {} every {:?}",
                self.capabilities.width, self.capabilities.height,
                path.display(), self.pacer.interval());
        } else {
            info!("Headless panel {}x{}", self.capabilities.width, self.capabilities.height);
        }
        Ok(())
    }

    fn create_surface(&mut self) -> Result<Surface, DisplayError> {
        Ok(self
            .spare
            .take()
            .unwrap_or_else(|| Surface::new(self.capabilities.width, self.capabilities.height)))
    }

    fn present(&mut self, mut surface: Surface) -> Result<Surface, DisplayError> {
        check_surface(&self.capabilities, &surface)?;
        std::mem::swap(&mut self.front, &mut surface);
        self.frames += 1;

        if self.frames % 600 == 0 {
            debug!("Headless panel presented {} frames", self.frames);
        }
        if let Some(path) = self.snapshot.clone() {
            if self.pacer.should_fire() {
                self.write_snapshot(&path);
            }
        }
        Ok(surface)
    }

    fn recycle(&mut self, surface: Surface) {
        if check_surface(&self.capabilities, &surface).is_ok() {
            self.spare = Some(surface);
        }
    }
}
