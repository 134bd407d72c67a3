/*
 *  display/traits.rs
 *
 *  LyMatrix - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Core trait definitions for panel driver abstraction
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

use crate::display::error::DisplayError;
use crate::display::surface::Surface;

/// Panel capabilities and metadata
#[derive(Debug, Clone)]
pub struct PanelCapabilities {
    /// Panel width in pixels (all chained modules)
    pub width: u32,

    /// Panel height in pixels (all parallel chains)
    pub height: u32,

    /// Driver name for logs
    pub name: String,
}

/// Minimal hardware abstraction - every panel driver implements this trait
///
/// Drawing happens on off-screen [`Surface`]s. A surface is handed to
/// [`PanelDriver::present`], which shows it at the next refresh and returns
/// the buffer that was on screen before, ready to be drawn again (double
/// buffering). Surfaces that are no longer needed go back through
/// [`PanelDriver::recycle`].
pub trait PanelDriver: Send {
    /// Returns the capabilities of this panel
    fn capabilities(&self) -> &PanelCapabilities;

    /// Returns the panel dimensions as (width, height)
    fn dimensions(&self) -> (u32, u32) {
        let caps = self.capabilities();
        (caps.width, caps.height)
    }

    /// Initialize the panel hardware
    fn init(&mut self) -> Result<(), DisplayError>;

    /// Allocate (or reuse) an off-screen drawing buffer sized to the panel
    fn create_surface(&mut self) -> Result<Surface, DisplayError>;

    /// Swap `surface` onto the panel, synchronized to refresh.
    ///
    /// Returns the next writable surface.
    fn present(&mut self, surface: Surface) -> Result<Surface, DisplayError>;

    /// Take back a surface the caller is done with
    fn recycle(&mut self, surface: Surface);
}

/// Boxed driver as built from startup settings
pub type BoxedDriver = Box<dyn PanelDriver>;

/// Reject a surface that was not allocated for this panel
pub(crate) fn check_surface(caps: &PanelCapabilities, surface: &Surface) -> Result<(), DisplayError> {
    let actual = (surface.width(), surface.height());
    if actual != (caps.width, caps.height) {
        return Err(DisplayError::SurfaceSizeMismatch {
            expected: (caps.width, caps.height),
            actual,
        });
    }
    Ok(())
}
