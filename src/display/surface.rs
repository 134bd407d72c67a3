/*
 *  display/surface.rs
 *
 *  LyMatrix - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Off-screen RGB drawing surface and its scoped lease
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

use core::convert::Infallible;
use std::ops::{Deref, DerefMut};

use embedded_graphics::mono_font::ascii::{FONT_10X20, FONT_6X10, FONT_8X13, FONT_9X15};
use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use embedded_graphics::text::renderer::TextRenderer;
use embedded_graphics::text::{Baseline, Text};

use crate::display::error::DisplayError;
use crate::display::traits::PanelDriver;
use crate::imaging::PixelBuffer;

/// Font names accepted in the startup settings
pub const FONT_NAMES: [&str; 4] = ["6x10", "8x13", "9x15", "10x20"];

pub fn font_by_name(name: &str) -> Option<&'static MonoFont<'static>> {
    match name {
        "6x10" => Some(&FONT_6X10),
        "8x13" => Some(&FONT_8X13),
        "9x15" => Some(&FONT_9X15),
        "10x20" => Some(&FONT_10X20),
        _ => None,
    }
}

/// A runtime-sized RGB framebuffer, one per buffer of the double-buffered panel
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    buf: Vec<Rgb888>,
    w: u32,
    h: u32,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: vec![Rgb888::BLACK; (width as usize) * (height as usize)],
            w: width,
            h: height,
        }
    }

    /// Zero-sized placeholder, used while a real surface is out being presented
    pub(crate) fn empty() -> Self {
        Self { buf: Vec::new(), w: 0, h: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn width(&self) -> u32 { self.w }
    pub fn height(&self) -> u32 { self.h }

    pub fn as_slice(&self) -> &[Rgb888] { &self.buf }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb888> {
        if x >= self.w || y >= self.h {
            return None;
        }
        self.buf.get((y * self.w + x) as usize).copied()
    }

    /// Blank to black
    pub fn clear(&mut self) {
        self.buf.fill(Rgb888::BLACK);
    }

    /// Width in pixels `text` would occupy in `font`
    pub fn measure_text(font: &MonoFont<'_>, text: &str) -> i32 {
        let style = MonoTextStyle::new(font, Rgb888::WHITE);
        style
            .measure_string(text, Point::zero(), Baseline::Middle)
            .next_position
            .x
    }

    /// Draw `text` with its left edge at `x` and vertical middle at `y`.
    ///
    /// Returns the drawn width in pixels. Anything off the surface is clipped.
    pub fn draw_text(&mut self, font: &MonoFont<'_>, x: i32, y: i32, color: Rgb888, text: &str) -> i32 {
        let style = MonoTextStyle::new(font, color);
        let Ok(next) = Text::with_baseline(text, Point::new(x, y), style, Baseline::Middle).draw(self);
        next.x - x
    }

    /// Blit a decoded image with its left edge at `x`, top row at 0
    pub fn draw_image(&mut self, x: i32, image: &PixelBuffer) {
        let Ok(()) = self.draw_iter(image.pixels_at(Point::new(x, 0)));
    }

    /// Binary PPM (P6) rendering of the buffer, for snapshots
    pub fn to_ppm(&self) -> Vec<u8> {
        let header = format!("P6\n{} {}\n255\n", self.w, self.h);
        let mut out = Vec::with_capacity(header.len() + self.buf.len() * 3);
        out.extend_from_slice(header.as_bytes());
        for px in &self.buf {
            out.extend_from_slice(&[px.r(), px.g(), px.b()]);
        }
        out
    }

    #[inline]
    fn idx(&self, p: Point) -> Option<usize> {
        if p.x >= 0 && p.y >= 0 {
            let (x, y) = (p.x as u32, p.y as u32);
            if x < self.w && y < self.h {
                return Some((y * self.w + x) as usize);
            }
        }
        None
    }
}

impl OriginDimensions for Surface {
    fn size(&self) -> Size {
        Size::new(self.w, self.h)
    }
}

impl DrawTarget for Surface {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(p, c) in pixels {
            if let Some(i) = self.idx(p) {
                self.buf[i] = c;
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.buf.fill(color);
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let area = area.intersection(&self.bounding_box());
        if let Some(bottom_right) = area.bottom_right() {
            for y in area.top_left.y..=bottom_right.y {
                let row = (y as u32 * self.w) as usize;
                let start = row + area.top_left.x as usize;
                let end = row + bottom_right.x as usize + 1;
                self.buf[start..end].fill(color);
            }
        }
        Ok(())
    }
}

/// A surface borrowed from a driver for the length of one scene.
///
/// Dropping the lease hands the surface back to the driver, whichever way the
/// scene ends. Derefs to the surface for drawing.
pub struct SurfaceLease<'a> {
    driver: &'a mut dyn PanelDriver,
    surface: Surface,
}

impl<'a> SurfaceLease<'a> {
    pub fn acquire(driver: &'a mut dyn PanelDriver) -> Result<Self, DisplayError> {
        let surface = driver.create_surface()?;
        Ok(Self { driver, surface })
    }

    /// Show what has been drawn; the lease then holds the next back buffer
    pub fn present(&mut self) -> Result<(), DisplayError> {
        let back = std::mem::replace(&mut self.surface, Surface::empty());
        self.surface = self.driver.present(back)?;
        Ok(())
    }
}

impl Deref for SurfaceLease<'_> {
    type Target = Surface;

    fn deref(&self) -> &Surface {
        &self.surface
    }
}

impl DerefMut for SurfaceLease<'_> {
    fn deref_mut(&mut self) -> &mut Surface {
        &mut self.surface
    }
}

impl Drop for SurfaceLease<'_> {
    fn drop(&mut self) {
        // empty after a failed present: the driver kept the buffer
        if !self.surface.is_empty() {
            let surface = std::mem::replace(&mut self.surface, Surface::empty());
            self.driver.recycle(surface);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::drivers::mock::MockPanel;

    const RED: Rgb888 = Rgb888::new(255, 0, 0);

    #[test]
    fn test_measure_matches_draw() {
        let mut surface = Surface::new(128, 32);
        let measured = Surface::measure_text(&FONT_10X20, "ABCD");
        let drawn = surface.draw_text(&FONT_10X20, 0, 16, RED, "ABCD");
        assert_eq!(measured, 40);
        assert_eq!(drawn, 40);
        assert!(surface.as_slice().iter().any(|&p| p == RED));
    }

    #[test]
    fn test_text_off_surface_is_clipped() {
        let mut surface = Surface::new(64, 32);
        let drawn = surface.draw_text(&FONT_6X10, 64, 16, RED, "Hi");
        assert_eq!(drawn, 12);
        assert!(surface.as_slice().iter().all(|&p| p == Rgb888::BLACK));
    }

    #[test]
    fn test_draw_image_clips_negative_offset() {
        let mut surface = Surface::new(4, 2);
        let image = PixelBuffer::new(6, 1, vec![RED; 6]).unwrap();
        surface.draw_image(-1, &image);
        assert_eq!(surface.pixel(0, 0), Some(RED));
        assert_eq!(surface.pixel(3, 0), Some(RED));
        assert_eq!(surface.pixel(0, 1), Some(Rgb888::BLACK));
    }

    #[test]
    fn test_clear() {
        let mut surface = Surface::new(8, 8);
        surface.draw_text(&FONT_6X10, 0, 4, RED, "X");
        surface.clear();
        assert!(surface.as_slice().iter().all(|&p| p == Rgb888::BLACK));
    }

    #[test]
    fn test_ppm_header() {
        let surface = Surface::new(2, 1);
        let ppm = surface.to_ppm();
        assert!(ppm.starts_with(b"P6\n2 1\n255\n"));
        assert_eq!(ppm.len(), 11 + 6);
    }

    #[test]
    fn test_lease_returns_surface_on_drop() {
        let mut panel = MockPanel::new(16, 8);
        let state = panel.state();
        {
            let mut lease = SurfaceLease::acquire(&mut panel).unwrap();
            lease.clear();
            lease.present().unwrap();
        }
        let state = state.lock().unwrap();
        assert_eq!(state.created, 1);
        assert_eq!(state.recycled, 1);
        assert_eq!(state.presents.len(), 1);
    }

    #[test]
    fn test_lease_after_failed_present() {
        let mut panel = MockPanel::new(16, 8);
        let state = panel.state();
        state.lock().unwrap().simulate_present_failure = true;
        {
            let mut lease = SurfaceLease::acquire(&mut panel).unwrap();
            assert!(lease.present().is_err());
        }
        assert_eq!(state.lock().unwrap().recycled, 0);
    }
}
