/*
 *  imaging.rs
 *
 *  LyMatrix - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Image payloads: data-URL / base64 text to RGB pixels
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

//! Image scenes reference an entry of `data.images`, a base64 PNG that may be
//! wrapped in a `data:image/png;base64,` URL. Decoding uses `tiny-skia`; the
//! result is composited over black since the panel has no alpha.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use log::debug;
use thiserror::Error;
use tiny_skia::Pixmap;

use crate::scenes::Configuration;

#[derive(Debug, Error)]
pub enum ImageError {
    /// The scene names an image the configuration does not carry
    #[error("image '{0}' is not defined")]
    Lookup(String),
    /// The payload is not base64, or not a decodable image
    #[error("image '{name}' could not be decoded: {reason}")]
    Decode { name: String, reason: String },
}

/// Decoded image, row-major RGB
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<Rgb888>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, pixels: Vec<Rgb888>) -> Option<Self> {
        if pixels.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self { width, height, pixels })
    }

    pub fn width(&self) -> u32 { self.width }
    pub fn height(&self) -> u32 { self.height }

    /// Pixels positioned with the top-left corner at `origin`
    pub fn pixels_at(&self, origin: Point) -> impl Iterator<Item = Pixel<Rgb888>> + '_ {
        let w = self.width.max(1) as usize;
        self.pixels.iter().enumerate().map(move |(i, &c)| {
            let p = Point::new((i % w) as i32, (i / w) as i32);
            Pixel(origin + p, c)
        })
    }
}

/// Drop a `data:<mime>;base64,` prefix if there is one
pub fn strip_data_url(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((prefix, rest)) if prefix.trim_start().starts_with("data:") => rest,
        _ => payload,
    }
}

/// Resolve `name` against the configuration's images and decode it
pub fn load(config: &Configuration, name: &str) -> Result<PixelBuffer, ImageError> {
    let payload = config
        .image(name)
        .ok_or_else(|| ImageError::Lookup(name.to_string()))?;
    decode(name, payload)
}

/// Decode one image payload; `name` is only used for error reporting
pub fn decode(name: &str, payload: &str) -> Result<PixelBuffer, ImageError> {
    let encoded: String = strip_data_url(payload)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let bytes = STANDARD.decode(encoded.as_bytes()).map_err(|e| ImageError::Decode {
        name: name.to_string(),
        reason: format!("base64: {}", e),
    })?;

    let pixmap = Pixmap::decode_png(&bytes).map_err(|e| ImageError::Decode {
        name: name.to_string(),
        reason: format!("png: {}", e),
    })?;

    // premultiplied channels are already the color over black
    let pixels = pixmap
        .pixels()
        .iter()
        .map(|p| Rgb888::new(p.red(), p.green(), p.blue()))
        .collect();

    debug!("Decoded image '{}' {}x{}", name, pixmap.width(), pixmap.height());

    PixelBuffer::new(pixmap.width(), pixmap.height(), pixels).ok_or_else(|| ImageError::Decode {
        name: name.to_string(),
        reason: "pixel count does not match dimensions".to_string(),
    })
}
