/*
 *  embed.rs
 *
 *  LyMatrix - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Image files to data.images entries, GIFs as one PNG per frame
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

//! The server only decodes PNG. Anything else `image` can read is
//! transcoded before it goes into the payload, and a GIF is split into
//! `NAME_0..NAME_N` so each frame can be shown as its own image scene.

use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, ImageFormat};
use log::debug;
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Hold for GIF frames that carry no delay of their own
pub const DEFAULT_FRAME_SECS: f64 = 0.1;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("expected NAME=PATH, got '{0}'")]
    Entry(String),
    #[error("{0}")]
    Payload(&'static str),
    #[error("image '{name}': unrecognised format")]
    UnknownFormat { name: String },
    #[error("image '{name}': {source}")]
    Image {
        name: String,
        #[source]
        source: image::ImageError,
    },
    #[error("image '{name}': GIF has no frames")]
    NoFrames { name: String },
}

/// One GIF frame as PNG, with how long it should stay up
#[derive(Debug, Clone, PartialEq)]
pub struct GifFrame {
    pub png: Vec<u8>,
    pub secs: f64,
}

/// Split a `NAME=PATH` command line entry
pub fn split_entry(entry: &str) -> Result<(&str, &str), EmbedError> {
    match entry.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => Ok((name, path)),
        _ => Err(EmbedError::Entry(entry.to_string())),
    }
}

pub fn data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// PNG bytes for `bytes`: a PNG that decodes passes through untouched, other
/// readable formats are re-encoded (first frame only for animations).
pub fn to_png(name: &str, bytes: &[u8]) -> Result<Vec<u8>, EmbedError> {
    let format = image::guess_format(bytes).map_err(|_| EmbedError::UnknownFormat { name: name.to_string() })?;
    let decoded = image::load_from_memory_with_format(bytes, format).map_err(|source| EmbedError::Image {
        name: name.to_string(),
        source,
    })?;
    if format == ImageFormat::Png {
        return Ok(bytes.to_vec());
    }
    debug!("Transcoding image '{}' from {:?} to PNG", name, format);
    encode_png(name, DynamicImage::ImageRgb8(decoded.to_rgb8()))
}

/// Every frame of a GIF as RGB PNG
pub fn gif_frames(name: &str, bytes: &[u8]) -> Result<Vec<GifFrame>, EmbedError> {
    let image_err = |source| EmbedError::Image { name: name.to_string(), source };

    let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(image_err)?;
    let frames = decoder.into_frames().collect_frames().map_err(image_err)?;
    if frames.is_empty() {
        return Err(EmbedError::NoFrames { name: name.to_string() });
    }

    frames
        .into_iter()
        .map(|frame| {
            let (numer, denom) = frame.delay().numer_denom_ms();
            let ms = if denom == 0 { 0.0 } else { f64::from(numer) / f64::from(denom) };
            let secs = if ms > 0.0 { ms / 1000.0 } else { DEFAULT_FRAME_SECS };
            let rgb = DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8();
            Ok(GifFrame { png: encode_png(name, DynamicImage::ImageRgb8(rgb))?, secs })
        })
        .collect()
}

fn encode_png(name: &str, image: DynamicImage) -> Result<Vec<u8>, EmbedError> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|source| EmbedError::Image { name: name.to_string(), source })?;
    Ok(out.into_inner())
}

fn data_object(payload: &mut Value) -> Result<&mut Map<String, Value>, EmbedError> {
    payload
        .as_object_mut()
        .ok_or(EmbedError::Payload("scene configuration must be a JSON object"))?
        .entry("data")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or(EmbedError::Payload("'data' must be a JSON object"))
}

fn images_table(payload: &mut Value) -> Result<&mut Map<String, Value>, EmbedError> {
    data_object(payload)?
        .entry("images")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or(EmbedError::Payload("'data.images' must be a JSON object"))
}

/// Store `bytes` as `data.images[name]`
pub fn embed_image(payload: &mut Value, name: &str, bytes: &[u8]) -> Result<(), EmbedError> {
    let png = to_png(name, bytes)?;
    debug!("Embedding '{}' ({} bytes of PNG)", name, png.len());
    images_table(payload)?.insert(name.to_string(), Value::String(data_url(&png)));
    Ok(())
}

/// Store each GIF frame as `data.images[name_i]`. With `animate`, an image
/// scene per frame is appended to `data.scenes`, held for the frame delay.
///
/// Returns the number of frames.
pub fn embed_gif(payload: &mut Value, name: &str, bytes: &[u8], animate: bool) -> Result<usize, EmbedError> {
    let frames = gif_frames(name, bytes)?;

    let table = images_table(payload)?;
    for (i, frame) in frames.iter().enumerate() {
        table.insert(format!("{}_{}", name, i), Value::String(data_url(&frame.png)));
    }

    if animate {
        let scenes = data_object(payload)?
            .entry("scenes")
            .or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
            .ok_or(EmbedError::Payload("'data.scenes' must be a JSON array"))?;
        for (i, frame) in frames.iter().enumerate() {
            scenes.push(json!({"type": "image", "value": format!("{}_{}", name, i), "time": frame.secs}));
        }
    }
    debug!("Embedded {} frame(s) of '{}'", frames.len(), name);
    Ok(frames.len())
}
