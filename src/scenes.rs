/*
 *  scenes.rs
 *
 *  LyMatrix - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Scene configuration model - what the panel shows, fully defaulted
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

use std::collections::BTreeMap;
use std::time::Duration;

use embedded_graphics::pixelcolor::Rgb888;
use serde::{Serialize, Serializer};

use crate::normalize::{RawConfiguration, RawData, RawOptions, RawScene};

/// Base scroll delay in seconds at scrollspeed 1
pub const BASE_SCROLL_DELAY: f64 = 0.05;

/// Dwell for static scenes when the payload gives no `time`
pub const DEFAULT_STATIC_TIME: f64 = 5.0;

/// What the render loop does after the last scene of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    /// Wrap to the first scene and keep going
    #[default]
    Loop,
    /// Show every scene once, then idle until a new configuration arrives
    Once,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Loop => "loop",
            Action::Once => "once",
        }
    }
}

/// Global render options
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub action: Action,
    pub scrollspeed: f64,
    /// Seconds between scroll frames
    pub scrolldelay: f64,
}

impl Options {
    pub fn scroll_delay(&self) -> Duration {
        seconds(self.scrolldelay)
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            action: Action::Loop,
            scrollspeed: 1.0,
            scrolldelay: BASE_SCROLL_DELAY,
        }
    }
}

/// 24-bit scene color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl SceneColor {
    /// Used when a scene carries no color object at all
    pub const YELLOW: SceneColor = SceneColor { r: 255, g: 255, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_rgb888(&self) -> Rgb888 {
        Rgb888::new(self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Effect {
    Scroll,
    #[default]
    None,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Scroll => "scroll",
            Effect::None => "none",
        }
    }
}

/// Static horizontal placement for non-scrolling text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    Left,
    #[default]
    Center,
    Right,
}

impl Alignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
        }
    }
}

/// Closed set of scene payloads; unknown types are kept but never drawn
#[derive(Debug, Clone, PartialEq)]
pub enum SceneContent {
    Text(String),
    /// Key into `SceneData::images`
    Image(String),
    Unsupported { kind: String, value: String },
}

impl SceneContent {
    pub fn kind(&self) -> &str {
        match self {
            SceneContent::Text(_) => "string",
            SceneContent::Image(_) => "image",
            SceneContent::Unsupported { kind, .. } => kind,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            SceneContent::Text(v) | SceneContent::Image(v) => v,
            SceneContent::Unsupported { value, .. } => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub content: SceneContent,
    pub color: SceneColor,
    pub effect: Effect,
    pub display: Alignment,
    /// Seconds: static hold, or the mid-scroll dwell at center
    pub time: f64,
}

impl Scene {
    /// Scrolling text with the normalization defaults
    pub fn scrolling_text(text: &str) -> Self {
        Self {
            content: SceneContent::Text(text.to_string()),
            color: SceneColor::YELLOW,
            effect: Effect::Scroll,
            display: Alignment::Center,
            time: 0.0,
        }
    }

    pub fn hold(&self) -> Duration {
        seconds(self.time)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SceneData {
    pub scenes: Vec<Scene>,
    /// name -> base64 payload, optionally a data URL
    pub images: BTreeMap<String, String>,
}

/// The whole "what to show" document, replaced wholesale on every update
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Configuration {
    pub options: Options,
    pub data: SceneData,
}

impl Configuration {
    /// Shown from power-on until the first payload arrives
    pub fn welcome() -> Self {
        Self {
            options: Options::default(),
            data: SceneData {
                scenes: vec![Scene::scrolling_text("Welcome!")],
                images: BTreeMap::new(),
            },
        }
    }

    pub fn scene_count(&self) -> usize {
        self.data.scenes.len()
    }

    pub fn image(&self, name: &str) -> Option<&str> {
        self.data.images.get(name).map(String::as_str)
    }
}

/// Serializes back into the payload shape accepted by `normalize`
impl Serialize for Configuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RawConfiguration::from(self).serialize(serializer)
    }
}

impl From<&Configuration> for RawConfiguration {
    fn from(config: &Configuration) -> Self {
        RawConfiguration {
            options: Some(RawOptions {
                action: Some(config.options.action.as_str().to_string()),
                scrollspeed: Some(config.options.scrollspeed),
                scrolldelay: Some(config.options.scrolldelay),
            }),
            data: Some(RawData {
                scenes: Some(
                    config
                        .data
                        .scenes
                        .iter()
                        .filter_map(|scene| serde_json::to_value(RawScene::from(scene)).ok())
                        .collect(),
                ),
                images: Some(
                    config
                        .data
                        .images
                        .iter()
                        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                        .collect(),
                ),
            }),
        }
    }
}

impl From<&Scene> for RawScene {
    fn from(scene: &Scene) -> Self {
        RawScene {
            kind: Some(scene.content.kind().to_string()),
            value: Some(scene.content.value().to_string()),
            color: Some(serde_json::json!({
                "r": scene.color.r,
                "g": scene.color.g,
                "b": scene.color.b,
            })),
            effect: Some(scene.effect.as_str().to_string()),
            display: Some(scene.display.as_str().to_string()),
            time: Some(scene.time),
        }
    }
}

/// Seconds as a Duration; garbage maps to zero rather than panicking
pub(crate) fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}
