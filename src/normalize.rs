/*
 *  normalize.rs
 *
 *  LyMatrix - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Payload validation and default filling - one pass, canonical output
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

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::scenes::{
    Action, Alignment, Configuration, Effect, Options, Scene, SceneColor, SceneContent,
    SceneData, BASE_SCROLL_DELAY, DEFAULT_STATIC_TIME,
};

/// A payload that cannot become a configuration at all
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload must be a JSON object, got {0}")]
    Shape(&'static str),
}

/// Wire shape of a configuration payload, everything optional
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RawConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<RawOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RawData>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RawOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrollspeed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrolldelay: Option<f64>,
}

/// Scenes stay untyped here so one bad scene cannot sink the payload
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RawData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenes: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RawScene {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
}

/// Parse a text payload and produce a fully populated configuration.
///
/// Missing optional fields are filled, malformed scenes are dropped with a
/// warning. Only a payload that is not a JSON object fails.
pub fn normalize(raw: &str) -> Result<Configuration, ValidationError> {
    let value: Value = serde_json::from_str(raw)?;
    normalize_value(value)
}

/// Same as [`normalize`] for an already parsed document
pub fn normalize_value(value: Value) -> Result<Configuration, ValidationError> {
    if !value.is_object() {
        return Err(ValidationError::Shape(json_kind(&value)));
    }
    let raw: RawConfiguration = serde_json::from_value(value)?;

    let options = normalize_options(raw.options.unwrap_or_default());
    let data = raw.data.unwrap_or_default();

    let scenes: Vec<Scene> = data
        .scenes
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .filter_map(|(index, scene)| normalize_scene(index, scene))
        .collect();

    let images: BTreeMap<String, String> = data
        .images
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, payload)| match payload {
            Value::String(s) => Some((name, s)),
            other => {
                warn!("Dropping image '{}': expected a base64 string, got {}", name, json_kind(&other));
                None
            }
        })
        .collect();

    debug!(
        "Normalized configuration: {} scene(s), {} image(s), action {}",
        scenes.len(),
        images.len(),
        options.action.as_str()
    );

    Ok(Configuration {
        options,
        data: SceneData { scenes, images },
    })
}

fn normalize_options(raw: RawOptions) -> Options {
    let action = match raw.action.as_deref() {
        None | Some("loop") => Action::Loop,
        Some("once") => Action::Once,
        Some(other) => {
            warn!("Unknown action '{}', using loop", other);
            Action::Loop
        }
    };

    let scrollspeed = match raw.scrollspeed {
        None => 1.0,
        Some(speed) if speed.is_finite() && speed > 0.0 => speed,
        Some(speed) => {
            warn!("Ignoring scrollspeed {}, must be positive", speed);
            1.0
        }
    };

    let scrolldelay = match raw.scrolldelay {
        Some(delay) if delay.is_finite() && delay > 0.0 => delay,
        Some(delay) => {
            warn!("Ignoring scrolldelay {}, deriving from scrollspeed", delay);
            BASE_SCROLL_DELAY / scrollspeed
        }
        None => BASE_SCROLL_DELAY / scrollspeed,
    };

    Options { action, scrollspeed, scrolldelay }
}

/// The panel draws one row of text; line breaks and other control
/// characters become spaces so measured and drawn widths agree.
fn single_line(index: usize, text: String) -> String {
    if !text.chars().any(char::is_control) {
        return text;
    }
    debug!("Scene {}: replacing control characters in text", index);
    text.chars().map(|c| if c.is_control() { ' ' } else { c }).collect()
}

fn normalize_scene(index: usize, value: Value) -> Option<Scene> {
    let raw: RawScene = match serde_json::from_value(value) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Deleting scene {} as malformed: {}", index, e);
            return None;
        }
    };

    let (Some(kind), Some(value)) = (raw.kind, raw.value) else {
        warn!("Deleting scene {} due to missing required keys!", index);
        return None;
    };

    let content = match kind.as_str() {
        "string" => SceneContent::Text(single_line(index, value)),
        "image" => SceneContent::Image(value),
        _ => SceneContent::Unsupported { kind, value },
    };

    let effect = match raw.effect.as_deref() {
        None | Some("none") => Effect::None,
        Some("scroll") => Effect::Scroll,
        Some(other) => {
            warn!("Scene {}: unknown effect '{}', using none", index, other);
            Effect::None
        }
    };

    let display = match raw.display.as_deref() {
        None | Some("center") => Alignment::Center,
        Some("left") => Alignment::Left,
        Some("right") => Alignment::Right,
        Some(other) => {
            warn!("Scene {}: unknown display '{}', using center", index, other);
            Alignment::Center
        }
    };

    let time = match raw.time {
        Some(t) if t.is_finite() && t >= 0.0 => t,
        Some(t) => {
            warn!("Scene {}: time {} is not a duration, using 0", index, t);
            0.0
        }
        None if effect == Effect::Scroll => 0.0,
        None => DEFAULT_STATIC_TIME,
    };

    Some(Scene {
        content,
        color: normalize_color(index, raw.color.as_ref()),
        effect,
        display,
        time,
    })
}

// Absent color object -> yellow, present object -> each missing channel is 0.
fn normalize_color(index: usize, color: Option<&Value>) -> SceneColor {
    match color {
        None | Some(Value::Null) => SceneColor::YELLOW,
        Some(Value::Object(channels)) => {
            let channel = |name: &str| {
                channels
                    .get(name)
                    .and_then(Value::as_f64)
                    .map(|v| v.round().clamp(0.0, 255.0) as u8)
                    .unwrap_or(0)
            };
            SceneColor::new(channel("r"), channel("g"), channel("b"))
        }
        Some(other) => {
            warn!("Scene {}: color must be an object, got {}", index, json_kind(other));
            SceneColor::YELLOW
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
