/*
 *  display/error.rs
 *
 *  LyMatrix - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Unified error types for the panel subsystem
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

use std::fmt;
use std::error::Error;

/// Panel driver failures. Any of these reaching the render loop is fatal.
#[derive(Debug)]
pub enum DisplayError {
    /// Hardware initialization failed
    InitializationFailed(String),

    /// Invalid panel geometry or settings
    InvalidConfiguration(String),

    /// A surface handed back for presenting does not match the panel
    SurfaceSizeMismatch { expected: (u32, u32), actual: (u32, u32) },

    /// Buffer swap failed
    PresentFailed(String),

    /// I/O error talking to the device
    Io(std::io::Error),
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayError::InitializationFailed(msg) =>
                write!(f, "Panel initialization failed: {}", msg),
            DisplayError::InvalidConfiguration(msg) =>
                write!(f, "Invalid panel configuration: {}", msg),
            DisplayError::SurfaceSizeMismatch { expected, actual } =>
                write!(f, "Surface size mismatch: expected {}x{}, got {}x{}",
                    expected.0, expected.1, actual.0, actual.1),
            DisplayError::PresentFailed(msg) =>
                write!(f, "Present failed: {}", msg),
            DisplayError::Io(err) =>
                write!(f, "Panel I/O error: {}", err),
        }
    }
}

impl Error for DisplayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DisplayError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DisplayError {
    fn from(err: std::io::Error) -> Self {
        DisplayError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = DisplayError::SurfaceSizeMismatch { expected: (128, 32), actual: (64, 32) };
        assert_eq!(err.to_string(), "Surface size mismatch: expected 128x32, got 64x32");

        let err: DisplayError = std::io::Error::new(std::io::ErrorKind::Other, "gone").into();
        assert!(err.source().is_some());
    }
}
