// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Color selector of the light actuator.

use std::fmt;
use std::str::FromStr;

use crate::error::ValueError;

/// One of the colors the actuator can show.
///
/// The wire form (command payloads) and the actuator code are the same
/// single letter.
///
/// # Examples
///
/// ```
/// use kaa_endpoint::types::Color;
///
/// let green: Color = "g".parse().unwrap();
/// assert_eq!(green, Color::Green);
/// assert_eq!(green.code(), b'g');
/// assert!("x".parse::<Color>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Color {
    /// `r`
    #[default]
    Red,
    /// `g`
    Green,
    /// `b`
    Blue,
}

impl Color {
    /// Returns the selector letter.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Red => "r",
            Self::Green => "g",
            Self::Blue => "b",
        }
    }

    /// Returns the byte written to the actuator for this color.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Red => b'r',
            Self::Green => b'g',
            Self::Blue => b'b',
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Color {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" => Ok(Self::Red),
            "g" => Ok(Self::Green),
            "b" => Ok(Self::Blue),
            other => Err(ValueError::UnrecognizedColor(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_colors() {
        assert_eq!("r".parse::<Color>().unwrap(), Color::Red);
        assert_eq!("g".parse::<Color>().unwrap(), Color::Green);
        assert_eq!("b".parse::<Color>().unwrap(), Color::Blue);
    }

    #[test]
    fn parse_is_case_sensitive() {
        assert_eq!(
            "R".parse::<Color>(),
            Err(ValueError::UnrecognizedColor("R".to_string()))
        );
    }

    #[test]
    fn code_matches_selector() {
        for color in [Color::Red, Color::Green, Color::Blue] {
            assert_eq!(color.code(), color.as_str().as_bytes()[0]);
        }
    }

    #[test]
    fn default_is_red() {
        assert_eq!(Color::default(), Color::Red);
    }
}
