/*!
 # Command encoding

 Pure builders for the fixed-layout payloads understood by KS lamps.
 Ceiling fixtures use `7E .. EF` frames, floor lamps `5A .. A5` frames;
 power toggling is shared by both.
*/

use serde::{Deserialize, Serialize};

use crate::registry::DeviceClass;
use crate::{Error, Result};

const POWER_ON: [u8; 4] = [0x5b, 0xf0, 0x01, 0xb5];
const POWER_OFF: [u8; 4] = [0x5b, 0x0f, 0x01, 0xb5];

const CEILING_COLOR_HEADER: [u8; 4] = [0x7e, 0x07, 0x05, 0x03];
const CEILING_COLOR_TRAILER: [u8; 2] = [0x00, 0xef];

const FLOOR_COLOR_HEADER: [u8; 3] = [0x5a, 0x00, 0x01];
const FLOOR_WHITE_HEADER: [u8; 3] = [0x5a, 0x00, 0x02];
const FLOOR_TRAILER: u8 = 0xa5;

/// Full-scale brightness used when a floor color is sent without one
pub const FULL_BRIGHTNESS: u8 = 0xff;

/// An RGB color with every component in 0..=255
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorValue {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ColorValue {
    /// Builds a color from unchecked integers, rejecting any component outside 0..=255
    pub fn new(r: i32, g: i32, b: i32) -> Result<Self> {
        Ok(Self {
            r: component("red", r)?,
            g: component("green", g)?,
            b: component("blue", b)?,
        })
    }

    /// Same as [`ColorValue::new`] for already-narrowed values
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl std::fmt::Display for ColorValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R:{} G:{} B:{}", self.r, self.g, self.b)
    }
}

fn component(name: &str, value: i32) -> Result<u8> {
    u8::try_from(value).map_err(|_| {
        Error::InvalidParameter(format!("{} value {} out of range (0..255)", name, value))
    })
}

/// A ready-to-send payload with a label for logs and user feedback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    bytes: Vec<u8>,
    label: String,
}

impl Command {
    fn new(bytes: impl Into<Vec<u8>>, label: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            label: label.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Upper-case hex rendering, e.g. `5BF001B5`
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{:02X}", b)).collect()
    }
}

/// Builds the power toggle, identical for every device class
pub fn encode_on_off(is_on: bool) -> Command {
    if is_on {
        Command::new(POWER_ON, "ON")
    } else {
        Command::new(POWER_OFF, "OFF")
    }
}

/// Builds a color command; floor lamps get full-scale brightness
pub fn encode_color(color: ColorValue, device_class: DeviceClass) -> Command {
    match device_class {
        DeviceClass::Ceiling => {
            let mut bytes = Vec::with_capacity(9);
            bytes.extend_from_slice(&CEILING_COLOR_HEADER);
            bytes.extend_from_slice(&[color.r, color.g, color.b]);
            bytes.extend_from_slice(&CEILING_COLOR_TRAILER);
            Command::new(bytes, format!("color ({})", color))
        }
        DeviceClass::Floor => floor_color(color, FULL_BRIGHTNESS),
    }
}

/// Builds a floor-lamp color command carrying an explicit brightness
///
/// # Arguments
///
/// * `color` - Target color
/// * `brightness` - Brightness level (0-255)
/// * `device_class` - Must be [`DeviceClass::Floor`]
pub fn encode_color_with_brightness(
    color: ColorValue,
    brightness: i32,
    device_class: DeviceClass,
) -> Result<Command> {
    if device_class == DeviceClass::Ceiling {
        return Err(Error::UnsupportedOperation(
            "ceiling lamps have no brightness byte in their color command".to_string(),
        ));
    }
    Ok(floor_color(color, component("brightness", brightness)?))
}

/// Builds a standalone brightness command
///
/// Only floor lamps have one. The frame carries zeroed RGB fields, which some
/// firmware renders as white mode and some as black.
///
/// # Arguments
///
/// * `level` - Brightness level (0-255)
/// * `device_class` - Command layout family of the target
pub fn encode_brightness(level: i32, device_class: DeviceClass) -> Result<Command> {
    if device_class == DeviceClass::Ceiling {
        return Err(Error::UnsupportedOperation(
            "ceiling lamps have no standalone brightness command".to_string(),
        ));
    }

    let level = component("brightness", level)?;
    let mut bytes = Vec::with_capacity(10);
    bytes.extend_from_slice(&FLOOR_WHITE_HEADER);
    bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, level, 0x00, FLOOR_TRAILER]);
    Ok(Command::new(bytes, format!("brightness {}", level)))
}

fn floor_color(color: ColorValue, brightness: u8) -> Command {
    let mut bytes = Vec::with_capacity(10);
    bytes.extend_from_slice(&FLOOR_COLOR_HEADER);
    bytes.extend_from_slice(&[color.r, color.g, color.b, 0x00, brightness, 0x00, FLOOR_TRAILER]);
    Command::new(bytes, format!("color ({}) at brightness {}", color, brightness))
}
