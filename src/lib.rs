/*!
 # KS Smart LED Bluetooth Controller Library

 A Rust library for controlling KS-series Bluetooth LE smart lamps.
 Supports the ceiling (KS01-, KS02-, KS03-, KS04-, ...) and floor (KS03~) product lines.

 ## Features

 * Device identification from the advertised name
 * Power on/off control
 * RGB color control
 * Brightness adjustment (floor lamps)
 * Write-mode and characteristic fallback for picky firmware
 * Color presets and device nicknames

 ## Example

 ```no_run
 use ks_led_controller::*;

 #[tokio::main]
 async fn main() -> Result<()> {
     let transport = BtleTransport::new().await?;
     let controller = LedController::new(transport, WriteConfig::default());

     // Find the first KS03~ lamp within 8 seconds
     let targets = controller
         .resolve_targets("KS03~", None, false, scan_window(8.0)?)
         .await?;

     controller.power(&targets[0], true).await?;
     controller
         .color(&targets[0], ColorValue::new(255, 147, 41)?, None)
         .await?;

     Ok(())
 }
 ```
*/

use thiserror::Error;

/// Custom error types for the KS LED controller library
#[derive(Error, Debug)]
pub enum Error {
    /// No Bluetooth adapters found
    #[error("No Bluetooth adapters found")]
    NoBluetoothAdapters,

    /// No compatible LED device found
    #[error("No compatible LED device found matching '{0}'")]
    NoCompatibleDevice(String),

    /// Out-of-range value, bad short code, unknown model prefix or bad scan window
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The device class has no such command
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Failed to find required BLE characteristic
    #[error("Could not find required BLE characteristic: {0}")]
    CharacteristicNotFound(String),

    /// The single connection attempt of a delivery failed
    #[error("Failed to connect to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    /// Every applicable write attempt failed
    #[error(
        "All write attempts to {address} failed: {}",
        writer::describe_attempts(.attempts)
    )]
    WriteFailed {
        address: String,
        attempts: Vec<WriteAttempt>,
    },

    /// BLE communication error
    #[error("BLE communication error: {0}")]
    BleError(String),

    /// Error from btleplug
    #[error(transparent)]
    BtlePlugError(#[from] btleplug::Error),

    /// Preset or nickname file could not be written
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Preset or nickname file could not be serialized
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod command;
pub mod controller;
pub mod device;
pub mod discovery;
pub mod registry;
pub mod store;
pub mod transport;
pub mod writer;

pub use command::{
    encode_brightness, encode_color, encode_color_with_brightness, encode_on_off, ColorValue,
    Command,
};
pub use controller::{Action, LedController, Target};
pub use device::BtleTransport;
pub use discovery::{scan, scan_window, DiscoveredDevice};
pub use registry::{
    alternate_characteristic, characteristic_uuid, lookup, resolve, DeviceClass, DeviceProfile,
    DEFAULT_PREFIX, PROFILES,
};
pub use store::{default_nicknames_path, default_presets_path, NicknameStore, PresetStore};
pub use transport::{Advertisement, BleTransport, WriteMode};
pub use writer::{DeliveryState, WriteAttempt, WriteConfig, WriteEngine};
