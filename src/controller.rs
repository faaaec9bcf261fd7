/*!
 # Controller

 Resolves which lamps a request is for and turns logical actions into
 deliveries. Used by both binaries.
*/

use futures::future::join_all;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::command::{
    encode_brightness, encode_color, encode_color_with_brightness, encode_on_off, ColorValue,
    Command,
};
use crate::discovery::{self, DiscoveredDevice};
use crate::registry::{self, DeviceProfile};
use crate::transport::BleTransport;
use crate::writer::{WriteConfig, WriteEngine};
use crate::{Error, Result};

/// A lamp a request will be delivered to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub address: String,
    /// Advertised name, or the requested prefix when the address was given directly
    pub label: String,
    pub profile: &'static DeviceProfile,
}

impl From<DiscoveredDevice> for Target {
    fn from(device: DiscoveredDevice) -> Self {
        Target {
            address: device.address,
            label: device.advertised_name,
            profile: device.profile,
        }
    }
}

/// A logical request for a lamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Power on (`true`) or off
    Power(bool),
    /// Power on, then set a color with an optional floor-lamp brightness
    Color(ColorValue, Option<i32>),
    /// Power on, then set the floor-lamp brightness
    Brightness(i32),
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Power(true) => write!(f, "ON"),
            Action::Power(false) => write!(f, "OFF"),
            Action::Color(color, None) => write!(f, "color ({})", color),
            Action::Color(color, Some(level)) => {
                write!(f, "color ({}) at brightness {}", color, level)
            }
            Action::Brightness(level) => write!(f, "brightness {}", level),
        }
    }
}

impl Action {
    /// Payloads for `profile`, in sending order
    pub fn commands(&self, profile: &DeviceProfile) -> Result<Vec<Command>> {
        let class = profile.device_class;
        Ok(match *self {
            Action::Power(on) => vec![encode_on_off(on)],
            Action::Color(color, None) => vec![encode_on_off(true), encode_color(color, class)],
            Action::Color(color, Some(level)) => vec![
                encode_on_off(true),
                encode_color_with_brightness(color, level, class)?,
            ],
            Action::Brightness(level) => {
                vec![encode_on_off(true), encode_brightness(level, class)?]
            }
        })
    }
}

/// High-level lamp control over a [`BleTransport`]
pub struct LedController<T> {
    engine: WriteEngine<T>,
}

impl<T: BleTransport> LedController<T> {
    pub fn new(transport: T, config: WriteConfig) -> Self {
        Self {
            engine: WriteEngine::new(transport, config),
        }
    }

    pub fn engine(&self) -> &WriteEngine<T> {
        &self.engine
    }

    /// Scans for every known lamp
    pub async fn discover(&self, window: Duration) -> Result<Vec<DiscoveredDevice>> {
        discovery::scan(self.engine.transport(), window).await
    }

    /// Works out which lamps a request is for
    ///
    /// # Arguments
    ///
    /// * `prefix` - Model prefix, e.g. `KS03~`
    /// * `address` - Explicit address; skips the scan
    /// * `all` - Every lamp of the prefix's model (both `-` and `~` variants)
    /// * `window` - Scan window when a scan is needed
    #[instrument(skip(self))]
    pub async fn resolve_targets(
        &self,
        prefix: &str,
        address: Option<&str>,
        all: bool,
        window: Duration,
    ) -> Result<Vec<Target>> {
        let profile = registry::lookup(prefix)?;

        if all {
            if address.is_some() {
                warn!("Ignoring explicit address, sending to all matching devices");
            }
            let stem = profile.model_stem();
            let mut targets: Vec<Target> = Vec::new();
            for device in self.discover(window).await? {
                if device.advertised_name.starts_with(stem)
                    && !targets.iter().any(|t| t.address == device.address)
                {
                    targets.push(device.into());
                }
            }
            if targets.is_empty() {
                return Err(Error::NoCompatibleDevice(stem.to_string()));
            }
            info!("Found {} {} device(s)", targets.len(), stem);
            return Ok(targets);
        }

        if let Some(address) = address {
            debug!("Using explicit address {}, skipping scan", address);
            return Ok(vec![Target {
                address: address.to_string(),
                label: profile.name_prefix.to_string(),
                profile,
            }]);
        }

        self.discover(window)
            .await?
            .into_iter()
            .find(|d| d.profile.name_prefix == profile.name_prefix)
            .map(|d| vec![d.into()])
            .ok_or_else(|| Error::NoCompatibleDevice(prefix.to_string()))
    }

    /// Sends `commands` over one connection
    pub async fn send(&self, target: &Target, commands: &[Command]) -> Result<()> {
        for cmd in commands {
            debug!("{} -> {}: {}", cmd.label(), target.address, cmd.to_hex());
        }
        let payloads: Vec<&[u8]> = commands.iter().map(Command::bytes).collect();
        self.engine
            .deliver_sequence(
                &target.address,
                target.profile.service_short_code,
                target.profile.write_short_code,
                &payloads,
            )
            .await
    }

    /// Carries out `action` on one lamp; encoding errors surface before connecting
    #[instrument(skip(self, target), fields(address = %target.address))]
    pub async fn apply(&self, target: &Target, action: &Action) -> Result<()> {
        let commands = action.commands(target.profile)?;
        self.send(target, &commands).await?;
        info!("Sent {} to {} ({})", action, target.address, target.label);
        Ok(())
    }

    /// Carries out `action` on every target concurrently, one result per target
    pub async fn apply_all(&self, targets: &[Target], action: &Action) -> Vec<Result<()>> {
        join_all(targets.iter().map(|t| self.apply(t, action))).await
    }

    /// Turns a lamp on or off
    pub async fn power(&self, target: &Target, on: bool) -> Result<()> {
        self.apply(target, &Action::Power(on)).await
    }

    /// Powers a lamp on and sets its color
    pub async fn color(
        &self,
        target: &Target,
        color: ColorValue,
        brightness: Option<i32>,
    ) -> Result<()> {
        self.apply(target, &Action::Color(color, brightness)).await
    }

    /// Powers a floor lamp on and sets its brightness
    pub async fn brightness(&self, target: &Target, level: i32) -> Result<()> {
        self.apply(target, &Action::Brightness(level)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::lookup;

    #[test]
    fn color_is_preceded_by_power_on() {
        let floor = lookup("KS03~").unwrap();
        let commands = Action::Color(ColorValue::rgb(255, 0, 0), None)
            .commands(floor)
            .unwrap();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0], encode_on_off(true));
        assert_eq!(commands[1].to_hex(), "5A0001FF000000FF00A5");
    }

    #[test]
    fn ceiling_brightness_is_rejected_before_sending() {
        let ceiling = lookup("KS03-").unwrap();
        assert!(matches!(
            Action::Brightness(128).commands(ceiling),
            Err(Error::UnsupportedOperation(_))
        ));
        assert!(matches!(
            Action::Color(ColorValue::rgb(1, 2, 3), Some(10)).commands(ceiling),
            Err(Error::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn power_is_a_single_command() {
        let ceiling = lookup("KS01-").unwrap();
        let commands = Action::Power(false).commands(ceiling).unwrap();
        assert_eq!(commands, vec![encode_on_off(false)]);
    }

    #[test]
    fn action_labels() {
        assert_eq!(Action::Power(true).to_string(), "ON");
        assert_eq!(
            Action::Color(ColorValue::rgb(1, 2, 3), None).to_string(),
            "color (R:1 G:2 B:3)"
        );
        assert_eq!(Action::Brightness(64).to_string(), "brightness 64");
    }
}
