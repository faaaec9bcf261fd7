/*!
 # Discovery

 Bounded scans filtered down to the lamps the registry knows.
*/

use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::registry::{self, DeviceProfile};
use crate::transport::BleTransport;
use crate::{Error, Result};

/// A lamp seen during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Platform BLE address or identifier
    pub address: String,
    /// Name the device advertised
    pub advertised_name: String,
    /// Profile the name resolved to
    pub profile: &'static DeviceProfile,
}

/// Converts a user-supplied scan timeout in seconds into a scan window
pub fn scan_window(seconds: f64) -> Result<Duration> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(Error::InvalidParameter(format!(
            "scan timeout must be a positive number of seconds, got {}",
            seconds
        )));
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| {
        Error::InvalidParameter(format!("scan timeout of {} seconds is unusable: {}", seconds, e))
    })
}

/// Scans for `duration` and returns the advertisements that resolve to a known profile,
/// in arrival order. An empty result is not an error.
#[instrument(skip(transport))]
pub async fn scan<T: BleTransport>(
    transport: &T,
    duration: Duration,
) -> Result<Vec<DiscoveredDevice>> {
    if duration.is_zero() {
        return Err(Error::InvalidParameter(
            "scan duration must be greater than zero".to_string(),
        ));
    }

    let advertisements = transport.scan_advertisements(duration).await?;
    let seen = advertisements.len();

    let devices: Vec<DiscoveredDevice> = advertisements
        .into_iter()
        .filter_map(|ad| match registry::resolve(&ad.name) {
            Some(profile) => Some(DiscoveredDevice {
                address: ad.address,
                advertised_name: ad.name,
                profile,
            }),
            None => {
                debug!("Skipping unsupported device: {} ({})", ad.name, ad.address);
                None
            }
        })
        .collect();

    info!(
        "Found {} compatible device(s) among {} advertisement(s)",
        devices.len(),
        seen
    );
    Ok(devices)
}
