/*!
 # BLE capability

 The narrow slice of a host BLE stack the controller needs: scan for
 advertisements, connect, write a characteristic by UUID, disconnect.
 [`crate::device::BtleTransport`] implements it on btleplug.
*/

use std::time::Duration;
use uuid::Uuid;

use crate::Result;

/// A named advertisement seen during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// MAC address, or the platform identifier where the MAC is hidden
    pub address: String,
    /// Advertised local name
    pub name: String,
}

/// GATT write mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Write command, no acknowledgement
    WithoutResponse,
    /// Write request, acknowledged by the device
    WithResponse,
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteMode::WithoutResponse => write!(f, "no response"),
            WriteMode::WithResponse => write!(f, "with response"),
        }
    }
}

/// Host BLE stack operations
#[allow(async_fn_in_trait)]
pub trait BleTransport {
    /// Handle to an open connection
    type Connection;

    /// Scans for `duration` and returns every named advertisement seen
    async fn scan_advertisements(&self, duration: Duration) -> Result<Vec<Advertisement>>;

    /// Opens a connection to `address`
    async fn connect(&self, address: &str) -> Result<Self::Connection>;

    /// Writes `payload` to the characteristic identified by `characteristic`
    async fn write_characteristic(
        &self,
        connection: &Self::Connection,
        characteristic: Uuid,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<()>;

    /// Closes the connection
    async fn disconnect(&self, connection: &Self::Connection) -> Result<()>;

    /// Whether the link is still up
    async fn is_connected(&self, connection: &Self::Connection) -> bool;
}
