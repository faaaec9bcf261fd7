use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use std::future::Future;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use crate::transport::{Advertisement, BleTransport, WriteMode};
use crate::{Error, Result};

/// Address btleplug reports when the platform hides the MAC (CoreBluetooth)
const HIDDEN_ADDRESS: &str = "00:00:00:00:00:00";

/// Interval between peripheral polls while scanning
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Gets the default Bluetooth adapter
#[instrument(skip(manager))]
async fn get_central(manager: &Manager) -> Result<Adapter> {
    debug!("Getting default Bluetooth adapter");
    let adapters = manager.adapters().await?;
    match adapters.into_iter().next() {
        Some(adapter) => {
            debug!("Using Bluetooth adapter");
            Ok(adapter)
        }
        None => {
            error!("No Bluetooth adapters found");
            Err(Error::NoBluetoothAdapters)
        }
    }
}

/// Address used to talk about a peripheral: its MAC, or its platform id when the MAC is hidden
fn peripheral_address(peripheral: &Peripheral) -> String {
    let mac = peripheral.address().to_string();
    if mac == HIDDEN_ADDRESS {
        peripheral.id().to_string()
    } else {
        mac
    }
}

fn matches_address(peripheral: &Peripheral, addr: &str) -> bool {
    peripheral.address().to_string().eq_ignore_ascii_case(addr)
        || peripheral.id().to_string().eq_ignore_ascii_case(addr)
}

/// Stops a scan whatever `outcome` was; the outcome's error wins over the stop error
async fn stop_after<T, E, F, S>(outcome: std::result::Result<T, E>, stop: S) -> Result<T>
where
    Error: From<E> + From<F>,
    S: Future<Output = std::result::Result<(), F>>,
{
    let stopped = stop.await;
    let value = outcome?;
    stopped?;
    Ok(value)
}

/// Runs connection setup, closing the link again when setup fails
async fn close_on_error<T, E, S, C>(setup: S, close: C) -> Result<T>
where
    E: std::fmt::Display,
    S: Future<Output = Result<T>>,
    C: Future<Output = std::result::Result<(), E>>,
{
    match setup.await {
        Ok(value) => Ok(value),
        Err(e) => {
            error!("Connection setup failed: {}", e);
            if let Err(close_err) = close.await {
                warn!("Ignoring disconnect error after failed setup: {}", close_err);
            }
            Err(e)
        }
    }
}

/// [`BleTransport`] backed by the platform's first Bluetooth adapter
pub struct BtleTransport {
    central: Adapter,
    /// How long `connect` scans for a peripheral the adapter has not seen yet
    pub lookup_window: Duration,
}

impl BtleTransport {
    /// Opens the default adapter
    #[instrument]
    pub async fn new() -> Result<BtleTransport> {
        info!("Initializing BLE adapter");
        let manager = Manager::new().await?;
        let central = get_central(&manager).await?;
        Ok(BtleTransport {
            central,
            lookup_window: Duration::from_secs(10),
        })
    }

    /// Finds a peripheral by MAC address or platform id, scanning for it if needed
    #[instrument(skip(self))]
    async fn find_peripheral(&self, addr: &str) -> Result<Peripheral> {
        if let Some(p) = self
            .central
            .peripherals()
            .await?
            .into_iter()
            .find(|p| matches_address(p, addr))
        {
            debug!("Peripheral {} already known to the adapter", addr);
            return Ok(p);
        }

        info!("Scanning for {}...", addr);
        self.central.start_scan(ScanFilter::default()).await?;
        let found = stop_after(self.poll_for(addr).await, self.central.stop_scan()).await?;

        found.ok_or_else(|| {
            error!(
                "Device {} not found within {} seconds",
                addr,
                self.lookup_window.as_secs()
            );
            Error::NoCompatibleDevice(addr.to_string())
        })
    }

    /// Polls the adapter's peripherals until `addr` shows up or the lookup window closes
    async fn poll_for(&self, addr: &str) -> Result<Option<Peripheral>> {
        let start_time = std::time::Instant::now();
        while start_time.elapsed() < self.lookup_window {
            let found = self
                .central
                .peripherals()
                .await?
                .into_iter()
                .find(|p| matches_address(p, addr));
            if found.is_some() {
                return Ok(found);
            }

            let remaining = self.lookup_window.saturating_sub(start_time.elapsed());
            debug!(
                "Still scanning for a device... ({} seconds remaining)",
                remaining.as_secs()
            );
            time::sleep(POLL_INTERVAL).await;
        }
        Ok(None)
    }

    fn find_characteristic(peripheral: &Peripheral, uuid: Uuid) -> Result<Characteristic> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(Error::CharacteristicNotFound(uuid.to_string()))
    }
}

impl BleTransport for BtleTransport {
    type Connection = Peripheral;

    #[instrument(skip(self))]
    async fn scan_advertisements(&self, duration: Duration) -> Result<Vec<Advertisement>> {
        info!("Scanning for BLE devices for {:?}...", duration);
        self.central.start_scan(ScanFilter::default()).await?;

        let start_time = std::time::Instant::now();
        while start_time.elapsed() < duration {
            let remaining = duration.saturating_sub(start_time.elapsed());
            trace!("Scan window open, {:?} remaining", remaining);
            time::sleep(remaining.min(POLL_INTERVAL)).await;
        }

        let peripherals = self.central.peripherals().await;
        let peripherals = stop_after(peripherals, self.central.stop_scan()).await?;
        debug!("Found {} BLE peripherals", peripherals.len());

        let mut advertisements = Vec::new();
        for p in peripherals {
            match p.properties().await {
                Ok(Some(props)) => {
                    if let Some(name) = props.local_name {
                        let address = peripheral_address(&p);
                        debug!("Found device: {} {}", address, name);
                        advertisements.push(Advertisement { address, name });
                    }
                }
                Ok(None) => trace!("Peripheral without properties, skipping"),
                Err(e) => warn!("Could not read peripheral properties: {}", e),
            }
        }

        Ok(advertisements)
    }

    #[instrument(skip(self))]
    async fn connect(&self, address: &str) -> Result<Peripheral> {
        let peripheral = self.find_peripheral(address).await?;

        info!("Connecting to device...");
        let setup = async {
            if !peripheral.is_connected().await? {
                peripheral.connect().await?;
            }
            debug!("Discovering services...");
            peripheral.discover_services().await?;
            Ok::<(), Error>(())
        };
        close_on_error(setup, peripheral.disconnect()).await?;

        for c in peripheral.characteristics() {
            debug!(
                "Service {} char {} props {:?}",
                c.service_uuid, c.uuid, c.properties
            );
        }

        Ok(peripheral)
    }

    #[instrument(skip(self, connection, payload), fields(len = payload.len()))]
    async fn write_characteristic(
        &self,
        connection: &Peripheral,
        characteristic: Uuid,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<()> {
        let target = Self::find_characteristic(connection, characteristic)?;
        let write_type = match mode {
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
            WriteMode::WithResponse => WriteType::WithResponse,
        };

        trace!("Writing to {} ({})", characteristic, mode);
        connection
            .write(&target, payload, write_type)
            .await
            .map_err(|e| Error::BleError(e.to_string()))
    }

    #[instrument(skip(self, connection))]
    async fn disconnect(&self, connection: &Peripheral) -> Result<()> {
        connection.disconnect().await?;
        Ok(())
    }

    async fn is_connected(&self, connection: &Peripheral) -> bool {
        connection.is_connected().await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn failed_setup_closes_the_link() {
        let closed = Cell::new(false);
        let result: Result<()> = close_on_error(
            async { Err::<(), _>(Error::BleError("service discovery failed".to_string())) },
            async {
                closed.set(true);
                Err::<(), _>(Error::BleError("already gone".to_string()))
            },
        )
        .await;

        assert!(matches!(result, Err(Error::BleError(ref m)) if m.contains("service discovery")));
        assert!(closed.get());
    }

    #[tokio::test]
    async fn successful_setup_keeps_the_link() {
        let closed = Cell::new(false);
        let result = close_on_error(async { Ok::<_, Error>(7) }, async {
            closed.set(true);
            Ok::<(), Error>(())
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert!(!closed.get());
    }

    #[tokio::test]
    async fn scan_is_stopped_when_listing_fails() {
        let stopped = Cell::new(false);
        let result: Result<Vec<u8>> = stop_after(
            Err::<Vec<u8>, _>(Error::BleError("listing failed".to_string())),
            async {
                stopped.set(true);
                Ok::<(), Error>(())
            },
        )
        .await;

        assert!(matches!(result, Err(Error::BleError(ref m)) if m == "listing failed"));
        assert!(stopped.get());
    }

    #[tokio::test]
    async fn stop_error_surfaces_after_a_good_listing() {
        let result = stop_after(Ok::<_, Error>(vec![1u8]), async {
            Err(Error::BleError("stop failed".to_string()))
        })
        .await;

        assert!(matches!(result, Err(Error::BleError(ref m)) if m == "stop failed"));
    }
}
