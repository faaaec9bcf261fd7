/*!
 # Write engine

 Delivers payloads to one lamp over a single connection. KS firmware
 differs in which write mode and which characteristic it accepts, so every
 payload walks a fixed fallback plan and stops at the first write that
 succeeds:

 1. primary characteristic, write without response
 2. primary characteristic, write with response
 3. alternate characteristic (legacy alias, when one exists), without response
 4. alternate characteristic, with response

 The connection goes Disconnected → Connecting → Connected → Writing →
 Disconnecting → Disconnected. Disconnect is attempted on every path once a
 connection exists and its failure never changes the result.
*/

use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use crate::registry::{alternate_characteristic, characteristic_uuid};
use crate::transport::{BleTransport, WriteMode};
use crate::{Error, Result};

/// Timing knobs for a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteConfig {
    /// Wait after connecting before the first write; some firmware drops
    /// writes issued right after the link comes up
    pub connect_settle: Duration,
    /// Wait after the last successful write before disconnecting
    pub post_write_settle: Duration,
    /// Wait between payloads sharing one connection
    pub command_gap: Duration,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            connect_settle: Duration::from_millis(300),
            post_write_settle: Duration::from_millis(200),
            command_gap: Duration::from_millis(500),
        }
    }
}

impl WriteConfig {
    /// No waits at all, for simulated transports
    pub fn immediate() -> Self {
        Self {
            connect_settle: Duration::ZERO,
            post_write_settle: Duration::ZERO,
            command_gap: Duration::ZERO,
        }
    }
}

/// Connection lifecycle of a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Disconnected,
    Connecting,
    Connected,
    Writing,
    Disconnecting,
}

/// One step of the fallback plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWrite {
    /// Characteristic short code, upper case
    pub short_code: String,
    pub uuid: Uuid,
    pub mode: WriteMode,
}

/// A failed write, kept for the final diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAttempt {
    /// Characteristic short code, upper case
    pub characteristic: String,
    pub mode: WriteMode,
    pub error: String,
}

impl std::fmt::Display for WriteAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.characteristic, self.mode, self.error)
    }
}

/// Renders every failed attempt, in the order they were made
pub fn describe_attempts(attempts: &[WriteAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Builds the ordered list of writes to try for `write_short_code`
pub fn fallback_plan(write_short_code: &str) -> Result<Vec<PlannedWrite>> {
    let primary = write_short_code.to_ascii_uppercase();
    let mut codes = vec![primary.clone()];
    if let Some(alternate) = alternate_characteristic(&primary) {
        codes.push(alternate.to_string());
    }

    let mut plan = Vec::with_capacity(codes.len() * 2);
    for code in codes {
        let uuid = characteristic_uuid(&code)?;
        for mode in [WriteMode::WithoutResponse, WriteMode::WithResponse] {
            plan.push(PlannedWrite {
                short_code: code.clone(),
                uuid,
                mode,
            });
        }
    }
    Ok(plan)
}

/// Delivers payloads to lamps through a [`BleTransport`]
pub struct WriteEngine<T> {
    transport: T,
    config: WriteConfig,
}

impl<T: BleTransport> WriteEngine<T> {
    pub fn new(transport: T, config: WriteConfig) -> Self {
        Self { transport, config }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &WriteConfig {
        &self.config
    }

    /// Delivers a single payload over one connection
    ///
    /// # Arguments
    ///
    /// * `address` - BLE address or platform id of the lamp
    /// * `service_short_code` - Service short code, e.g. `FFF0`
    /// * `write_short_code` - Primary write characteristic short code, e.g. `FFF3`
    /// * `payload` - Bytes to write
    pub async fn deliver(
        &self,
        address: &str,
        service_short_code: &str,
        write_short_code: &str,
        payload: &[u8],
    ) -> Result<()> {
        self.deliver_sequence(address, service_short_code, write_short_code, &[payload])
            .await
    }

    /// Delivers several payloads in order over one connection
    ///
    /// Each payload gets the full fallback plan. The first payload that
    /// exhausts it fails the delivery and the rest are not sent.
    #[instrument(skip(self, payloads), fields(count = payloads.len()))]
    pub async fn deliver_sequence(
        &self,
        address: &str,
        service_short_code: &str,
        write_short_code: &str,
        payloads: &[&[u8]],
    ) -> Result<()> {
        if payloads.is_empty() {
            return Err(Error::InvalidParameter("no payload to deliver".to_string()));
        }
        let service_uuid = characteristic_uuid(service_short_code)?;
        let plan = fallback_plan(write_short_code)?;
        debug!(
            "Target service {}, {} write step(s) per payload",
            service_uuid,
            plan.len()
        );

        trace!(state = ?DeliveryState::Connecting, "Connecting to {}", address);
        let connection = match self.transport.connect(address).await {
            Ok(connection) => connection,
            Err(e) => {
                error!("Connection to {} failed: {}", address, e);
                return Err(Error::ConnectionFailed {
                    address: address.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let result = if self.transport.is_connected(&connection).await {
            trace!(state = ?DeliveryState::Connected, "Connected to {}", address);
            self.write_payloads(&connection, address, &plan, payloads)
                .await
        } else {
            error!("Link to {} dropped right after connecting", address);
            Err(Error::ConnectionFailed {
                address: address.to_string(),
                reason: "link not up after connect".to_string(),
            })
        };

        trace!(state = ?DeliveryState::Disconnecting, "Disconnecting from {}", address);
        if let Err(e) = self.transport.disconnect(&connection).await {
            warn!("Ignoring disconnect error for {}: {}", address, e);
        }
        trace!(state = ?DeliveryState::Disconnected, "Done with {}", address);

        result
    }

    async fn write_payloads(
        &self,
        connection: &T::Connection,
        address: &str,
        plan: &[PlannedWrite],
        payloads: &[&[u8]],
    ) -> Result<()> {
        time::sleep(self.config.connect_settle).await;

        for (i, payload) in payloads.iter().enumerate() {
            if i > 0 {
                time::sleep(self.config.command_gap).await;
            }
            trace!(state = ?DeliveryState::Writing, "Payload {}/{}", i + 1, payloads.len());
            debug!("Payload: {}", hex(payload));

            if let Err(attempts) = self.write_with_fallback(connection, plan, payload).await {
                error!(
                    "All write attempts to {} failed: {}",
                    address,
                    describe_attempts(&attempts)
                );
                return Err(Error::WriteFailed {
                    address: address.to_string(),
                    attempts,
                });
            }
        }

        time::sleep(self.config.post_write_settle).await;
        Ok(())
    }

    /// Walks the plan until one write succeeds, collecting every failure on the way
    async fn write_with_fallback(
        &self,
        connection: &T::Connection,
        plan: &[PlannedWrite],
        payload: &[u8],
    ) -> std::result::Result<(), Vec<WriteAttempt>> {
        let mut failures = Vec::new();

        for step in plan {
            match self
                .transport
                .write_characteristic(connection, step.uuid, payload, step.mode)
                .await
            {
                Ok(()) => {
                    info!("Wrote to {} ({})", step.short_code, step.mode);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Write to {} ({}) failed: {}", step.short_code, step.mode, e);
                    failures.push(WriteAttempt {
                        characteristic: step.short_code.clone(),
                        mode: step.mode,
                        error: e.to_string(),
                    });
                }
            }
        }

        Err(failures)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}
