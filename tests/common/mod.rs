#![allow(dead_code)]

use ks_led_controller::{
    characteristic_uuid, Advertisement, BleTransport, Error, Result, WriteMode,
};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Everything the engine asked the transport to do, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Scan(Duration),
    Connect(String),
    Write {
        address: String,
        characteristic: Uuid,
        mode: WriteMode,
        payload: Vec<u8>,
    },
    Disconnect(String),
}

/// Scriptable stand-in for a BLE adapter
#[derive(Default)]
pub struct MockTransport {
    advertisements: Vec<Advertisement>,
    refuse_connect: bool,
    link_down: bool,
    fail_disconnect: bool,
    rejected: Vec<(Uuid, WriteMode)>,
    calls: Mutex<Vec<(Instant, Call)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advertising(mut self, address: &str, name: &str) -> Self {
        self.advertisements.push(Advertisement {
            address: address.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Makes writes to `short_code` in `mode` fail
    pub fn rejecting(mut self, short_code: &str, mode: WriteMode) -> Self {
        let uuid = characteristic_uuid(short_code).unwrap();
        self.rejected.push((uuid, mode));
        self
    }

    pub fn refusing_connections(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    pub fn with_link_down(mut self) -> Self {
        self.link_down = true;
        self
    }

    pub fn failing_disconnect(mut self) -> Self {
        self.fail_disconnect = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.timeline().into_iter().map(|(_, call)| call).collect()
    }

    /// Every call with the (tokio) instant it was made
    pub fn timeline(&self) -> Vec<(Instant, Call)> {
        self.calls.lock().unwrap().clone()
    }

    /// Attempted writes as (characteristic, mode)
    pub fn writes(&self) -> Vec<(Uuid, WriteMode)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Write {
                    characteristic,
                    mode,
                    ..
                } => Some((characteristic, mode)),
                _ => None,
            })
            .collect()
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Write { payload, .. } => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(*c)).count()
    }

    pub fn scans(&self) -> usize {
        self.count(|c| matches!(c, Call::Scan(_)))
    }

    pub fn connects(&self) -> usize {
        self.count(|c| matches!(c, Call::Connect(_)))
    }

    pub fn disconnects(&self) -> usize {
        self.count(|c| matches!(c, Call::Disconnect(_)))
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push((Instant::now(), call));
    }
}

impl BleTransport for MockTransport {
    type Connection = String;

    async fn scan_advertisements(&self, duration: Duration) -> Result<Vec<Advertisement>> {
        self.record(Call::Scan(duration));
        Ok(self.advertisements.clone())
    }

    async fn connect(&self, address: &str) -> Result<String> {
        self.record(Call::Connect(address.to_string()));
        if self.refuse_connect {
            return Err(Error::BleError("device unreachable".to_string()));
        }
        Ok(address.to_string())
    }

    async fn write_characteristic(
        &self,
        connection: &String,
        characteristic: Uuid,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<()> {
        self.record(Call::Write {
            address: connection.clone(),
            characteristic,
            mode,
            payload: payload.to_vec(),
        });
        if self.rejected.contains(&(characteristic, mode)) {
            return Err(Error::BleError(format!("{} refused ({})", characteristic, mode)));
        }
        Ok(())
    }

    async fn disconnect(&self, connection: &String) -> Result<()> {
        self.record(Call::Disconnect(connection.clone()));
        if self.fail_disconnect {
            return Err(Error::BleError("already gone".to_string()));
        }
        Ok(())
    }

    async fn is_connected(&self, _connection: &String) -> bool {
        !self.link_down
    }
}

pub fn uuid(short_code: &str) -> Uuid {
    characteristic_uuid(short_code).unwrap()
}
