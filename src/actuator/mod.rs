//! Hardware Actuator - PLC Coil Control
//!
//! ## Responsibilities
//!
//! - Edge-triggered coil writes with last-known-state caching so repeated
//!   commands in one alarm state cost no network I/O
//! - Per-coil serialization: sessions sharing a physical address share one
//!   lock and one cached state, so writes can never interleave
//! - Best-effort coil read poller for external status display
//!
//! A failed write clears the cache to unknown; the next command writes
//! unconditionally. Hardware failures never propagate past the caller's log.

pub mod modbus;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{watch, Mutex};

use crate::error::Result;
use modbus::ModbusClient;

/// PLC endpoint and coil addressing.
#[derive(Debug, Clone, Deserialize)]
pub struct PlcConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    /// Coil driven on alarm.
    pub coil_address: u16,
    /// Coil polled for status display; defaults to the alarm coil.
    #[serde(default)]
    pub status_address: Option<u16>,
}

fn default_unit_id() -> u8 {
    1
}

/// Identity of one physical coil.
type CoilKey = (String, u16, u16);

/// Shared cached state + write lock per physical coil.
///
/// Two camera sessions configured against the same address get the same
/// entry, which both serializes their writes and keeps the cache paired with
/// the actual coil state.
pub struct CoilStateRegistry {
    entries: Mutex<HashMap<CoilKey, Arc<Mutex<Option<bool>>>>>,
}

impl CoilStateRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn shared_coil(&self, host: &str, port: u16, address: u16) -> Arc<Mutex<Option<bool>>> {
        let mut entries = self.entries.lock().await;
        entries
            .entry((host.to_string(), port, address))
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }
}

impl Default for CoilStateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Coil writer with cached-state write suppression.
pub struct PlcCoilController {
    client: ModbusClient,
    address: u16,
    coil: Arc<Mutex<Option<bool>>>,
}

impl PlcCoilController {
    pub async fn new(config: &PlcConfig, registry: &CoilStateRegistry) -> Self {
        let coil = registry
            .shared_coil(&config.host, config.port, config.coil_address)
            .await;
        Self {
            client: ModbusClient::new(config.host.clone(), config.port, config.unit_id),
            address: config.coil_address,
            coil,
        }
    }

    /// Drive the coil to `desired`. Suppressed when the cached state already
    /// matches; the cache is updated only on confirmed success.
    pub async fn set_state(&self, desired: bool) -> Result<()> {
        let mut cached = self.coil.lock().await;

        if *cached == Some(desired) {
            tracing::trace!(address = self.address, desired, "Coil write suppressed by cache");
            return Ok(());
        }

        match self.client.write_coil(self.address, desired).await {
            Ok(()) => {
                *cached = Some(desired);
                tracing::info!(address = self.address, desired, "Coil written");
                Ok(())
            }
            Err(e) => {
                // Unknown state: the next command must write unconditionally.
                *cached = None;
                tracing::warn!(address = self.address, desired, error = %e, "Coil write failed");
                Err(e)
            }
        }
    }
}

/// Actuation capability; `Noop` is selected when no PLC is configured.
pub enum Actuator {
    Coil(PlcCoilController),
    Noop,
}

impl Actuator {
    pub async fn set_state(&self, desired: bool) -> Result<()> {
        match self {
            Actuator::Coil(controller) => controller.set_state(desired).await,
            Actuator::Noop => Ok(()),
        }
    }
}

/// Best-effort status poller, independent of the write path. Read failures
/// report `false` and never propagate.
pub struct CoilMonitor {
    client: ModbusClient,
    address: u16,
    value: AtomicBool,
    poll_interval: Duration,
}

impl CoilMonitor {
    pub fn new(config: &PlcConfig) -> Self {
        Self {
            client: ModbusClient::new(config.host.clone(), config.port, config.unit_id),
            address: config.status_address.unwrap_or(config.coil_address),
            value: AtomicBool::new(false),
            poll_interval: Duration::from_secs(2),
        }
    }

    /// Last polled coil value.
    pub fn value(&self) -> bool {
        self.value.load(Ordering::Relaxed)
    }

    /// Spawn the polling loop.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.poll_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown.changed() => break,
                }

                let value = match self.client.read_coil(self.address).await {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::debug!(address = self.address, error = %e, "Coil poll failed");
                        false
                    }
                };
                self.value.store(value, Ordering::Relaxed);
            }
            tracing::info!("Coil monitor stopped");
        });
    }
}
