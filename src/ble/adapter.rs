//! BLE adapter abstraction.
//!
//! The sampler talks to the radio only through [`BleAdapter`], so any backend
//! that can report power state, publish advertisements, and start/stop
//! scanning can drive it. [`crate::ble::BleScanner`] is the btleplug-backed
//! implementation.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;

/// Power state reported by a BLE adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PowerState {
    /// State has not been reported yet.
    #[default]
    Unknown,
    /// The adapter is powered off or otherwise unavailable.
    PoweredOff,
    /// The adapter is powered on and able to scan.
    PoweredOn,
}

impl PowerState {
    /// Check if the adapter can scan.
    pub fn is_powered_on(&self) -> bool {
        matches!(self, Self::PoweredOn)
    }
}

/// A single received advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Backend-specific peripheral identifier.
    pub id: String,
    /// Manufacturer-specific data, starting with the two manufacturer ID
    /// bytes exactly as broadcast.
    pub manufacturer_data: Option<Vec<u8>>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
}

impl Advertisement {
    /// Create an advertisement carrying manufacturer data.
    pub fn new(id: impl Into<String>, manufacturer_data: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            manufacturer_data: Some(manufacturer_data),
            rssi: None,
        }
    }

    /// Build the raw buffer from a company ID and the payload that follows it,
    /// as reported by backends that split the two.
    pub fn from_company_data(id: impl Into<String>, company_id: u16, data: &[u8]) -> Self {
        let mut buffer = Vec::with_capacity(data.len() + 2);
        buffer.extend_from_slice(&company_id.to_le_bytes());
        buffer.extend_from_slice(data);
        Self::new(id, buffer)
    }

    /// Set the signal strength.
    pub fn with_rssi(mut self, rssi: Option<i16>) -> Self {
        self.rssi = rssi;
        self
    }
}

/// A BLE central able to scan for advertisements.
///
/// Listeners are plain broadcast receivers: subscribing creates one, and
/// dropping it unsubscribes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BleAdapter: Send + Sync + 'static {
    /// Query the current power state.
    async fn power_state(&self) -> Result<PowerState>;

    /// Subscribe to power state changes.
    fn power_state_updates(&self) -> broadcast::Receiver<PowerState>;

    /// Subscribe to received advertisements.
    fn discoveries(&self) -> broadcast::Receiver<Advertisement>;

    /// Start scanning without a service filter, reporting duplicates.
    async fn start_scan(&self) -> Result<()>;

    /// Stop any in-progress scan.
    async fn stop_scan(&self) -> Result<()>;
}
