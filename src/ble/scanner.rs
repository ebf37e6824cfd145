//! BLE scanning functionality.
//!
//! Provides the btleplug-backed [`BleAdapter`] used on real hardware.

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures::stream::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace};

use crate::ble::adapter::{Advertisement, BleAdapter, PowerState};
use crate::error::{Error, Result};

/// Capacity of the advertisement broadcast channel.
const DISCOVERY_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the power state broadcast channel.
const STATE_CHANNEL_CAPACITY: usize = 16;

/// BLE scanner wrapping a btleplug adapter.
pub struct BleScanner {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
    /// Channel for power state changes.
    state_tx: broadcast::Sender<PowerState>,
    /// Channel for received advertisements.
    discovery_tx: broadcast::Sender<Advertisement>,
    /// Handle to the event pump task.
    pump_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BleScanner {
    /// Create a new BLE scanner using the first system adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Self::with_adapter(adapter).await
    }

    /// Create a new BLE scanner with a specific adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter event stream cannot be opened.
    pub async fn with_adapter(adapter: Adapter) -> Result<Self> {
        let (state_tx, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        let (discovery_tx, _) = broadcast::channel(DISCOVERY_CHANNEL_CAPACITY);

        let mut events = adapter.events().await.map_err(Error::Bluetooth)?;

        let pump_adapter = adapter.clone();
        let pump_state_tx = state_tx.clone();
        let pump_discovery_tx = discovery_tx.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                Self::handle_event(event, &pump_adapter, &pump_state_tx, &pump_discovery_tx)
                    .await;
            }

            debug!("Adapter event stream ended");
        });

        Ok(Self {
            adapter,
            state_tx,
            discovery_tx,
            pump_handle: Mutex::new(Some(handle)),
        })
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Handle a BLE central event.
    async fn handle_event(
        event: CentralEvent,
        adapter: &Adapter,
        state_tx: &broadcast::Sender<PowerState>,
        discovery_tx: &broadcast::Sender<Advertisement>,
    ) {
        match event {
            CentralEvent::StateUpdate(state) => {
                let state = Self::power_state_from(state);
                debug!("Adapter state changed: {:?}", state);
                let _ = state_tx.send(state);
            }
            CentralEvent::DeviceDiscovered(id) => {
                trace!("Device discovered: {:?}", id);
                Self::process_peripheral(adapter, id, discovery_tx).await;
            }
            CentralEvent::ManufacturerDataAdvertisement {
                id,
                manufacturer_data,
            } => {
                let identifier = id.to_string();
                for (company_id, data) in manufacturer_data {
                    let _ = discovery_tx.send(Advertisement::from_company_data(
                        identifier.clone(),
                        company_id,
                        &data,
                    ));
                }
            }
            _ => {}
        }
    }

    /// Publish the manufacturer data of a newly discovered peripheral.
    async fn process_peripheral(
        adapter: &Adapter,
        id: PeripheralId,
        discovery_tx: &broadcast::Sender<Advertisement>,
    ) {
        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return,
        };

        let identifier = id.to_string();
        for (company_id, data) in &properties.manufacturer_data {
            let advertisement =
                Advertisement::from_company_data(identifier.clone(), *company_id, data)
                    .with_rssi(properties.rssi);
            let _ = discovery_tx.send(advertisement);
        }
    }

    fn power_state_from(state: CentralState) -> PowerState {
        match state {
            CentralState::PoweredOn => PowerState::PoweredOn,
            CentralState::PoweredOff => PowerState::PoweredOff,
            _ => PowerState::Unknown,
        }
    }
}

#[async_trait]
impl BleAdapter for BleScanner {
    async fn power_state(&self) -> Result<PowerState> {
        let state = self.adapter.adapter_state().await.map_err(Error::Bluetooth)?;
        Ok(Self::power_state_from(state))
    }

    fn power_state_updates(&self) -> broadcast::Receiver<PowerState> {
        self.state_tx.subscribe()
    }

    fn discoveries(&self) -> broadcast::Receiver<Advertisement> {
        self.discovery_tx.subscribe()
    }

    async fn start_scan(&self) -> Result<()> {
        debug!("Starting BLE scan");
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)
    }

    async fn stop_scan(&self) -> Result<()> {
        debug!("Stopping BLE scan");
        if let Err(e) = self.adapter.stop_scan().await {
            error!("Failed to stop scan: {}", e);
            return Err(Error::Bluetooth(e));
        }
        Ok(())
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        if let Some(handle) = self.pump_handle.lock().take() {
            handle.abort();
        }
    }
}
