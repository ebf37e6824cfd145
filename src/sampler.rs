//! Periodic sampling of Hub2 sensors.
//!
//! A sampler opens a short scan window at a fixed interval, decodes every
//! Hub2 advertisement it hears, and delivers at most one [`Reading`] per
//! device per window. Each call to [`start_sampling`] owns its own task and
//! state, so independent samplers never interfere with each other.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::ble::adapter::{Advertisement, BleAdapter, PowerState};
use crate::ble::advertising::{decode, extract_mac, has_manufacturer_id};
use crate::data::Reading;
use crate::error::{Error, Result};

/// Default time between the start of successive scan windows.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(15_000);

/// Default length of each scan window.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_millis(3_000);

/// Sampling schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingConfig {
    /// Time between the start of successive scan windows.
    pub interval: Duration,
    /// Length of each scan window.
    pub scan_duration: Duration,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            scan_duration: DEFAULT_SCAN_DURATION,
        }
    }
}

impl SamplingConfig {
    /// Create a schedule from millisecond values.
    pub fn from_millis(interval_ms: u64, scan_duration_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            scan_duration: Duration::from_millis(scan_duration_ms),
        }
    }

    /// Set the time between scan windows.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the length of each scan window.
    pub fn with_scan_duration(mut self, scan_duration: Duration) -> Self {
        self.scan_duration = scan_duration;
        self
    }

    /// Check that the schedule can be run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if either duration is zero.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::InvalidParameter {
                name: "interval".to_string(),
                value: format!("{:?}", self.interval),
            });
        }
        if self.scan_duration.is_zero() {
            return Err(Error::InvalidParameter {
                name: "scan_duration".to_string(),
                value: format!("{:?}", self.scan_duration),
            });
        }
        Ok(())
    }

    /// Whether a window outlasts the interval between windows.
    pub fn windows_overlap(&self) -> bool {
        self.scan_duration > self.interval
    }
}

type Callback = Box<dyn FnMut(Reading) + Send>;

/// Callback slot shared between the handle and the sampler task.
///
/// Invocation and removal take the same lock, so once [`SamplingHandle::stop`]
/// has returned the callback can no longer run.
type CallbackSlot = Arc<Mutex<Option<Callback>>>;

/// Handle to a running sampler.
///
/// Dropping the handle stops sampling.
pub struct SamplingHandle {
    callback: CallbackSlot,
    shutdown_tx: watch::Sender<bool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl SamplingHandle {
    /// Stop sampling.
    ///
    /// No callback invocation starts after this returns. The in-progress
    /// scan, if any, is stopped by the sampler task shortly afterwards.
    /// Calling this more than once is harmless. Must not be called from
    /// inside the callback itself.
    pub fn stop(&self) {
        let callback = self.callback.lock().take();
        if callback.is_some() {
            info!("Stopping sampler");
        }
        drop(callback);
        self.shutdown_tx.send_replace(true);
    }

    /// Check if [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Stop sampling and wait for the sampler task to finish.
    pub async fn join(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SamplingHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start sampling Hub2 sensors through `adapter`.
///
/// `callback` is invoked once per device per scan window with the decoded
/// reading. Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if `config` is invalid.
///
/// # Example
///
/// ```rust,no_run
/// use hub2_rust_ble::{start_sampling, BleScanner, Result, SamplingConfig};
/// use std::sync::Arc;
///
/// # async fn run() -> Result<()> {
/// let scanner = Arc::new(BleScanner::new().await?);
/// let handle = start_sampling(scanner, SamplingConfig::default(), |reading| {
///     println!("{}", reading);
/// })?;
///
/// tokio::time::sleep(std::time::Duration::from_secs(60)).await;
/// handle.join().await;
/// # Ok(())
/// # }
/// ```
pub fn start_sampling<A, F>(
    adapter: Arc<A>,
    config: SamplingConfig,
    callback: F,
) -> Result<SamplingHandle>
where
    A: BleAdapter + ?Sized,
    F: FnMut(Reading) + Send + 'static,
{
    config.validate()?;

    if config.windows_overlap() {
        warn!(
            "Scan duration {:?} exceeds interval {:?}; windows will run back to back",
            config.scan_duration, config.interval
        );
    }

    let callback: Callback = Box::new(callback);
    let callback: CallbackSlot = Arc::new(Mutex::new(Some(callback)));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sampler = Sampler {
        states: adapter.power_state_updates(),
        adapter,
        config,
        callback: callback.clone(),
        shutdown: shutdown_rx,
        seen: HashSet::new(),
    };

    let task = tokio::spawn(sampler.run());

    Ok(SamplingHandle {
        callback,
        shutdown_tx,
        task: Some(task),
    })
}

/// Start sampling and deliver readings through a channel.
///
/// The receiver yields `None` once the sampler has stopped and all queued
/// readings have been consumed.
///
/// # Errors
///
/// Returns an error if `config` is invalid.
pub fn start_sampling_channel<A>(
    adapter: Arc<A>,
    config: SamplingConfig,
) -> Result<(SamplingHandle, mpsc::UnboundedReceiver<Reading>)>
where
    A: BleAdapter + ?Sized,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = start_sampling(adapter, config, move |reading| {
        let _ = tx.send(reading);
    })?;
    Ok((handle, rx))
}

/// Why a wait or scan window ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Keep going.
    Continue,
    /// The adapter left the powered-on state.
    PoweredOff,
    /// Stop was requested or the adapter went away.
    Shutdown,
}

enum WindowEvent {
    Elapsed,
    Shutdown,
    State(std::result::Result<PowerState, broadcast::error::RecvError>),
    Discovery(std::result::Result<Advertisement, broadcast::error::RecvError>),
}

/// State owned by one sampler task.
struct Sampler<A: ?Sized> {
    adapter: Arc<A>,
    config: SamplingConfig,
    callback: CallbackSlot,
    shutdown: watch::Receiver<bool>,
    states: broadcast::Receiver<PowerState>,
    /// MACs already delivered in the current window.
    seen: HashSet<String>,
}

impl<A: BleAdapter + ?Sized> Sampler<A> {
    async fn run(mut self) {
        'powered: loop {
            if self.wait_powered_on().await == Outcome::Shutdown {
                break;
            }

            info!(
                "Adapter powered on, sampling every {:?} for {:?}",
                self.config.interval, self.config.scan_duration
            );

            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                let outcome = tokio::select! {
                    _ = ticker.tick() => self.scan_window().await,
                    _ = Self::stopped(&mut self.shutdown) => Outcome::Shutdown,
                    state = self.states.recv() => Self::check_state(state),
                };

                match outcome {
                    Outcome::Continue => {}
                    Outcome::PoweredOff => {
                        info!("Adapter no longer powered on, pausing sampling");
                        self.stop_scan().await;
                        continue 'powered;
                    }
                    Outcome::Shutdown => break 'powered,
                }
            }
        }

        self.stop_scan().await;
        debug!("Sampler task ended");
    }

    /// Wait until the adapter reports that it is powered on.
    async fn wait_powered_on(&mut self) -> Outcome {
        match self.adapter.power_state().await {
            Ok(state) if state.is_powered_on() => return Outcome::Continue,
            Ok(state) => debug!("Waiting for adapter power on (currently {:?})", state),
            Err(e) => warn!("Failed to query adapter state: {}", e),
        }

        loop {
            let state = tokio::select! {
                _ = Self::stopped(&mut self.shutdown) => return Outcome::Shutdown,
                state = self.states.recv() => state,
            };

            match state {
                Ok(PowerState::PoweredOn) => return Outcome::Continue,
                Ok(state) => trace!("Adapter state: {:?}", state),
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    // Missed updates; the current state is what matters.
                    if let Ok(PowerState::PoweredOn) = self.adapter.power_state().await {
                        return Outcome::Continue;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!("Adapter state channel closed");
                    return Outcome::Shutdown;
                }
            }
        }
    }

    /// Run a single scan window.
    async fn scan_window(&mut self) -> Outcome {
        self.seen.clear();
        let mut discoveries = self.adapter.discoveries();

        if let Err(e) = self.adapter.start_scan().await {
            warn!("Failed to start scan: {}", e);
            return Outcome::Continue;
        }

        debug!("Scan window opened");

        let deadline = tokio::time::sleep(self.config.scan_duration);
        tokio::pin!(deadline);

        let outcome = loop {
            let event = tokio::select! {
                _ = &mut deadline => WindowEvent::Elapsed,
                _ = Self::stopped(&mut self.shutdown) => WindowEvent::Shutdown,
                state = self.states.recv() => WindowEvent::State(state),
                adv = discoveries.recv() => WindowEvent::Discovery(adv),
            };

            match event {
                WindowEvent::Elapsed => break Outcome::Continue,
                WindowEvent::Shutdown => break Outcome::Shutdown,
                WindowEvent::State(state) => match Self::check_state(state) {
                    Outcome::Continue => {}
                    outcome => break outcome,
                },
                WindowEvent::Discovery(Ok(adv)) => self.handle_advertisement(&adv),
                WindowEvent::Discovery(Err(broadcast::error::RecvError::Lagged(n))) => {
                    debug!("Dropped {} advertisements", n);
                }
                WindowEvent::Discovery(Err(broadcast::error::RecvError::Closed)) => {
                    warn!("Adapter discovery channel closed");
                    break Outcome::Shutdown;
                }
            }
        };

        drop(discoveries);
        if outcome == Outcome::Continue {
            self.stop_scan().await;
        }

        debug!("Scan window closed ({} devices)", self.seen.len());
        outcome
    }

    /// Filter, de-duplicate, decode, and deliver one advertisement.
    fn handle_advertisement(&mut self, adv: &Advertisement) {
        let data = match &adv.manufacturer_data {
            Some(data) if has_manufacturer_id(data) => data,
            _ => return,
        };

        let mac = match extract_mac(data) {
            Some(mac) => mac,
            None => return,
        };

        if !self.seen.insert(mac.clone()) {
            trace!("Already sampled {} in this window", mac);
            return;
        }

        if let Some(reading) = decode(data) {
            debug!("Reading from {}: {}", adv.id, reading);
            if let Some(callback) = self.callback.lock().as_mut() {
                callback(reading);
            }
        }
    }

    fn check_state(
        state: std::result::Result<PowerState, broadcast::error::RecvError>,
    ) -> Outcome {
        match state {
            Ok(PowerState::PoweredOn) => Outcome::Continue,
            Ok(_) => Outcome::PoweredOff,
            Err(broadcast::error::RecvError::Lagged(_)) => Outcome::Continue,
            Err(broadcast::error::RecvError::Closed) => {
                warn!("Adapter state channel closed");
                Outcome::Shutdown
            }
        }
    }

    async fn stop_scan(&self) {
        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
    }

    /// Resolves once stop has been requested or the handle is gone.
    async fn stopped(shutdown: &mut watch::Receiver<bool>) {
        let _ = shutdown.wait_for(|stopped| *stopped).await;
    }
}
