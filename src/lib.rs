//! # hub2-rust-ble
//!
//! A cross-platform Rust library for reading Hub2 environment sensors from
//! their Bluetooth Low Energy advertisements.
//!
//! Hub2 sensors broadcast temperature, humidity and ambient light in their
//! manufacturer-specific advertising data. This crate decodes those payloads
//! and can periodically scan for them, handing each decoded [`Reading`] to a
//! callback. It is receive-only: no connections are ever made.
//!
//! ## Features
//!
//! - **Payload decoding**: [`decode`] and [`extract_mac`] work on raw buffers
//!   and never fail loudly on foreign or malformed data
//! - **Periodic sampling**: [`start_sampling`] opens a short scan window at a
//!   fixed interval and reports each device once per window
//! - **Pluggable adapters**: the sampler runs against the [`BleAdapter`]
//!   trait; [`BleScanner`] implements it on top of btleplug
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hub2_rust_ble::{start_sampling, BleScanner, Result, SamplingConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let scanner = Arc::new(BleScanner::new().await?);
//!
//!     let handle = start_sampling(scanner, SamplingConfig::default(), |reading| {
//!         println!(
//!             "{:?}: {:.1}°C, {}%",
//!             reading.mac_address, reading.temperature_c, reading.humidity_percent
//!         );
//!     })?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     handle.join().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for [`Reading`]

// Public modules
pub mod ble;
pub mod data;
pub mod error;
pub mod sampler;
pub mod utils;

// Re-exports for convenience
pub use ble::{decode, extract_mac, Advertisement, BleAdapter, BleScanner, PowerState};
pub use data::Reading;
pub use error::{Error, Result};
pub use sampler::{start_sampling, start_sampling_channel, SamplingConfig, SamplingHandle};
pub use utils::{celsius_to_fahrenheit, round_to_tenth};
