//! BLE communication module.
//!
//! This module provides the advertisement decoder, the adapter abstraction
//! the sampler runs against, and the btleplug-backed scanner.

pub mod adapter;
pub mod advertising;
pub mod scanner;

pub use adapter::{Advertisement, BleAdapter, PowerState};
pub use advertising::{
    decode, extract_mac, has_manufacturer_id, HUB2_MANUFACTURER_ID, HUB2_MANUFACTURER_ID_PREFIX,
};
pub use scanner::BleScanner;
