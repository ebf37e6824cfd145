//! Decoded sensor reading.

/// A single decoded reading from a Hub2 advertisement.
///
/// Readings are only ever built from a complete, validated payload; see
/// [`crate::ble::advertising::decode`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reading {
    /// Temperature in degrees Celsius, rounded to one decimal place.
    pub temperature_c: f64,
    /// Temperature in degrees Fahrenheit, rounded to one decimal place.
    ///
    /// Converted from the unrounded Celsius value.
    pub temperature_f: f64,
    /// Relative humidity in percent (7-bit field, 0-127).
    pub humidity_percent: u8,
    /// Ambient light level (5-bit field, 0-31).
    pub light_level: u8,
    /// Device MAC address as lowercase colon-separated hex.
    pub mac_address: Option<String>,
}

impl Reading {
    /// Maximum value of the light level field.
    pub const MAX_LIGHT_LEVEL: u8 = 0x1F;

    /// Maximum value of the humidity field.
    pub const MAX_HUMIDITY: u8 = 0x7F;

    /// Whether the temperature is below freezing.
    pub fn is_below_freezing(&self) -> bool {
        self.temperature_c < 0.0
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {:.1}°C ({:.1}°F), {}% RH, light {}",
            self.mac_address.as_deref().unwrap_or("unknown"),
            self.temperature_c,
            self.temperature_f,
            self.humidity_percent,
            self.light_level
        )
    }
}
