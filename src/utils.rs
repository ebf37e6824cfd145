//! Utility functions for the hub2-rust-ble crate.

/// Convert Celsius to Fahrenheit.
///
/// # Arguments
///
/// * `celsius` - Temperature in degrees Celsius
///
/// # Returns
///
/// Temperature in degrees Fahrenheit
///
/// # Example
///
/// ```
/// use hub2_rust_ble::celsius_to_fahrenheit;
///
/// let fahrenheit = celsius_to_fahrenheit(100.0);
/// assert!((fahrenheit - 212.0).abs() < 0.001);
/// ```
#[inline]
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Round to one decimal place, ties away from zero.
///
/// # Example
///
/// ```
/// use hub2_rust_ble::round_to_tenth;
///
/// assert_eq!(round_to_tenth(57.92), 57.9);
/// assert_eq!(round_to_tenth(-3.25), -3.3);
/// ```
#[inline]
pub fn round_to_tenth(value: f64) -> f64 {
    let rounded = (value * 10.0).round() / 10.0;
    // Collapse -0.0 so it compares and prints as 0.
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}
