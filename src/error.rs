//! Error types for the hub2-rust-ble crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// An advertisement payload could not be decoded.
    #[error("Invalid data received: {context}")]
    InvalidData {
        /// Description of what was invalid about the data.
        context: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidData {
            context: "too short".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid data received: too short");

        let err = Error::InvalidParameter {
            name: "interval".to_string(),
            value: "0ms".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid parameter: interval = 0ms");

        assert_eq!(
            Error::BluetoothUnavailable.to_string(),
            "Bluetooth not available or disabled"
        );
    }
}
