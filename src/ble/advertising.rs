//! Advertising data parsing.
//!
//! Parses manufacturer-specific advertising data broadcast by Hub2 sensors.
//!
//! Buffers are handled exactly as received from the radio, including the
//! two manufacturer ID bytes:
//!
//! | Offset | Length | Field |
//! |--------|--------|-------|
//! | 0-1    | 2      | Manufacturer ID (`69 09`) |
//! | 2-7    | 6      | MAC address |
//! | 14     | 1      | Status (bits 0-4: light level) |
//! | 15-17  | 3      | Temperature / humidity |

use tracing::trace;

use crate::data::Reading;
use crate::error::{Error, Result};
use crate::utils::{celsius_to_fahrenheit, round_to_tenth};

/// Hub2 company identifier, as used for manufacturer-data map keys.
pub const HUB2_MANUFACTURER_ID: u16 = 0x0969;

/// The company identifier as it appears at the start of a raw buffer
/// (little-endian, hex `6909`).
pub const HUB2_MANUFACTURER_ID_PREFIX: [u8; 2] = HUB2_MANUFACTURER_ID.to_le_bytes();

/// Minimum size of a decodable payload.
pub const MIN_PAYLOAD_LEN: usize = 18;

/// Length of the MAC address field.
pub const MAC_LEN: usize = 6;

const MAC_OFFSET: usize = 2;
const STATUS_OFFSET: usize = 14;
const TEMPERATURE_OFFSET: usize = 15;

/// Check whether a buffer starts with the Hub2 manufacturer ID.
pub fn has_manufacturer_id(data: &[u8]) -> bool {
    data.get(..HUB2_MANUFACTURER_ID_PREFIX.len()) == Some(&HUB2_MANUFACTURER_ID_PREFIX[..])
}

/// Extract the device MAC address from a raw manufacturer-data buffer.
///
/// Returns `None` when the buffer is too short to contain one.
///
/// # Example
///
/// ```
/// use hub2_rust_ble::extract_mac;
///
/// let data = [0x69, 0x09, 0xc9, 0x16, 0x5c, 0x55, 0x51, 0xa6];
/// assert_eq!(extract_mac(&data).as_deref(), Some("c9:16:5c:55:51:a6"));
/// assert_eq!(extract_mac(&data[..7]), None);
/// ```
pub fn extract_mac(data: &[u8]) -> Option<String> {
    let mac = data.get(MAC_OFFSET..MAC_OFFSET + MAC_LEN)?;
    let octets: Vec<String> = mac.iter().map(|b| format!("{:02x}", b)).collect();
    Some(octets.join(":"))
}

/// Parse a raw manufacturer-data buffer into a [`Reading`].
///
/// # Arguments
///
/// * `data` - Raw manufacturer-specific advertising data, ID bytes included
///
/// # Returns
///
/// The decoded reading, or [`Error::InvalidData`] describing why the buffer
/// was rejected.
pub fn parse(data: &[u8]) -> Result<Reading> {
    if data.len() < MIN_PAYLOAD_LEN {
        return Err(Error::InvalidData {
            context: format!(
                "Advertising data too short: {} bytes (need at least {})",
                data.len(),
                MIN_PAYLOAD_LEN
            ),
        });
    }

    if !has_manufacturer_id(data) {
        return Err(Error::InvalidData {
            context: format!(
                "Unexpected manufacturer ID: {:02x}{:02x}",
                data[0], data[1]
            ),
        });
    }

    let status = data[STATUS_OFFSET];

    // Bytes 15-17: temperature and humidity
    // - Byte 0, bits 0-3: tenths of a degree
    // - Byte 1, bits 0-6: whole degrees
    // - Byte 1, bit 7: sign (set means positive)
    // - Byte 2, bits 0-6: humidity
    let temp = data
        .get(TEMPERATURE_OFFSET..TEMPERATURE_OFFSET + 3)
        .ok_or_else(|| Error::InvalidData {
            context: "Temperature field truncated".to_string(),
        })?;

    let sign = if temp[1] & 0x80 != 0 { 1.0 } else { -1.0 };
    let magnitude = f64::from(temp[1] & 0x7F) + f64::from(temp[0] & 0x0F) / 10.0;
    let celsius = sign * magnitude;

    Ok(Reading {
        temperature_c: round_to_tenth(celsius),
        temperature_f: round_to_tenth(celsius_to_fahrenheit(celsius)),
        humidity_percent: temp[2] & Reading::MAX_HUMIDITY,
        light_level: status & Reading::MAX_LIGHT_LEVEL,
        mac_address: extract_mac(data),
    })
}

/// Decode a raw manufacturer-data buffer.
///
/// Returns `None` for anything that is not a complete Hub2 payload; this
/// never fails loudly since most nearby advertisers are unrelated devices.
///
/// # Example
///
/// ```
/// use hub2_rust_ble::decode;
///
/// let data = [
///     0x69, 0x09, 0xc9, 0x16, 0x5c, 0x55, 0x51, 0xa6, 0x00, 0xff, 0x67, 0xee, 0x84,
///     0xb9, 0x8a, 0x04, 0x8e, 0xab, 0x00,
/// ];
/// let reading = decode(&data).unwrap();
/// assert_eq!(reading.temperature_c, 14.4);
/// assert_eq!(reading.humidity_percent, 43);
///
/// assert!(decode(&[0x69, 0x09]).is_none());
/// ```
pub fn decode(data: &[u8]) -> Option<Reading> {
    match parse(data) {
        Ok(reading) => Some(reading),
        Err(e) => {
            trace!("Rejected advertisement: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    /// Valid payload with the given temperature/humidity triplet and status.
    fn payload(status: u8, temp: [u8; 3]) -> Vec<u8> {
        let mut data = hex("6909aabbccddeeff00ff67ee84b9");
        data.push(status);
        data.extend_from_slice(&temp);
        data
    }

    #[test]
    fn test_manufacturer_id_prefix() {
        assert_eq!(HUB2_MANUFACTURER_ID_PREFIX, [0x69, 0x09]);
        assert!(has_manufacturer_id(&[0x69, 0x09]));
        assert!(has_manufacturer_id(&hex("6909c9165c")));
        assert!(!has_manufacturer_id(&[0x09, 0x69]));
        assert!(!has_manufacturer_id(&[0x69]));
        assert!(!has_manufacturer_id(&[]));
    }

    #[test]
    fn test_decode_first_vector() {
        let reading = decode(&hex("6909c9165c5551a600ff67ee84b98a048eab00")).unwrap();
        assert_eq!(
            reading,
            Reading {
                temperature_c: 14.4,
                temperature_f: 57.9,
                humidity_percent: 43,
                light_level: 10,
                mac_address: Some("c9:16:5c:55:51:a6".to_string()),
            }
        );
    }

    #[test]
    fn test_decode_second_vector() {
        let reading = decode(&hex("6909e4de3a66c7a600ff67ef0bb0820891ad00")).unwrap();
        assert_eq!(
            reading,
            Reading {
                temperature_c: 17.8,
                temperature_f: 64.0,
                humidity_percent: 45,
                light_level: 2,
                mac_address: Some("e4:de:3a:66:c7:a6".to_string()),
            }
        );
    }

    #[test]
    fn test_decode_id_only() {
        assert_eq!(decode(&hex("6909")), None);
    }

    #[test]
    fn test_decode_exact_minimum_length() {
        let data = hex("6909c9165c5551a600ff67ee84b98a048eab00");
        let reading = decode(&data[..MIN_PAYLOAD_LEN]).unwrap();
        assert_eq!(reading.temperature_c, 14.4);
        assert!(decode(&data[..MIN_PAYLOAD_LEN - 1]).is_none());
    }

    #[test]
    fn test_decode_wrong_manufacturer() {
        let mut data = hex("6909c9165c5551a600ff67ee84b98a048eab00");
        data[0] = 0x4c;
        data[1] = 0x00;
        assert!(decode(&data).is_none());

        let err = parse(&data).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid data received: Unexpected manufacturer ID: 4c00"
        );
    }

    #[test]
    fn test_parse_too_short_message() {
        let err = parse(&hex("6909c9")).unwrap_err();
        assert!(matches!(err, Error::InvalidData { .. }));
        assert!(err.to_string().contains("3 bytes"));
    }

    #[test]
    fn test_sign_bit_clear_is_negative() {
        let reading = decode(&payload(0x00, [0x03, 0x05, 0x32])).unwrap();
        assert_eq!(reading.temperature_c, -5.3);
        assert_eq!(reading.temperature_f, 22.5);
        assert_eq!(reading.humidity_percent, 50);
        assert!(reading.is_below_freezing());
    }

    #[test]
    fn test_sign_bit_set_is_positive() {
        let reading = decode(&payload(0x00, [0x03, 0x85, 0x32])).unwrap();
        assert_eq!(reading.temperature_c, 5.3);
    }

    #[test]
    fn test_negative_zero_is_normalised() {
        let reading = decode(&payload(0x00, [0x00, 0x00, 0x00])).unwrap();
        assert_eq!(reading.temperature_c, 0.0);
        assert!(reading.temperature_c.is_sign_positive());
        assert_eq!(reading.temperature_f, 32.0);
    }

    #[test]
    fn test_unused_bits_are_masked() {
        // High nibble of the tenths byte, status bits 5-7 and humidity bit 7
        // carry no meaning.
        let reading = decode(&payload(0xff, [0xf7, 0xff, 0xff])).unwrap();
        assert_eq!(reading.temperature_c, 127.7);
        assert_eq!(reading.humidity_percent, 127);
        assert_eq!(reading.light_level, 31);
    }

    #[test]
    fn test_fahrenheit_uses_unrounded_celsius() {
        let reading = decode(&payload(0x00, [0x09, 0x80 | 21, 0x00])).unwrap();
        let celsius = 21.0 + 9.0 / 10.0;
        assert_eq!(reading.temperature_c, round_to_tenth(celsius));
        assert_eq!(
            reading.temperature_f,
            round_to_tenth(celsius_to_fahrenheit(celsius))
        );
        assert_eq!(reading.temperature_f, 71.4);
    }

    #[test]
    fn test_extract_mac() {
        let data = hex("6909c9165c5551a6");
        assert_eq!(extract_mac(&data).as_deref(), Some("c9:16:5c:55:51:a6"));
        assert_eq!(extract_mac(&data[..7]), None);
        assert_eq!(extract_mac(&[]), None);
    }

    #[test]
    fn test_extract_mac_does_not_check_manufacturer() {
        let data = hex("4c000102030405ff");
        assert_eq!(extract_mac(&data).as_deref(), Some("01:02:03:04:05:ff"));
    }

    proptest! {
        #[test]
        fn short_buffers_never_decode(
            data in proptest::collection::vec(any::<u8>(), 0..MIN_PAYLOAD_LEN),
        ) {
            prop_assert!(decode(&data).is_none());
        }

        #[test]
        fn foreign_prefix_never_decodes(
            prefix in any::<[u8; 2]>(),
            rest in proptest::collection::vec(any::<u8>(), 0..40),
        ) {
            prop_assume!(prefix != HUB2_MANUFACTURER_ID_PREFIX);
            let mut data = prefix.to_vec();
            data.extend(rest);
            prop_assert!(decode(&data).is_none());
        }

        #[test]
        fn mac_is_six_lowercase_octets(data in proptest::collection::vec(any::<u8>(), 0..32)) {
            match extract_mac(&data) {
                None => prop_assert!(data.len() < 8),
                Some(mac) => {
                    prop_assert!(data.len() >= 8);
                    let octets: Vec<&str> = mac.split(':').collect();
                    prop_assert_eq!(octets.len(), MAC_LEN);
                    for (i, octet) in octets.iter().enumerate() {
                        prop_assert_eq!(octet.len(), 2);
                        prop_assert_eq!(octet.to_lowercase(), *octet);
                        let byte = u8::from_str_radix(octet, 16).unwrap();
                        prop_assert_eq!(byte, data[MAC_OFFSET + i]);
                    }
                }
            }
        }

        #[test]
        fn valid_payloads_decode_consistently(
            body in proptest::collection::vec(any::<u8>(), (MIN_PAYLOAD_LEN - 2)..30),
        ) {
            let mut data = HUB2_MANUFACTURER_ID_PREFIX.to_vec();
            data.extend(body);

            let reading = decode(&data).unwrap();
            prop_assert_eq!(decode(&data), Some(reading.clone()));

            let temp = &data[TEMPERATURE_OFFSET..TEMPERATURE_OFFSET + 3];
            let magnitude = f64::from(temp[1] & 0x7F) + f64::from(temp[0] & 0x0F) / 10.0;
            let celsius = if temp[1] & 0x80 != 0 { magnitude } else { -magnitude };

            prop_assert_eq!(reading.temperature_c, round_to_tenth(celsius));
            prop_assert_eq!(reading.temperature_f, round_to_tenth(celsius_to_fahrenheit(celsius)));
            prop_assert!(reading.humidity_percent <= Reading::MAX_HUMIDITY);
            prop_assert!(reading.light_level <= Reading::MAX_LIGHT_LEVEL);
            prop_assert_eq!(reading.mac_address, extract_mac(&data));
        }
    }
}
