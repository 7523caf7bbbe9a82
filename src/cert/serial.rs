use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rand::TryRngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use x509_cert::serial_number::SerialNumber;

use crate::error::{CaError, Result};

/// Width of every serial this crate generates (RFC 5280 upper bound).
pub const SERIAL_LEN: usize = 20;

/// Largest issuance counter that fits below the marker bit.
pub const MAX_COUNTER: u64 = (1 << 62) - 1;

const COUNTER_LEN: usize = 8;
const MARKER: u8 = 0x40;
/// Marker for random serials; the top two bits stay clear so they never
/// read as counter serials.
const RANDOM_MARKER: u8 = 0x20;

/// A positive certificate serial number, stored as minimal big-endian bytes.
///
/// Ordering is numeric. Serials produced by [`Serial::from_counter`] are
/// always 160 bits wide: a marker bit, the 62-bit issuance counter, then 96
/// bits from the operating system's CSPRNG, so a larger counter always
/// yields a larger serial.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Serial(Vec<u8>);

impl Serial {
    /// Builds a serial from big-endian bytes, dropping leading zeros.
    pub fn from_be_bytes(bytes: &[u8]) -> Result<Self> {
        let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        let trimmed = &bytes[start..];
        if trimmed.is_empty() {
            return Err(CaError::Parse("serial number must be positive".to_string()));
        }
        if trimmed.len() > SERIAL_LEN + 1 {
            return Err(CaError::Parse(format!(
                "serial number is {} octets long",
                trimmed.len()
            )));
        }
        Ok(Self(trimmed.to_vec()))
    }

    /// Generates the serial for the given issuance counter.
    pub fn from_counter(counter: u64) -> Result<Self> {
        if counter > MAX_COUNTER {
            return Err(CaError::SerialSpaceExhausted);
        }
        let mut bytes = [0u8; SERIAL_LEN];
        bytes[..COUNTER_LEN].copy_from_slice(&counter.to_be_bytes());
        bytes[0] |= MARKER;
        OsRng
            .try_fill_bytes(&mut bytes[COUNTER_LEN..])
            .map_err(|e| CaError::KeyGeneration(format!("entropy source failed: {e}")))?;
        Ok(Self(bytes.to_vec()))
    }

    /// Generates a random positive 160-bit serial carrying no counter.
    pub fn random() -> Result<Self> {
        let mut bytes = [0u8; SERIAL_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CaError::KeyGeneration(format!("entropy source failed: {e}")))?;
        bytes[0] = (bytes[0] & 0x1f) | RANDOM_MARKER;
        Ok(Self(bytes.to_vec()))
    }

    /// Issuance counter carried in the high-order bits. `None` for serials
    /// not made by [`Serial::from_counter`], random ones included.
    pub fn counter(&self) -> Option<u64> {
        if self.0.len() != SERIAL_LEN || self.0[0] & 0xc0 != MARKER {
            return None;
        }
        let mut high = [0u8; COUNTER_LEN];
        high.copy_from_slice(&self.0[..COUNTER_LEN]);
        high[0] &= !MARKER;
        Some(u64::from_be_bytes(high))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_x509(&self) -> Result<SerialNumber> {
        Ok(SerialNumber::new(&self.0)?)
    }

    pub fn from_x509(serial: &SerialNumber) -> Result<Self> {
        Self::from_be_bytes(serial.as_bytes())
    }
}

impl Ord for Serial {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Serial {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Serial({self})")
    }
}

impl FromStr for Serial {
    type Err = CaError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || s.len() % 2 != 0 {
            return Err(CaError::Parse(format!("invalid serial number '{s}'")));
        }
        let bytes = (0..s.len())
            .step_by(2)
            .map(|i| {
                u8::from_str_radix(&s[i..i + 2], 16)
                    .map_err(|e| CaError::Parse(format!("invalid serial number '{s}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_be_bytes(&bytes)
    }
}

impl Serialize for Serial {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Serial {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_order_is_serial_order() {
        let mut previous = Serial::from_counter(0).unwrap();
        for counter in 1..50 {
            let next = Serial::from_counter(counter).unwrap();
            assert!(next > previous);
            assert_eq!(next.as_bytes().len(), SERIAL_LEN);
            assert_eq!(next.counter(), Some(counter));
            previous = next;
        }
    }

    #[test]
    fn counter_overflow_is_rejected() {
        assert!(matches!(
            Serial::from_counter(MAX_COUNTER + 1),
            Err(CaError::SerialSpaceExhausted)
        ));
        assert!(Serial::from_counter(MAX_COUNTER).is_ok());
    }

    #[test]
    fn numeric_ordering_ignores_leading_zeros() {
        let small = Serial::from_be_bytes(&[0, 0, 0xff]).unwrap();
        let large = Serial::from_be_bytes(&[0x01, 0x00]).unwrap();
        assert!(small < large);
        assert_eq!(small.as_bytes(), &[0xff]);
    }

    #[test]
    fn zero_is_not_a_serial() {
        assert!(Serial::from_be_bytes(&[0, 0]).is_err());
    }

    #[test]
    fn hex_text_form() {
        let serial = Serial::from_be_bytes(&[0x0a, 0xbc]).unwrap();
        assert_eq!(serial.to_string(), "0abc");
        assert_eq!("0abc".parse::<Serial>().unwrap(), serial);
        assert!("abc".parse::<Serial>().is_err());
    }

    #[test]
    fn random_serials_carry_no_counter() {
        for _ in 0..64 {
            let serial = Serial::random().unwrap();
            assert_eq!(serial.as_bytes().len(), SERIAL_LEN);
            assert_eq!(serial.counter(), None);
        }
    }

    #[test]
    fn x509_serial_keeps_value() {
        let serial = Serial::random().unwrap();
        let encoded = serial.to_x509().unwrap();
        assert_eq!(Serial::from_x509(&encoded).unwrap(), serial);
    }
}
