//! 128-bit GATT UUIDs.
//!
//! Held as a `u128` in big-endian reading order (the way the UUID is
//! written), so `0x12345678_1234_…` literals and the textual
//! `12345678-1234-…` form describe the same value.  Bluedroid wants the
//! little-endian byte array; see [`Uuid128::to_le_bytes`].

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default BeamLink service UUID.
pub const DEFAULT_SERVICE_UUID: Uuid128 = Uuid128(0x12345678_1234_1234_1234_1234567890ab);

/// Default BeamLink characteristic UUID.
pub const DEFAULT_CHARACTERISTIC_UUID: Uuid128 = Uuid128(0x12345678_1234_1234_1234_1234567890ac);

const TEXT_LEN: usize = 36;
const DASHES: [usize; 4] = [8, 13, 18, 23];

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uuid128(u128);

impl Uuid128 {
    pub const fn from_u128(v: u128) -> Self {
        Self(v)
    }

    pub const fn as_u128(self) -> u128 {
        self.0
    }

    /// Byte order used by the ESP-IDF `esp_bt_uuid_t` union.
    pub const fn to_le_bytes(self) -> [u8; 16] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for Uuid128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            (v & 0xFFFF_FFFF_FFFF) as u64,
        )
    }
}

impl fmt::Debug for Uuid128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uuid128({self})")
    }
}

impl FromStr for Uuid128 {
    type Err = UuidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != TEXT_LEN {
            return Err(UuidParseError(()));
        }

        let mut value: u128 = 0;
        for (i, &c) in bytes.iter().enumerate() {
            if DASHES.contains(&i) {
                if c != b'-' {
                    return Err(UuidParseError(()));
                }
                continue;
            }
            let digit = match c {
                b'0'..=b'9' => c - b'0',
                b'a'..=b'f' => c - b'a' + 10,
                b'A'..=b'F' => c - b'A' + 10,
                _ => return Err(UuidParseError(())),
            };
            value = (value << 4) | u128::from(digit);
        }
        Ok(Self(value))
    }
}

impl TryFrom<String> for Uuid128 {
    type Error = UuidParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Uuid128> for String {
    fn from(u: Uuid128) -> Self {
        u.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UuidParseError(());

impl fmt::Display for UuidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid UUID string (expected 8-4-4-4-12 hex)")
    }
}

impl std::error::Error for UuidParseError {}
