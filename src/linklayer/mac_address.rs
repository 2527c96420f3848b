//! IEEE 802-style 48-bit MAC addresses.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A 48-bit MAC address. Cheap to copy and hashable, so it can key the
/// learning table directly.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for MacAddress {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = text.split(':');
        for byte in &mut bytes {
            let part = parts
                .next()
                .ok_or_else(|| Error::InvalidInput(format!("bad MAC address '{text}'")))?;
            *byte = u8::from_str_radix(part, 16)
                .map_err(|_| Error::InvalidInput(format!("bad MAC address '{text}'")))?;
        }
        if parts.next().is_some() {
            return Err(Error::InvalidInput(format!("bad MAC address '{text}'")));
        }
        Ok(MacAddress(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_format_roundtrip() {
        let address: MacAddress = "0A:1B:2C:3D:4E:5F".parse().unwrap();
        assert_eq!(address.bytes(), [0x0A, 0x1B, 0x2C, 0x3D, 0x4E, 0x5F]);
        assert_eq!(address.to_string(), "0A:1B:2C:3D:4E:5F");
        assert!("0A:1B:2C".parse::<MacAddress>().is_err());
        assert!("0A:1B:2C:3D:4E:5F:60".parse::<MacAddress>().is_err());
        assert!("ZZ:1B:2C:3D:4E:5F".parse::<MacAddress>().is_err());
    }

    #[test]
    fn broadcast_detection() {
        assert!(MacAddress::BROADCAST.is_broadcast());
        assert!(!MacAddress::new([1, 2, 3, 4, 5, 6]).is_broadcast());
    }
}
