//! Core value types shared across the HF engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::HfError;

// ============================================================================
// Device Address
// ============================================================================

/// Bluetooth device address of a remote AG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceAddress(pub [u8; 6]);

impl DeviceAddress {
    /// Create an address from its six bytes, most significant first.
    pub const fn new(bytes: [u8; 6]) -> Self {
        DeviceAddress(bytes)
    }

    /// Raw address bytes.
    pub fn bytes(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for DeviceAddress {
    type Err = HfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || HfError::InvalidArgument(format!("invalid device address '{}'", s));
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(DeviceAddress(bytes))
    }
}

// ============================================================================
// Roles and States
// ============================================================================

/// Which side opened the service level connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The local HF initiated the connection.
    Initiator,
    /// The remote AG initiated the connection.
    Acceptor,
}

/// Service level connection state as reported to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Audio (SCO) link state as reported to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Which gain a volume report or request refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeKind {
    Speaker,
    Microphone,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for AudioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// Time
// ============================================================================

/// Monotonic time in milliseconds, supplied by the dispatcher's driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Time zero.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Create from milliseconds.
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    /// Create from seconds.
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs * 1000)
    }

    /// Milliseconds since time zero.
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// This timestamp moved forward by `duration`, saturating.
    pub fn after(&self, duration: Duration) -> Timestamp {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_add(millis))
    }

    /// Time elapsed since `earlier`, zero if `earlier` is later.
    pub fn since(&self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}s", self.0 / 1000, self.0 % 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display_and_parse() {
        let addr: DeviceAddress = "00:1A:7d:DA:71:13".parse().unwrap();
        assert_eq!(addr, DeviceAddress::new([0x00, 0x1A, 0x7D, 0xDA, 0x71, 0x13]));
        assert_eq!(addr.to_string(), "00:1A:7D:DA:71:13");
    }

    #[test]
    fn test_address_parse_rejects_garbage() {
        assert!("00:1A:7D:DA:71".parse::<DeviceAddress>().is_err());
        assert!("00:1A:7D:DA:71:13:00".parse::<DeviceAddress>().is_err());
        assert!("00:1A:7D:DA:71:ZZ".parse::<DeviceAddress>().is_err());
        assert!("001A7DDA7113".parse::<DeviceAddress>().is_err());
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let t = Timestamp::from_secs(2);
        assert_eq!(t.after(Duration::from_millis(500)).as_millis(), 2500);
        assert_eq!(t.since(Timestamp::from_millis(1500)), Duration::from_millis(500));
        assert_eq!(Timestamp::ZERO.since(t), Duration::ZERO);
        assert_eq!(t.to_string(), "2.000s");
    }
}
