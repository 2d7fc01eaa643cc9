//! Seams to the lower layers.
//!
//! The engine never blocks on a collaborator. Calls only start an
//! operation; completions come back as [`Message`](crate::Message)s posted
//! to the service. An `Err` return means the operation could not be
//! started at all.

use std::time::Duration;

use crate::error::Result;
use crate::events::EventSender;
use crate::timer::{TimerKind, TimerQueue};
use crate::types::{DeviceAddress, Role, Timestamp};

/// Byte-stream connection to an AG (RFCOMM in a real stack).
pub trait Transport {
    /// Open a connection. Completes with `TransportConnected` or
    /// `TransportConnectFailed`.
    fn connect(&mut self, address: DeviceAddress) -> Result<()>;

    /// Close the connection. Completes with `TransportDisconnected`.
    fn disconnect(&mut self, address: DeviceAddress) -> Result<()>;

    /// Write bytes to an open connection.
    fn write(&mut self, address: DeviceAddress, data: &[u8]) -> Result<()>;

    /// Accept a connection the AG opened.
    fn accept(&mut self, address: DeviceAddress) -> Result<()>;

    /// Refuse a connection the AG opened.
    fn reject(&mut self, address: DeviceAddress) -> Result<()>;
}

/// Service discovery of the AG's HFP record.
pub trait Discovery {
    /// Start discovery. Completes with `DiscoveryComplete` or `DiscoveryFailed`.
    fn do_discovery(&mut self, address: DeviceAddress, role: Role) -> Result<()>;
}

/// Synchronous audio (SCO/eSCO) link.
pub trait AudioLink {
    /// Open an audio link. Completes with `AudioConnected` or `AudioConnectFailed`.
    fn connect_audio(&mut self, address: DeviceAddress, codec: u8) -> Result<()>;

    /// Accept an audio link the AG is opening.
    fn accept_audio_connection(&mut self, address: DeviceAddress, codec: u8) -> Result<()>;

    /// Close the audio link. Completes with `AudioDisconnected` or
    /// `AudioDisconnectFailed`.
    fn disconnect_audio(&mut self, address: DeviceAddress) -> Result<()>;
}

/// Everything a session may touch while handling one event.
pub struct DeviceIo<'a> {
    pub address: DeviceAddress,
    pub now: Timestamp,
    pub transport: &'a mut dyn Transport,
    pub discovery: &'a mut dyn Discovery,
    pub audio: &'a mut dyn AudioLink,
    pub timers: &'a mut TimerQueue,
    pub events: &'a EventSender,
}

impl DeviceIo<'_> {
    pub fn start_timer(&mut self, kind: TimerKind, after: Duration) {
        self.timers.start(self.address, kind, self.now, after);
    }

    pub fn cancel_timer(&mut self, kind: TimerKind) {
        self.timers.cancel(self.address, kind);
    }

    /// Write to this device's transport.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.transport.write(self.address, data)
    }
}
