//! Notifications to the owning application.

use crossbeam_channel::{Receiver, Sender};
use hfp_at_protocol::AtCommandId;

use crate::call_manager::Call;
use crate::error::CommandErrorKind;
use crate::indicators::AgIndicatorKind;
use crate::types::{AudioState, ConnectionState, DeviceAddress, VolumeKind};

/// Something the application should know about.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    ConnectionStateChanged {
        address: DeviceAddress,
        state: ConnectionState,
    },
    AudioStateChanged {
        address: DeviceAddress,
        state: AudioState,
    },
    /// A call was added, changed or finished.
    CallChanged {
        address: DeviceAddress,
        call: Call,
    },
    /// An AG indicator took a new value.
    IndicatorChanged {
        address: DeviceAddress,
        indicator: AgIndicatorKind,
        value: i32,
    },
    OperatorName {
        address: DeviceAddress,
        name: String,
    },
    SubscriberNumber {
        address: DeviceAddress,
        number: String,
        number_type: u16,
    },
    InBandRing {
        address: DeviceAddress,
        enabled: bool,
    },
    VoiceRecognition {
        address: DeviceAddress,
        active: bool,
    },
    Volume {
        address: DeviceAddress,
        kind: VolumeKind,
        level: u8,
    },
    ResponseHold {
        address: DeviceAddress,
        status: i32,
    },
    Ring {
        address: DeviceAddress,
    },
    /// `+CLIP` for the ringing call.
    CallingLine {
        address: DeviceAddress,
        number: String,
    },
    /// `+CCWA` for a waiting call.
    CallWaiting {
        address: DeviceAddress,
        number: String,
    },
    CodecNegotiated {
        address: DeviceAddress,
        codec: u8,
    },
    HfIndicatorEnabled {
        address: DeviceAddress,
        anum: u16,
        enabled: bool,
    },
    /// The AG closed a command sent for an intent.
    CommandResult {
        address: DeviceAddress,
        command: AtCommandId,
        result: Result<(), CommandErrorKind>,
    },
    /// An intent could not be carried out.
    IntentRejected {
        address: DeviceAddress,
        reason: String,
    },
}

impl Notification {
    /// Device the notification is about.
    pub fn address(&self) -> DeviceAddress {
        match self {
            Notification::ConnectionStateChanged { address, .. }
            | Notification::AudioStateChanged { address, .. }
            | Notification::CallChanged { address, .. }
            | Notification::IndicatorChanged { address, .. }
            | Notification::OperatorName { address, .. }
            | Notification::SubscriberNumber { address, .. }
            | Notification::InBandRing { address, .. }
            | Notification::VoiceRecognition { address, .. }
            | Notification::Volume { address, .. }
            | Notification::ResponseHold { address, .. }
            | Notification::Ring { address }
            | Notification::CallingLine { address, .. }
            | Notification::CallWaiting { address, .. }
            | Notification::CodecNegotiated { address, .. }
            | Notification::HfIndicatorEnabled { address, .. }
            | Notification::CommandResult { address, .. }
            | Notification::IntentRejected { address, .. } => *address,
        }
    }
}

/// Hands notifications to the application over a channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<Notification>,
}

impl EventSender {
    pub fn new(tx: Sender<Notification>) -> Self {
        EventSender { tx }
    }

    /// Create a sender together with an unbounded receiving end.
    pub fn channel() -> (EventSender, Receiver<Notification>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (EventSender::new(tx), rx)
    }

    /// Deliver a notification. A closed channel drops it.
    pub fn send(&self, notification: Notification) {
        tracing::trace!("EventSender[{}]: {:?}", notification.address(), notification);
        if self.tx.send(notification).is_err() {
            tracing::debug!("EventSender: receiver dropped, notification discarded");
        }
    }
}
