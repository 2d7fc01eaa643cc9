//! The HF service: a single-threaded dispatcher over all device sessions.
//!
//! Transport callbacks, collaborator completions and application intents
//! all arrive as [`Message`]s and are handled one at a time, each run to
//! completion. Time only moves when the driver calls
//! [`HfService::advance_to`]; [`HfService::next_deadline`] tells it when
//! the next timer is due.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::call_manager::Call;
use crate::collaborators::{AudioLink, DeviceIo, Discovery, Transport};
use crate::config::{HfConfig, LocalCapabilities};
use crate::context::ConnectionContext;
use crate::error::{HfError, Result};
use crate::events::{EventSender, Notification};
use crate::profile::{check_features, Intent};
use crate::state_machine::{Session, SessionEvent, State};
use crate::telemetry::metric_defs;
use crate::timer::{TimerKind, TimerQueue};
use crate::types::{AudioState, ConnectionState, DeviceAddress, Role, Timestamp};

/// Input to the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    // ========== Application requests ==========
    Connect(DeviceAddress),
    Disconnect(DeviceAddress),
    ConnectAudio(DeviceAddress),
    DisconnectAudio(DeviceAddress),
    Intent { address: DeviceAddress, intent: Intent },
    /// Drop a device and everything known about it.
    RemoveDevice(DeviceAddress),

    // ========== Collaborator completions ==========
    InboundConnect(DeviceAddress),
    InboundAudioRequest(DeviceAddress),
    DiscoveryComplete { address: DeviceAddress, features: Option<u32> },
    DiscoveryFailed(DeviceAddress),
    TransportConnected(DeviceAddress),
    TransportConnectFailed(DeviceAddress),
    TransportDisconnected(DeviceAddress),
    TransportData { address: DeviceAddress, data: Vec<u8> },
    AudioConnected(DeviceAddress),
    AudioConnectFailed(DeviceAddress),
    AudioDisconnected(DeviceAddress),
    AudioDisconnectFailed(DeviceAddress),
}

impl Message {
    /// Device the message is about.
    pub fn address(&self) -> DeviceAddress {
        match self {
            Message::Connect(a)
            | Message::Disconnect(a)
            | Message::ConnectAudio(a)
            | Message::DisconnectAudio(a)
            | Message::RemoveDevice(a)
            | Message::InboundConnect(a)
            | Message::InboundAudioRequest(a)
            | Message::DiscoveryFailed(a)
            | Message::TransportConnected(a)
            | Message::TransportConnectFailed(a)
            | Message::TransportDisconnected(a)
            | Message::AudioConnected(a)
            | Message::AudioConnectFailed(a)
            | Message::AudioDisconnected(a)
            | Message::AudioDisconnectFailed(a) => *a,
            Message::Intent { address, .. }
            | Message::DiscoveryComplete { address, .. }
            | Message::TransportData { address, .. } => *address,
        }
    }

    fn into_event(self) -> Option<SessionEvent> {
        let event = match self {
            Message::Connect(_) => SessionEvent::Connect,
            Message::Disconnect(_) => SessionEvent::Disconnect,
            Message::ConnectAudio(_) => SessionEvent::ConnectAudio,
            Message::DisconnectAudio(_) => SessionEvent::DisconnectAudio,
            Message::Intent { intent, .. } => SessionEvent::Intent(intent),
            Message::RemoveDevice(_) => return None,
            Message::InboundConnect(_) => SessionEvent::InboundConnect,
            Message::InboundAudioRequest(_) => SessionEvent::InboundAudioRequest,
            Message::DiscoveryComplete { features, .. } => SessionEvent::DiscoveryComplete { features },
            Message::DiscoveryFailed(_) => SessionEvent::DiscoveryFailed,
            Message::TransportConnected(_) => SessionEvent::TransportConnected,
            Message::TransportConnectFailed(_) => SessionEvent::TransportConnectFailed,
            Message::TransportDisconnected(_) => SessionEvent::TransportDisconnected,
            Message::TransportData { data, .. } => SessionEvent::TransportData(data),
            Message::AudioConnected(_) => SessionEvent::AudioConnected,
            Message::AudioConnectFailed(_) => SessionEvent::AudioConnectFailed,
            Message::AudioDisconnected(_) => SessionEvent::AudioDisconnected,
            Message::AudioDisconnectFailed(_) => SessionEvent::AudioDisconnectFailed,
        };
        Some(event)
    }
}

/// One HF instance serving any number of AGs.
pub struct HfService {
    local: Arc<LocalCapabilities>,
    sessions: BTreeMap<DeviceAddress, Session>,
    timers: TimerQueue,
    transport: Box<dyn Transport>,
    discovery: Box<dyn Discovery>,
    audio: Box<dyn AudioLink>,
    events: EventSender,
    now: Timestamp,
}

impl HfService {
    /// Create a service. Fails if the configuration does not validate.
    pub fn new(
        config: &HfConfig,
        transport: Box<dyn Transport>,
        discovery: Box<dyn Discovery>,
        audio: Box<dyn AudioLink>,
        events: EventSender,
    ) -> Result<Self> {
        let local = Arc::new(config.capabilities()?);
        info!("HfService: local features {:#x}, codecs {:?}", local.features, local.codecs);
        Ok(HfService {
            local,
            sessions: BTreeMap::new(),
            timers: TimerQueue::new(),
            transport,
            discovery,
            audio,
            events,
            now: Timestamp::ZERO,
        })
    }

    pub fn local(&self) -> &LocalCapabilities {
        &self.local
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Handle one message to completion.
    pub fn handle(&mut self, message: Message) {
        let address = message.address();
        if let Message::RemoveDevice(_) = message {
            self.remove(address);
            return;
        }

        if !self.sessions.contains_key(&address) {
            let role = match &message {
                Message::Connect(_) => Role::Initiator,
                Message::InboundConnect(_) => Role::Acceptor,
                Message::Intent { .. } => {
                    self.events.send(Notification::IntentRejected {
                        address,
                        reason: HfError::UnknownDevice(address).to_string(),
                    });
                    return;
                }
                other => {
                    debug!("HfService: {:?} for unknown device {}", other, address);
                    return;
                }
            };
            debug!("HfService: new session for {}", address);
            self.sessions
                .insert(address, Session::new(address, role, Arc::clone(&self.local)));
        }

        if let Some(event) = message.into_event() {
            self.dispatch(address, event);
        }
    }

    fn dispatch(&mut self, address: DeviceAddress, event: SessionEvent) {
        let HfService {
            sessions,
            timers,
            transport,
            discovery,
            audio,
            events,
            now,
            ..
        } = self;
        let Some(session) = sessions.get_mut(&address) else {
            return;
        };
        let mut io = DeviceIo {
            address,
            now: *now,
            transport: &mut **transport,
            discovery: &mut **discovery,
            audio: &mut **audio,
            timers: &mut *timers,
            events: &*events,
        };
        session.handle(event, &mut io);

        if session.is_settled() {
            debug!("HfService: releasing session for {}", address);
            timers.cancel_all(address);
            sessions.remove(&address);
        }
        self.update_connected_gauge();
    }

    /// Move time forward and fire every timer that is due.
    pub fn advance_to(&mut self, now: Timestamp) {
        if now > self.now {
            self.now = now;
        }
        for (address, kind) in self.timers.pop_expired(self.now) {
            let event = match kind {
                TimerKind::Response => SessionEvent::ResponseTimeout,
                TimerKind::Connection => SessionEvent::ConnectionTimeout,
            };
            self.dispatch(address, event);
        }
    }

    /// When the next timer is due, if any.
    pub fn next_deadline(&mut self) -> Option<Timestamp> {
        self.timers.next_deadline()
    }

    fn remove(&mut self, address: DeviceAddress) {
        if let Some(session) = self.sessions.get(&address) {
            if session.state() != State::Disconnected {
                if let Err(e) = self.transport.disconnect(address) {
                    debug!("HfService: disconnect of removed device {} failed: {}", address, e);
                }
            }
            self.timers.cancel_all(address);
            self.sessions.remove(&address);
            info!("HfService: removed {}", address);
            self.update_connected_gauge();
        }
    }

    fn update_connected_gauge(&self) {
        let connected = self
            .sessions
            .values()
            .filter(|s| s.state().connection_state() == ConnectionState::Connected)
            .count();
        metrics::gauge!(metric_defs::DEVICES_CONNECTED.name).set(connected as f64);
    }

    // ========================================================================
    // Application API
    // ========================================================================

    /// Connect to an AG.
    pub fn connect(&mut self, address: DeviceAddress) {
        self.handle(Message::Connect(address));
    }

    /// Disconnect from an AG.
    pub fn disconnect(&mut self, address: DeviceAddress) -> Result<()> {
        self.require_session(address)?;
        self.handle(Message::Disconnect(address));
        Ok(())
    }

    /// Open the audio link to a connected AG.
    pub fn connect_audio(&mut self, address: DeviceAddress) -> Result<()> {
        self.require_session(address)?;
        self.handle(Message::ConnectAudio(address));
        Ok(())
    }

    /// Close the audio link to an AG.
    pub fn disconnect_audio(&mut self, address: DeviceAddress) -> Result<()> {
        self.require_session(address)?;
        self.handle(Message::DisconnectAudio(address));
        Ok(())
    }

    /// Carry out an intent. Arguments and, once connected, negotiated
    /// features are checked before anything is queued; the AG's answer
    /// arrives later as [`Notification::CommandResult`].
    pub fn execute(&mut self, address: DeviceAddress, intent: Intent) -> Result<()> {
        intent.validate()?;
        let session = self.require_session(address)?;
        if session.context().slc_established {
            check_features(&intent, session.context())?;
        }
        self.handle(Message::Intent { address, intent });
        Ok(())
    }

    fn require_session(&self, address: DeviceAddress) -> Result<&Session> {
        self.sessions.get(&address).ok_or(HfError::UnknownDevice(address))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Devices with a session, in address order.
    pub fn devices(&self) -> Vec<DeviceAddress> {
        self.sessions.keys().copied().collect()
    }

    pub fn session(&self, address: DeviceAddress) -> Option<&Session> {
        self.sessions.get(&address)
    }

    pub fn context(&self, address: DeviceAddress) -> Option<&ConnectionContext> {
        self.sessions.get(&address).map(Session::context)
    }

    pub fn connection_state(&self, address: DeviceAddress) -> ConnectionState {
        self.sessions
            .get(&address)
            .map_or(ConnectionState::Disconnected, |s| s.state().connection_state())
    }

    pub fn audio_state(&self, address: DeviceAddress) -> AudioState {
        self.sessions
            .get(&address)
            .map_or(AudioState::Disconnected, |s| s.state().audio_state())
    }

    /// Calls known for a device, in id order.
    pub fn current_calls(&self, address: DeviceAddress) -> Vec<Call> {
        self.sessions
            .get(&address)
            .map(|s| s.profile().calls().current_calls())
            .unwrap_or_default()
    }
}
