//! Per-device connection state machine.
//!
//! ```text
//! Disconnected ──Connect──▶ Connecting ──SLC──▶ Connected(Idle)
//!       ▲                       │                 │      ▲
//!       └──────down/timeout─────┘     AudioConnecting ◀─▶ AudioConnected
//!       ▲                                                 │
//!       └─────── Disconnecting ◀──Disconnect──   AudioDisconnecting
//! ```
//!
//! Every event is run to completion through [`Session::handle`]. A state
//! handler answers with an [`Outcome`]; `Connected` phases try their own
//! handler first and fall back to the shared `Connected` handler.
//!
//! Transient states defer what they cannot serve yet. Deferred events
//! wait in a per-device FIFO and are put back at the front of the inbox,
//! in their original order, on the next entry into a stable state.

use hfp_at_protocol::CODEC_CVSD;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::collaborators::DeviceIo;
use crate::config::LocalCapabilities;
use crate::context::ConnectionContext;
use crate::events::Notification;
use crate::profile::{Intent, Profile, ProfileSignal};
use crate::telemetry::metric_defs;
use crate::timer::TimerKind;
use crate::types::{AudioState, ConnectionState, DeviceAddress, Role};

// ============================================================================
// States and events
// ============================================================================

/// Audio phase of a connected device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioPhase {
    Idle,
    AudioConnecting,
    AudioConnected,
    AudioDisconnecting,
}

/// Leaf state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Disconnected,
    Connecting,
    Disconnecting,
    Connected(AudioPhase),
}

impl State {
    /// Stable states replay deferred events on entry.
    pub fn is_stable(&self) -> bool {
        matches!(
            self,
            State::Disconnected
                | State::Connected(AudioPhase::Idle)
                | State::Connected(AudioPhase::AudioConnected)
        )
    }

    pub fn connection_state(&self) -> ConnectionState {
        match self {
            State::Disconnected => ConnectionState::Disconnected,
            State::Connecting => ConnectionState::Connecting,
            State::Disconnecting => ConnectionState::Disconnecting,
            State::Connected(_) => ConnectionState::Connected,
        }
    }

    pub fn audio_state(&self) -> AudioState {
        match self {
            State::Connected(AudioPhase::AudioConnecting) => AudioState::Connecting,
            State::Connected(AudioPhase::AudioConnected) => AudioState::Connected,
            State::Connected(AudioPhase::AudioDisconnecting) => AudioState::Disconnecting,
            _ => AudioState::Disconnected,
        }
    }

    /// Budget of a transient state; `None` for stable states.
    fn timeout(&self, local: &LocalCapabilities) -> Option<Duration> {
        match self {
            State::Connecting | State::Disconnecting => Some(local.connection_timeout),
            State::Connected(AudioPhase::AudioConnecting)
            | State::Connected(AudioPhase::AudioDisconnecting) => Some(local.audio_timeout),
            _ => None,
        }
    }
}

/// Input to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connect,
    InboundConnect,
    Disconnect,
    ConnectAudio,
    DisconnectAudio,
    InboundAudioRequest,
    DiscoveryComplete { features: Option<u32> },
    DiscoveryFailed,
    TransportConnected,
    TransportConnectFailed,
    TransportDisconnected,
    TransportData(Vec<u8>),
    AudioConnected,
    AudioConnectFailed,
    AudioDisconnected,
    AudioDisconnectFailed,
    SlcEstablished,
    ConnectionTimeout,
    ResponseTimeout,
    Intent(Intent),
}

/// What a state handler did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Handled,
    Transition(State),
    Defer,
    /// Keep the event for later and move on.
    DeferAndTransition(State),
    Unhandled,
}

// ============================================================================
// Session
// ============================================================================

/// State machine, negotiated context and profile of one device.
#[derive(Debug)]
pub struct Session {
    state: State,
    context: ConnectionContext,
    profile: Profile,
    inbox: VecDeque<SessionEvent>,
    deferred: VecDeque<SessionEvent>,
}

impl Session {
    pub fn new(address: DeviceAddress, role: Role, local: Arc<LocalCapabilities>) -> Self {
        let profile = Profile::new(local.response_timeout);
        Session {
            state: State::Disconnected,
            context: ConnectionContext::new(address, role, local),
            profile,
            inbox: VecDeque::new(),
            deferred: VecDeque::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Back in Disconnected with nothing left to do.
    pub fn is_settled(&self) -> bool {
        self.state == State::Disconnected && self.inbox.is_empty() && self.deferred.is_empty()
    }

    /// Run an event, and everything it raises, to completion.
    pub fn handle(&mut self, event: SessionEvent, io: &mut DeviceIo<'_>) {
        self.inbox.push_back(event);
        while let Some(event) = self.inbox.pop_front() {
            trace!("Session[{}]: {:?} in {:?}", io.address, event, self.state);
            if matches!(event, SessionEvent::ResponseTimeout) {
                self.profile.on_response_timeout(io);
            }
            match self.dispatch(&event, io) {
                Outcome::Handled => {}
                Outcome::Transition(next) => self.transition(next, io),
                Outcome::Defer => self.defer(event, io),
                Outcome::DeferAndTransition(next) => {
                    self.defer(event, io);
                    self.transition(next, io);
                }
                Outcome::Unhandled => self.reject(event, io),
            }
        }
    }

    fn dispatch(&mut self, event: &SessionEvent, io: &mut DeviceIo<'_>) -> Outcome {
        match self.state {
            State::Disconnected => self.disconnected(event, io),
            State::Connecting => self.connecting(event, io),
            State::Disconnecting => self.disconnecting(event, io),
            State::Connected(phase) => {
                let outcome = match phase {
                    AudioPhase::Idle => Outcome::Unhandled,
                    AudioPhase::AudioConnecting => self.audio_connecting(event, io),
                    AudioPhase::AudioConnected => self.audio_connected(event, io),
                    AudioPhase::AudioDisconnecting => self.audio_disconnecting(event),
                };
                match outcome {
                    Outcome::Unhandled => self.connected(event, io),
                    other => other,
                }
            }
        }
    }

    fn defer(&mut self, event: SessionEvent, io: &mut DeviceIo<'_>) {
        debug!("Session[{}]: deferring {:?} in {:?}", io.address, event, self.state);
        metrics::counter!(metric_defs::EVENTS_DEFERRED.name).increment(1);
        self.deferred.push_back(event);
    }

    fn reject(&mut self, event: SessionEvent, io: &mut DeviceIo<'_>) {
        match event {
            SessionEvent::Intent(intent) => {
                debug!("Session[{}]: rejecting {} in {:?}", io.address, intent, self.state);
                io.events.send(Notification::IntentRejected {
                    address: io.address,
                    reason: format!("{} not possible while {:?}", intent, self.state),
                });
            }
            other => debug!("Session[{}]: ignoring {:?} in {:?}", io.address, other, self.state),
        }
    }

    fn transition(&mut self, next: State, io: &mut DeviceIo<'_>) {
        let previous = self.state;
        if previous == next {
            return;
        }
        info!("Session[{}]: {:?} -> {:?}", io.address, previous, next);

        if previous.timeout(self.context.local()).is_some() {
            io.cancel_timer(TimerKind::Connection);
        }
        self.state = next;
        if let Some(timeout) = next.timeout(self.context.local()) {
            io.start_timer(TimerKind::Connection, timeout);
        }

        if previous.connection_state() != next.connection_state() {
            io.events.send(Notification::ConnectionStateChanged {
                address: io.address,
                state: next.connection_state(),
            });
        }
        if previous.audio_state() != next.audio_state() {
            io.events.send(Notification::AudioStateChanged {
                address: io.address,
                state: next.audio_state(),
            });
        }

        if next == State::Disconnected {
            self.profile.reset(io);
            self.context.reset();
        }

        if next.is_stable() && !self.deferred.is_empty() {
            let deferred = std::mem::take(&mut self.deferred);
            debug!("Session[{}]: replaying {} deferred events", io.address, deferred.len());
            for event in deferred.into_iter().rev() {
                self.inbox.push_front(event);
            }
        }
    }

    fn handle_data(&mut self, data: &[u8], io: &mut DeviceIo<'_>) {
        for signal in self.profile.handle_data(data, io, &mut self.context) {
            match signal {
                ProfileSignal::SlcEstablished => self.inbox.push_back(SessionEvent::SlcEstablished),
                ProfileSignal::CodecNegotiated(codec) => {
                    debug!("Session[{}]: codec {} negotiated", io.address, codec)
                }
                ProfileSignal::CodecConnectionRejected => {
                    warn!("Session[{}]: AG refused codec connection", io.address);
                    self.inbox.push_back(SessionEvent::AudioConnectFailed);
                }
            }
        }
    }

    fn refuse_inbound(&self, io: &mut DeviceIo<'_>) -> Outcome {
        debug!("Session[{}]: refusing inbound connection in {:?}", io.address, self.state);
        if let Err(e) = io.transport.reject(io.address) {
            warn!("Session[{}]: reject failed: {}", io.address, e);
        }
        Outcome::Handled
    }

    fn close_transport(&self, io: &mut DeviceIo<'_>) {
        if let Err(e) = io.transport.disconnect(io.address) {
            warn!("Session[{}]: transport disconnect failed: {}", io.address, e);
        }
    }

    // ========================================================================
    // State handlers
    // ========================================================================

    fn disconnected(&mut self, event: &SessionEvent, io: &mut DeviceIo<'_>) -> Outcome {
        match event {
            SessionEvent::Connect => {
                self.context.role = Role::Initiator;
                match io.discovery.do_discovery(io.address, Role::Initiator) {
                    Ok(()) => Outcome::Transition(State::Connecting),
                    Err(e) => {
                        warn!("Session[{}]: discovery failed to start: {}", io.address, e);
                        Outcome::Handled
                    }
                }
            }
            SessionEvent::InboundConnect => {
                self.context.role = Role::Acceptor;
                if let Err(e) = io.transport.accept(io.address) {
                    warn!("Session[{}]: accept failed: {}", io.address, e);
                    return self.refuse_inbound(io);
                }
                if let Err(e) = io.discovery.do_discovery(io.address, Role::Acceptor) {
                    debug!("Session[{}]: continuing without discovery: {}", io.address, e);
                }
                Outcome::Transition(State::Connecting)
            }
            SessionEvent::Disconnect
            | SessionEvent::ConnectAudio
            | SessionEvent::DisconnectAudio
            | SessionEvent::Intent(_) => Outcome::Unhandled,
            _ => Outcome::Handled,
        }
    }

    fn connecting(&mut self, event: &SessionEvent, io: &mut DeviceIo<'_>) -> Outcome {
        match event {
            SessionEvent::DiscoveryComplete { features } => {
                self.context.set_sdp_features(*features);
                if self.context.role == Role::Initiator {
                    if let Err(e) = io.transport.connect(io.address) {
                        warn!("Session[{}]: transport connect failed: {}", io.address, e);
                        return Outcome::Transition(State::Disconnected);
                    }
                }
                Outcome::Handled
            }
            SessionEvent::DiscoveryFailed => {
                warn!("Session[{}]: discovery failed", io.address);
                if self.context.role == Role::Acceptor {
                    self.close_transport(io);
                }
                Outcome::Transition(State::Disconnected)
            }
            SessionEvent::TransportConnected => match self.profile.start_slc(io, &self.context) {
                Ok(()) => Outcome::Handled,
                Err(e) => {
                    warn!("Session[{}]: SLC setup failed to start: {}", io.address, e);
                    self.close_transport(io);
                    Outcome::Transition(State::Disconnected)
                }
            },
            SessionEvent::TransportData(data) => {
                self.handle_data(data, io);
                Outcome::Handled
            }
            SessionEvent::SlcEstablished => Outcome::Transition(State::Connected(AudioPhase::Idle)),
            SessionEvent::TransportConnectFailed | SessionEvent::TransportDisconnected => {
                Outcome::Transition(State::Disconnected)
            }
            SessionEvent::ConnectionTimeout | SessionEvent::ResponseTimeout => {
                warn!("Session[{}]: connection setup timed out", io.address);
                self.close_transport(io);
                Outcome::Transition(State::Disconnected)
            }
            SessionEvent::InboundConnect => self.refuse_inbound(io),
            SessionEvent::Connect
            | SessionEvent::Disconnect
            | SessionEvent::ConnectAudio
            | SessionEvent::DisconnectAudio
            | SessionEvent::InboundAudioRequest
            | SessionEvent::Intent(_) => Outcome::Defer,
            _ => Outcome::Handled,
        }
    }

    fn disconnecting(&mut self, event: &SessionEvent, io: &mut DeviceIo<'_>) -> Outcome {
        match event {
            SessionEvent::TransportDisconnected => Outcome::Transition(State::Disconnected),
            SessionEvent::ConnectionTimeout => {
                warn!("Session[{}]: disconnect timed out", io.address);
                Outcome::Transition(State::Connected(AudioPhase::Idle))
            }
            SessionEvent::InboundConnect => self.refuse_inbound(io),
            SessionEvent::Connect
            | SessionEvent::ConnectAudio
            | SessionEvent::DisconnectAudio
            | SessionEvent::InboundAudioRequest
            | SessionEvent::Intent(_) => Outcome::Defer,
            _ => Outcome::Handled,
        }
    }

    /// Shared handler of every `Connected` phase.
    fn connected(&mut self, event: &SessionEvent, io: &mut DeviceIo<'_>) -> Outcome {
        match event {
            SessionEvent::TransportData(data) => {
                self.handle_data(data, io);
                Outcome::Handled
            }
            SessionEvent::Intent(intent) => {
                if let Err(e) = self.profile.execute(intent, io, &mut self.context) {
                    warn!("Session[{}]: {} failed: {}", io.address, intent, e);
                    io.events.send(Notification::IntentRejected {
                        address: io.address,
                        reason: e.to_string(),
                    });
                }
                Outcome::Handled
            }
            SessionEvent::ResponseTimeout => {
                self.inbox.push_back(SessionEvent::Disconnect);
                Outcome::Handled
            }
            SessionEvent::Disconnect => match io.transport.disconnect(io.address) {
                Ok(()) => Outcome::Transition(State::Disconnecting),
                Err(e) => {
                    warn!("Session[{}]: transport disconnect failed: {}", io.address, e);
                    Outcome::Transition(State::Disconnected)
                }
            },
            SessionEvent::TransportDisconnected => Outcome::Transition(State::Disconnected),
            SessionEvent::ConnectAudio => self.start_audio(io),
            SessionEvent::InboundAudioRequest => {
                match io.audio.accept_audio_connection(io.address, self.context.negotiated_codec) {
                    Ok(()) => Outcome::Transition(State::Connected(AudioPhase::AudioConnecting)),
                    Err(e) => {
                        warn!("Session[{}]: audio accept failed: {}", io.address, e);
                        Outcome::Handled
                    }
                }
            }
            SessionEvent::AudioConnected => Outcome::Transition(State::Connected(AudioPhase::AudioConnected)),
            SessionEvent::InboundConnect => self.refuse_inbound(io),
            _ => Outcome::Handled,
        }
    }

    /// Local audio request from `Connected(Idle)`.
    fn start_audio(&mut self, io: &mut DeviceIo<'_>) -> Outcome {
        let started = if self.context.codec_negotiation_supported() {
            self.profile.request_codec_connection(io)
        } else {
            io.audio.connect_audio(io.address, CODEC_CVSD)
        };
        match started {
            Ok(()) => Outcome::Transition(State::Connected(AudioPhase::AudioConnecting)),
            Err(e) => {
                warn!("Session[{}]: audio connect failed: {}", io.address, e);
                Outcome::Handled
            }
        }
    }

    fn audio_connecting(&mut self, event: &SessionEvent, io: &mut DeviceIo<'_>) -> Outcome {
        match event {
            SessionEvent::AudioConnected => Outcome::Transition(State::Connected(AudioPhase::AudioConnected)),
            SessionEvent::AudioConnectFailed | SessionEvent::ConnectionTimeout => {
                Outcome::Transition(State::Connected(AudioPhase::Idle))
            }
            SessionEvent::TransportDisconnected => {
                Outcome::DeferAndTransition(State::Connected(AudioPhase::Idle))
            }
            SessionEvent::InboundAudioRequest => {
                if let Err(e) = io.audio.accept_audio_connection(io.address, self.context.negotiated_codec) {
                    warn!("Session[{}]: audio accept failed: {}", io.address, e);
                    return Outcome::Transition(State::Connected(AudioPhase::Idle));
                }
                Outcome::Handled
            }
            SessionEvent::ConnectAudio => Outcome::Handled,
            SessionEvent::DisconnectAudio | SessionEvent::Disconnect => Outcome::Defer,
            _ => Outcome::Unhandled,
        }
    }

    fn audio_connected(&mut self, event: &SessionEvent, io: &mut DeviceIo<'_>) -> Outcome {
        match event {
            SessionEvent::DisconnectAudio => match io.audio.disconnect_audio(io.address) {
                Ok(()) => Outcome::Transition(State::Connected(AudioPhase::AudioDisconnecting)),
                Err(e) => {
                    warn!("Session[{}]: audio disconnect failed: {}", io.address, e);
                    Outcome::Handled
                }
            },
            SessionEvent::AudioDisconnected => Outcome::Transition(State::Connected(AudioPhase::Idle)),
            SessionEvent::TransportDisconnected | SessionEvent::Disconnect => {
                match io.audio.disconnect_audio(io.address) {
                    Ok(()) => Outcome::DeferAndTransition(State::Connected(AudioPhase::AudioDisconnecting)),
                    Err(e) => {
                        warn!("Session[{}]: audio teardown failed: {}", io.address, e);
                        Outcome::DeferAndTransition(State::Connected(AudioPhase::Idle))
                    }
                }
            }
            SessionEvent::ConnectAudio | SessionEvent::InboundAudioRequest => Outcome::Handled,
            _ => Outcome::Unhandled,
        }
    }

    fn audio_disconnecting(&mut self, event: &SessionEvent) -> Outcome {
        match event {
            SessionEvent::AudioDisconnected => Outcome::Transition(State::Connected(AudioPhase::Idle)),
            SessionEvent::AudioDisconnectFailed | SessionEvent::ConnectionTimeout => {
                Outcome::Transition(State::Connected(AudioPhase::AudioConnected))
            }
            SessionEvent::ConnectAudio | SessionEvent::Disconnect | SessionEvent::TransportDisconnected => {
                Outcome::Defer
            }
            SessionEvent::DisconnectAudio => Outcome::Handled,
            _ => Outcome::Unhandled,
        }
    }
}
