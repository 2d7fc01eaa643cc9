//! HF profile facade.
//!
//! Turns application intents into AT commands, gated on the features both
//! sides negotiated, and republishes what the processor decodes as
//! [`Notification`]s. Call list snapshots are reconciled here through the
//! [`CallManager`].

use hfp_at_protocol::{AtCommand, AtCommandId, ChldAction, HF_FEATURE_REMOTE_VOLUME};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::call_manager::{Call, CallChange, CallManager};
use crate::collaborators::DeviceIo;
use crate::context::ConnectionContext;
use crate::error::{HfError, Result};
use crate::events::Notification;
use crate::processor::{CommandProcessor, ProcessorEvent};
use crate::types::VolumeKind;

/// Something the application asks the HF to do on a connected AG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Dial(String),
    MemoryDial(u32),
    Redial,
    Answer,
    HangUp,
    CallHold(ChldAction),
    SendDtmf(char),
    SetVolume { kind: VolumeKind, level: u8 },
    QueryCurrentCalls,
    QueryOperator,
    QuerySubscriberNumber,
    SetVoiceRecognition(bool),
    QueryResponseHold,
    SetResponseHold(u8),
    DisableEcnr,
    KeyPress,
    SendHfIndicator { anum: u16, value: u32 },
    Vendor(String),
}

impl Intent {
    /// The command this intent maps to, before feature checks.
    pub fn to_command(&self) -> AtCommand {
        match self {
            Intent::Dial(number) => AtCommand::Dial { number: number.clone() },
            Intent::MemoryDial(location) => AtCommand::MemoryDial { location: *location },
            Intent::Redial => AtCommand::Redial,
            Intent::Answer => AtCommand::Answer,
            Intent::HangUp => AtCommand::HangUp,
            Intent::CallHold(action) => AtCommand::CallHold { action: *action },
            Intent::SendDtmf(tone) => AtCommand::Dtmf { tone: *tone },
            Intent::SetVolume {
                kind: VolumeKind::Speaker,
                level,
            } => AtCommand::SpeakerVolume { level: *level },
            Intent::SetVolume {
                kind: VolumeKind::Microphone,
                level,
            } => AtCommand::MicrophoneVolume { level: *level },
            Intent::QueryCurrentCalls => AtCommand::ListCurrentCalls,
            Intent::QueryOperator => AtCommand::CopsRead,
            Intent::QuerySubscriberNumber => AtCommand::SubscriberNumber,
            Intent::SetVoiceRecognition(enable) => AtCommand::VoiceRecognition { enable: *enable },
            Intent::QueryResponseHold => AtCommand::BtrhRead,
            Intent::SetResponseHold(action) => AtCommand::BtrhSet { action: *action },
            Intent::DisableEcnr => AtCommand::Nrec { enable: false },
            Intent::KeyPress => AtCommand::KeyPress,
            Intent::SendHfIndicator { anum, value } => AtCommand::Biev {
                anum: *anum,
                value: *value,
            },
            Intent::Vendor(text) => AtCommand::Vendor { text: text.clone() },
        }
    }

    /// Reject arguments that can never be sent, independent of any
    /// connection.
    pub fn validate(&self) -> Result<()> {
        self.to_command()
            .validate()
            .map_err(|e| HfError::InvalidArgument(e.to_string()))
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_command())
    }
}

/// What the state machine needs to hear from the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSignal {
    SlcEstablished,
    CodecNegotiated(u8),
    /// The AG refused `AT+BCC`; no audio connection will follow.
    CodecConnectionRejected,
}

/// Per-connection profile: the command processor plus the call table.
#[derive(Debug)]
pub struct Profile {
    processor: CommandProcessor,
    calls: CallManager,
}

impl Profile {
    pub fn new(response_timeout: Duration) -> Self {
        Profile {
            processor: CommandProcessor::new(response_timeout),
            calls: CallManager::new(),
        }
    }

    pub fn processor(&self) -> &CommandProcessor {
        &self.processor
    }

    pub fn calls(&self) -> &CallManager {
        &self.calls
    }

    /// Transport is up: begin SLC setup.
    pub fn start_slc(&mut self, io: &mut DeviceIo<'_>, ctx: &ConnectionContext) -> Result<()> {
        self.processor.start_slc(io, ctx)
    }

    /// Bytes from the AG.
    pub fn handle_data(
        &mut self,
        data: &[u8],
        io: &mut DeviceIo<'_>,
        ctx: &mut ConnectionContext,
    ) -> Vec<ProfileSignal> {
        let events = self.processor.handle_data(data, io, ctx);
        self.publish(events, io, ctx)
    }

    /// Carry out an intent on an established connection.
    pub fn execute(&mut self, intent: &Intent, io: &mut DeviceIo<'_>, ctx: &mut ConnectionContext) -> Result<()> {
        if !ctx.slc_established {
            return Err(HfError::NotConnected(ctx.address));
        }
        intent.validate()?;
        check_features(intent, ctx)?;
        if let Intent::SendHfIndicator { anum, value } = intent {
            ctx.hf_indicators.set_value(*anum, *value)?;
        }
        debug!("Profile[{}]: executing {:?}", io.address, intent);
        self.processor.send(&intent.to_command(), io)
    }

    /// Ask the AG to start codec connection setup (`AT+BCC`).
    pub fn request_codec_connection(&mut self, io: &mut DeviceIo<'_>) -> Result<()> {
        self.processor.send(&AtCommand::Bcc, io)
    }

    /// The response timer fired; pending commands are abandoned.
    pub fn on_response_timeout(&mut self, io: &mut DeviceIo<'_>) {
        self.processor.on_response_timeout(io);
    }

    /// Connection is gone: drop AT state and finish every call.
    pub fn reset(&mut self, io: &mut DeviceIo<'_>) {
        self.processor.clean_up(io);
        for change in self.calls.clear() {
            publish_call(change, io);
        }
    }

    fn query_calls(&mut self, io: &mut DeviceIo<'_>) {
        if self.processor.has_pending(hfp_at_protocol::AtCommandId::Clcc) {
            return;
        }
        if let Err(e) = self.processor.send(&AtCommand::ListCurrentCalls, io) {
            debug!("Profile[{}]: call list query not sent: {}", io.address, e);
        }
    }

    fn publish(
        &mut self,
        events: Vec<ProcessorEvent>,
        io: &mut DeviceIo<'_>,
        ctx: &ConnectionContext,
    ) -> Vec<ProfileSignal> {
        let address = io.address;
        let mut signals = Vec::new();
        for event in events {
            let notification = match event {
                ProcessorEvent::SlcEstablished => {
                    signals.push(ProfileSignal::SlcEstablished);
                    if ctx.enhanced_call_status_supported() {
                        self.query_calls(io);
                    }
                    None
                }
                ProcessorEvent::CommandCompleted { command, result } => {
                    if command == AtCommandId::Bcc && result.is_err() {
                        signals.push(ProfileSignal::CodecConnectionRejected);
                    }
                    Some(Notification::CommandResult {
                        address,
                        command,
                        result,
                    })
                }
                ProcessorEvent::Ring => Some(Notification::Ring { address }),
                ProcessorEvent::IndicatorChanged { kind, value } => {
                    if kind.is_call_related() && ctx.slc_established && ctx.enhanced_call_status_supported() {
                        self.query_calls(io);
                    }
                    Some(Notification::IndicatorChanged {
                        address,
                        indicator: kind,
                        value,
                    })
                }
                ProcessorEvent::CallingLine(id) => Some(Notification::CallingLine {
                    address,
                    number: id.number,
                }),
                ProcessorEvent::CallWaiting(id) => Some(Notification::CallWaiting {
                    address,
                    number: id.number,
                }),
                ProcessorEvent::CallListEntry(entry) => {
                    match Call::from_clcc(&entry, ctx.in_band_ring, io.now) {
                        Some(call) => self.calls.stage(call),
                        None => debug!("Profile[{}]: skipping call list entry {:?}", address, entry),
                    }
                    None
                }
                ProcessorEvent::CallListComplete => {
                    for change in self.calls.commit() {
                        publish_call(change, io);
                    }
                    None
                }
                ProcessorEvent::CallListAborted => {
                    self.calls.discard_staged();
                    None
                }
                ProcessorEvent::InBandRing(enabled) => Some(Notification::InBandRing { address, enabled }),
                ProcessorEvent::VoiceRecognition(active) => Some(Notification::VoiceRecognition { address, active }),
                ProcessorEvent::SubscriberNumber(info) => Some(Notification::SubscriberNumber {
                    address,
                    number: info.number,
                    number_type: info.number_type,
                }),
                ProcessorEvent::Volume { kind, level } => Some(Notification::Volume { address, kind, level }),
                ProcessorEvent::Operator(name) => Some(Notification::OperatorName { address, name }),
                ProcessorEvent::ResponseHold(status) => Some(Notification::ResponseHold { address, status }),
                ProcessorEvent::CodecNegotiated(codec) => {
                    signals.push(ProfileSignal::CodecNegotiated(codec));
                    Some(Notification::CodecNegotiated { address, codec })
                }
                ProcessorEvent::HfIndicatorEnabled { anum, enabled } => {
                    Some(Notification::HfIndicatorEnabled { address, anum, enabled })
                }
            };
            if let Some(notification) = notification {
                io.events.send(notification);
            }
        }
        signals
    }
}

fn publish_call(change: CallChange, io: &DeviceIo<'_>) {
    debug!("Profile[{}]: {:?}", io.address, change);
    let call = match change {
        CallChange::Added(call) | CallChange::Updated(call) | CallChange::Finished(call) => call,
    };
    io.events.send(Notification::CallChanged {
        address: io.address,
        call,
    });
}

/// Reject intents the negotiated features do not allow.
pub(crate) fn check_features(intent: &Intent, ctx: &ConnectionContext) -> Result<()> {
    match intent {
        Intent::CallHold(action) => {
            if !ctx.three_way_supported() {
                return Err(HfError::Unsupported("three-way calling".into()));
            }
            let per_call = matches!(
                action,
                ChldAction::ReleaseSpecified(_) | ChldAction::PrivateConsultation(_)
            );
            if per_call && !ctx.enhanced_call_control_supported() {
                return Err(HfError::Unsupported("enhanced call control".into()));
            }
            if ctx.remote_chld_features != 0 && ctx.remote_chld_features & action.required_feature() == 0 {
                return Err(HfError::Unsupported(format!(
                    "AT+CHLD={} not offered by the AG",
                    action.to_argument()
                )));
            }
        }
        Intent::SetVoiceRecognition(_) if !ctx.voice_recognition_supported() => {
            return Err(HfError::Unsupported("voice recognition".into()));
        }
        Intent::DisableEcnr if !ctx.ecnr_supported() => {
            return Err(HfError::Unsupported("echo cancelling and noise reduction".into()));
        }
        Intent::SetVolume { .. } if !ctx.local().supports(HF_FEATURE_REMOTE_VOLUME) => {
            return Err(HfError::Unsupported("remote volume control".into()));
        }
        Intent::SendHfIndicator { anum, .. } => {
            if !ctx.hf_indicators_supported() {
                return Err(HfError::Unsupported("HF indicators".into()));
            }
            if !ctx.hf_indicators.is_remote_enabled(*anum) {
                return Err(HfError::Unsupported(format!("HF indicator {} not enabled by the AG", anum)));
            }
        }
        _ => {}
    }
    Ok(())
}
