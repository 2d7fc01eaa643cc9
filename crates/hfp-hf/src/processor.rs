//! AT command processor.
//!
//! Owns the outbound side of one connection: a FIFO of pending commands
//! with a single command in flight, the service level connection ladder
//! and the response timer. Inbound bytes are framed by
//! [`AtFrameParser`] and turned into [`ProcessorEvent`]s.
//!
//! ## SLC ladder
//!
//! ```text
//! AT+BRSF -> [AT+BAC] -> AT+CIND=? -> AT+CIND? -> AT+CMER
//!         -> [AT+CHLD=?] -> [AT+BIND=, AT+BIND=?, AT+BIND?] -> established
//! ```
//!
//! Bracketed steps run only when both sides support the feature. Errors
//! on ladder steps are logged and the ladder moves on.

use hfp_at_protocol::{
    parse_bind_list, parse_bind_status, parse_caller_id, parse_chld_test, parse_ciev, parse_clcc,
    parse_cind_test, parse_cnum, parse_cops, parse_int_list, parse_single_int, AtCommand,
    AtCommandId, AtError, AtFrame, AtFrameParser, AtResult, CallerId, ClccEntry, ReplyPrefix,
    ResultCode, SubscriberInfo, MAX_VOLUME_LEVEL,
};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::collaborators::DeviceIo;
use crate::context::ConnectionContext;
use crate::error::{CommandErrorKind, HfError, Result};
use crate::indicators::{AgIndicatorKind, AgIndicatorTable};
use crate::telemetry::metric_defs;
use crate::timer::TimerKind;
use crate::types::VolumeKind;

// ============================================================================
// SLC ladder
// ============================================================================

/// Position in the service level connection ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlcStep {
    Brsf,
    Bac,
    CindTest,
    CindRead,
    Cmer,
    ChldTest,
    BindSet,
    BindTest,
    BindRead,
    Established,
}

impl SlcStep {
    fn next(self) -> SlcStep {
        match self {
            SlcStep::Brsf => SlcStep::Bac,
            SlcStep::Bac => SlcStep::CindTest,
            SlcStep::CindTest => SlcStep::CindRead,
            SlcStep::CindRead => SlcStep::Cmer,
            SlcStep::Cmer => SlcStep::ChldTest,
            SlcStep::ChldTest => SlcStep::BindSet,
            SlcStep::BindSet => SlcStep::BindTest,
            SlcStep::BindTest => SlcStep::BindRead,
            SlcStep::BindRead | SlcStep::Established => SlcStep::Established,
        }
    }

    /// Command for this step, or `None` when the step is skipped.
    fn command(self, ctx: &ConnectionContext) -> Option<AtCommand> {
        match self {
            SlcStep::Brsf => Some(AtCommand::Brsf {
                features: ctx.local().features,
            }),
            SlcStep::Bac if ctx.codec_negotiation_supported() => Some(AtCommand::Bac {
                codecs: ctx.local().codecs.clone(),
            }),
            SlcStep::CindTest => Some(AtCommand::CindTest),
            SlcStep::CindRead => Some(AtCommand::CindRead),
            SlcStep::Cmer => Some(AtCommand::Cmer),
            SlcStep::ChldTest if ctx.three_way_supported() => Some(AtCommand::ChldTest),
            SlcStep::BindSet if ctx.hf_indicators_supported() => Some(AtCommand::BindSet {
                indicators: ctx.local().hf_indicators.clone(),
            }),
            SlcStep::BindTest if ctx.hf_indicators_supported() => Some(AtCommand::BindTest),
            SlcStep::BindRead if ctx.hf_indicators_supported() => Some(AtCommand::BindRead),
            _ => None,
        }
    }
}

// ============================================================================
// Pending commands and decoded events
// ============================================================================

/// A command waiting for, or holding, the in-flight slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub text: String,
    pub id: AtCommandId,
}

impl PendingCommand {
    pub fn new(command: &AtCommand) -> Self {
        PendingCommand {
            text: command.encode(),
            id: command.id(),
        }
    }

    /// Text after `=`, if any.
    fn argument(&self) -> Option<&str> {
        self.text.split_once('=').map(|(_, arg)| arg)
    }
}

/// What the processor decoded from the AG.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessorEvent {
    SlcEstablished,
    /// A command that reports its outcome was closed.
    CommandCompleted {
        command: AtCommandId,
        result: std::result::Result<(), CommandErrorKind>,
    },
    Ring,
    IndicatorChanged {
        kind: AgIndicatorKind,
        value: i32,
    },
    CallingLine(CallerId),
    CallWaiting(CallerId),
    CallListEntry(ClccEntry),
    /// `AT+CLCC` closed with `OK`; the staged snapshot is complete.
    CallListComplete,
    /// `AT+CLCC` failed; the staged snapshot is void.
    CallListAborted,
    InBandRing(bool),
    VoiceRecognition(bool),
    SubscriberNumber(SubscriberInfo),
    Volume {
        kind: VolumeKind,
        level: u8,
    },
    Operator(String),
    ResponseHold(i32),
    CodecNegotiated(u8),
    HfIndicatorEnabled {
        anum: u16,
        enabled: bool,
    },
}

// ============================================================================
// Command Processor
// ============================================================================

/// Outbound command queue and reply decoder for one connection.
#[derive(Debug)]
pub struct CommandProcessor {
    parser: AtFrameParser,
    current: Option<PendingCommand>,
    queue: VecDeque<PendingCommand>,
    slc: Option<SlcStep>,
    response_timeout: Duration,
}

impl CommandProcessor {
    pub fn new(response_timeout: Duration) -> Self {
        CommandProcessor {
            parser: AtFrameParser::new(),
            current: None,
            queue: VecDeque::new(),
            slc: None,
            response_timeout,
        }
    }

    /// Command occupying the in-flight slot.
    pub fn current_command(&self) -> Option<AtCommandId> {
        self.current.as_ref().map(|c| c.id)
    }

    /// Number of commands waiting for the slot.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }

    pub fn slc_step(&self) -> Option<SlcStep> {
        self.slc
    }

    /// Whether a command of this kind is in flight or queued.
    pub fn has_pending(&self, id: AtCommandId) -> bool {
        self.current_command() == Some(id) || self.queue.iter().any(|c| c.id == id)
    }

    fn slc_in_progress(&self) -> bool {
        matches!(self.slc, Some(step) if step != SlcStep::Established)
    }

    /// Start the SLC ladder on a freshly opened transport.
    pub fn start_slc(&mut self, io: &mut DeviceIo<'_>, ctx: &ConnectionContext) -> Result<()> {
        self.clean_up(io);
        self.slc = Some(SlcStep::Brsf);
        let command = AtCommand::Brsf {
            features: ctx.local().features,
        };
        self.transmit(PendingCommand::new(&command), io)
    }

    /// Send a command now if the slot is free, otherwise queue it.
    pub fn send(&mut self, command: &AtCommand, io: &mut DeviceIo<'_>) -> Result<()> {
        command
            .validate()
            .map_err(|e| HfError::InvalidArgument(e.to_string()))?;
        let pending = PendingCommand::new(command);
        if self.current.is_none() && self.queue.is_empty() {
            return self.transmit(pending, io);
        }
        trace!("CommandProcessor[{}]: queued {}", io.address, pending.text);
        self.queue.push_back(pending);
        // Commands queued while SLC steps held the slot are still waiting.
        if self.current.is_none() {
            self.send_next(io);
        }
        Ok(())
    }

    fn transmit(&mut self, pending: PendingCommand, io: &mut DeviceIo<'_>) -> Result<()> {
        debug!("CommandProcessor[{}]: >> {}", io.address, pending.text);
        io.write(&AtFrameParser::encode_command(&pending.text))?;
        metrics::counter!(metric_defs::AT_COMMANDS_SENT.name).increment(1);
        io.start_timer(TimerKind::Response, self.response_timeout);
        self.current = Some(pending);
        Ok(())
    }

    fn send_next(&mut self, io: &mut DeviceIo<'_>) {
        while let Some(next) = self.queue.pop_front() {
            let text = next.text.clone();
            match self.transmit(next, io) {
                Ok(()) => return,
                Err(e) => warn!("CommandProcessor[{}]: dropping {}: {}", io.address, text, e),
            }
        }
    }

    /// Stop the timer, drop queued commands and forget the in-flight one.
    pub fn clean_up(&mut self, io: &mut DeviceIo<'_>) {
        io.cancel_timer(TimerKind::Response);
        self.queue.clear();
        self.current = None;
        self.slc = None;
        self.parser.clear();
    }

    /// The response timer fired. Everything pending is abandoned; the
    /// caller is expected to drop the connection.
    pub fn on_response_timeout(&mut self, io: &mut DeviceIo<'_>) -> Option<AtCommandId> {
        let command = self.current_command();
        if let Some(command) = command {
            let err = HfError::Timeout {
                command,
                after: self.response_timeout,
            };
            warn!("CommandProcessor[{}]: {}", io.address, err);
        }
        metrics::counter!(metric_defs::AT_RESPONSE_TIMEOUTS.name).increment(1);
        self.clean_up(io);
        command
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Feed bytes read from the transport.
    pub fn handle_data(
        &mut self,
        data: &[u8],
        io: &mut DeviceIo<'_>,
        ctx: &mut ConnectionContext,
    ) -> Vec<ProcessorEvent> {
        self.parser.push(data);
        let mut events = Vec::new();
        while let Some(frame) = self.parser.decode() {
            self.handle_frame(frame, io, ctx, &mut events);
        }
        events
    }

    fn handle_frame(
        &mut self,
        frame: AtFrame,
        io: &mut DeviceIo<'_>,
        ctx: &mut ConnectionContext,
        events: &mut Vec<ProcessorEvent>,
    ) {
        debug!("CommandProcessor[{}]: << {}{}", io.address, frame.prefix, frame.argument);
        if let Some(code) = ResultCode::from_frame(&frame) {
            self.handle_result(code, io, ctx, events);
            return;
        }
        if let Err(e) = self.handle_unsolicited(&frame, io, ctx, events) {
            metrics::counter!(metric_defs::AT_FRAMES_DROPPED.name).increment(1);
            debug!("CommandProcessor[{}]: dropping frame: {}", io.address, e);
        }
    }

    fn handle_result(
        &mut self,
        code: ResultCode,
        io: &mut DeviceIo<'_>,
        ctx: &mut ConnectionContext,
        events: &mut Vec<ProcessorEvent>,
    ) {
        let Some(done) = self.current.take() else {
            debug!("CommandProcessor[{}]: {:?} with nothing in flight", io.address, code);
            return;
        };
        io.cancel_timer(TimerKind::Response);

        let error = CommandErrorKind::from_result_code(code);
        if let Some(kind) = error {
            metrics::counter!(metric_defs::AT_COMMAND_ERRORS.name).increment(1);
            if done.id.tolerates_error() {
                debug!("CommandProcessor[{}]: {} failed with {}, continuing", io.address, done.text, kind);
            } else {
                warn!("CommandProcessor[{}]: {}", io.address, kind.into_error(done.id));
            }
        }

        if self.slc_in_progress() {
            self.advance_slc(io, ctx, events);
            return;
        }

        self.complete(&done, error, ctx, events);
        self.send_next(io);
    }

    /// Command specific follow-up once the AG closed a command.
    fn complete(
        &mut self,
        done: &PendingCommand,
        error: Option<CommandErrorKind>,
        ctx: &mut ConnectionContext,
        events: &mut Vec<ProcessorEvent>,
    ) {
        let argument = done.argument().and_then(|a| a.parse::<u8>().ok());
        match (done.id, error) {
            (AtCommandId::Clcc, None) => events.push(ProcessorEvent::CallListComplete),
            (AtCommandId::Clcc, Some(_)) => events.push(ProcessorEvent::CallListAborted),
            (AtCommandId::Bcs, None) => {
                if let Some(codec) = argument {
                    ctx.negotiated_codec = codec;
                    events.push(ProcessorEvent::CodecNegotiated(codec));
                }
            }
            (AtCommandId::Bvra, None) => {
                let active = argument == Some(1);
                ctx.voice_recognition_active = active;
                events.push(ProcessorEvent::VoiceRecognition(active));
            }
            (AtCommandId::Vgs, None) => ctx.speaker_volume = argument,
            (AtCommandId::Vgm, None) => ctx.microphone_volume = argument,
            _ => {}
        }

        if !done.id.tolerates_error() {
            events.push(ProcessorEvent::CommandCompleted {
                command: done.id,
                result: error.map_or(Ok(()), Err),
            });
        }
    }

    fn handle_unsolicited(
        &mut self,
        frame: &AtFrame,
        io: &mut DeviceIo<'_>,
        ctx: &mut ConnectionContext,
        events: &mut Vec<ProcessorEvent>,
    ) -> Result<()> {
        let prefix = frame.prefix;
        let arg = frame.argument.as_str();
        match prefix {
            ReplyPrefix::Ring => events.push(ProcessorEvent::Ring),
            ReplyPrefix::Ciev => {
                let (ordinal, value) = parse_ciev(arg)?;
                match ctx.ag_indicators.update(ordinal, value) {
                    Some((kind, value)) => events.push(ProcessorEvent::IndicatorChanged { kind, value }),
                    None => debug!(
                        "CommandProcessor[{}]: ignoring +CIEV for indicator {} value {}",
                        io.address, ordinal, value
                    ),
                }
            }
            ReplyPrefix::Clip => events.push(ProcessorEvent::CallingLine(parse_caller_id(prefix, arg)?)),
            ReplyPrefix::Ccwa => events.push(ProcessorEvent::CallWaiting(parse_caller_id(prefix, arg)?)),
            ReplyPrefix::Clcc => events.push(ProcessorEvent::CallListEntry(parse_clcc(arg)?)),
            ReplyPrefix::Bsir => {
                let enabled = parse_single_int(prefix, arg)? == 1;
                ctx.in_band_ring = enabled;
                events.push(ProcessorEvent::InBandRing(enabled));
            }
            ReplyPrefix::Bvra => {
                let active = parse_single_int(prefix, arg)? == 1;
                ctx.voice_recognition_active = active;
                events.push(ProcessorEvent::VoiceRecognition(active));
            }
            ReplyPrefix::Cnum => events.push(ProcessorEvent::SubscriberNumber(parse_cnum(arg)?)),
            ReplyPrefix::Vgs | ReplyPrefix::Vgm => {
                let level = parse_volume(prefix, arg)?;
                let kind = if prefix == ReplyPrefix::Vgs {
                    ctx.speaker_volume = Some(level);
                    VolumeKind::Speaker
                } else {
                    ctx.microphone_volume = Some(level);
                    VolumeKind::Microphone
                };
                events.push(ProcessorEvent::Volume { kind, level });
            }
            ReplyPrefix::Cops => {
                let info = parse_cops(arg)?;
                ctx.operator_name = Some(info.name.clone());
                events.push(ProcessorEvent::Operator(info.name));
            }
            ReplyPrefix::Btrh => events.push(ProcessorEvent::ResponseHold(parse_single_int(prefix, arg)?)),
            ReplyPrefix::Brsf => {
                let features = parse_single_int(prefix, arg)?;
                let features = u32::try_from(features)
                    .map_err(|_| AtError::malformed(prefix.as_str(), format!("negative features {}", features)))?;
                ctx.set_remote_features(features);
            }
            ReplyPrefix::Cind => match self.current_command() {
                Some(AtCommandId::CindTest) => {
                    ctx.ag_indicators = AgIndicatorTable::from_specs(&parse_cind_test(arg)?);
                }
                Some(AtCommandId::CindRead) => {
                    let values = parse_int_list(prefix, arg)?;
                    for (kind, value) in ctx.ag_indicators.apply_values(&values) {
                        events.push(ProcessorEvent::IndicatorChanged { kind, value });
                    }
                }
                other => debug!("CommandProcessor[{}]: +CIND while {:?} in flight", io.address, other),
            },
            ReplyPrefix::Chld => {
                if self.current_command() == Some(AtCommandId::ChldTest) {
                    ctx.remote_chld_features = parse_chld_test(arg);
                }
            }
            ReplyPrefix::Bind => {
                if self.current_command() == Some(AtCommandId::BindTest) {
                    ctx.hf_indicators.set_remote_supported(&parse_bind_list(arg)?);
                } else {
                    let (anum, enabled) = parse_bind_status(arg)?;
                    if ctx.hf_indicators.set_remote_enabled(anum, enabled) {
                        events.push(ProcessorEvent::HfIndicatorEnabled { anum, enabled });
                    }
                }
            }
            ReplyPrefix::Bcs => {
                let codec = parse_single_int(prefix, arg)?;
                let codec = u8::try_from(codec)
                    .map_err(|_| AtError::malformed(prefix.as_str(), format!("codec {} out of range", codec)))?;
                self.handle_codec_selection(codec, io, ctx);
            }
            _ => {}
        }
        Ok(())
    }

    /// `+BCS: <codec>`: confirm a codec we support, otherwise re-announce ours.
    fn handle_codec_selection(&mut self, codec: u8, io: &mut DeviceIo<'_>, ctx: &ConnectionContext) {
        let command = if ctx.local().supports_codec(codec) {
            AtCommand::Bcs { codec }
        } else {
            debug!("CommandProcessor[{}]: AG selected unsupported codec {}", io.address, codec);
            AtCommand::Bac {
                codecs: ctx.local().codecs.clone(),
            }
        };
        if let Err(e) = self.send(&command, io) {
            warn!("CommandProcessor[{}]: codec selection reply failed: {}", io.address, e);
        }
    }

    // ========================================================================
    // Ladder
    // ========================================================================

    fn advance_slc(&mut self, io: &mut DeviceIo<'_>, ctx: &mut ConnectionContext, events: &mut Vec<ProcessorEvent>) {
        let mut step = self.slc.map_or(SlcStep::Brsf, SlcStep::next);
        loop {
            if step == SlcStep::Established {
                self.finish_slc(io, ctx, events);
                return;
            }
            if let Some(command) = step.command(ctx) {
                self.slc = Some(step);
                if let Err(e) = self.transmit(PendingCommand::new(&command), io) {
                    warn!("CommandProcessor[{}]: SLC setup stalled at {:?}: {}", io.address, step, e);
                }
                return;
            }
            step = step.next();
        }
    }

    fn finish_slc(&mut self, io: &mut DeviceIo<'_>, ctx: &mut ConnectionContext, events: &mut Vec<ProcessorEvent>) {
        self.slc = Some(SlcStep::Established);
        ctx.slc_established = true;
        metrics::counter!(metric_defs::SLC_ESTABLISHED.name).increment(1);
        info!(
            "CommandProcessor[{}]: service level connection established, AG features {:#x}",
            io.address, ctx.remote_features
        );

        let mut setup = vec![AtCommand::CopsSetFormat];
        if !ctx.ag_indicators.is_empty() {
            let deactivated = ctx.local().deactivated_indicators.clone();
            setup.push(AtCommand::Bia {
                activation: ctx.ag_indicators.activation_mask(&deactivated),
            });
        }
        setup.push(AtCommand::Clip { enable: true });
        setup.push(AtCommand::Ccwa { enable: true });
        setup.push(AtCommand::Cmee { enable: true });
        for command in &setup {
            if let Err(e) = self.send(command, io) {
                warn!("CommandProcessor[{}]: {} not sent: {}", io.address, command, e);
            }
        }

        events.push(ProcessorEvent::SlcEstablished);
    }
}

fn parse_volume(prefix: ReplyPrefix, argument: &str) -> AtResult<u8> {
    let level = parse_single_int(prefix, argument)?;
    u8::try_from(level)
        .ok()
        .filter(|l| *l <= MAX_VOLUME_LEVEL)
        .ok_or_else(|| AtError::malformed(prefix.as_str(), format!("volume {} out of range", level)))
}
