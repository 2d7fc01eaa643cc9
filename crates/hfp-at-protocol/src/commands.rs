//! Commands that can be sent to the Audio Gateway.
//!
//! The HF sends several categories of commands:
//! - Service level connection setup (`BRSF`, `BAC`, `CIND`, `CMER`, `CHLD=?`, `BIND`)
//! - Call control (`ATA`, `ATD`, `CHUP`, `CHLD`, `BLDN`, `VTS`)
//! - Status queries (`CLCC`, `COPS?`, `CNUM`, `BTRH?`)
//! - Audio and volume (`BCC`, `BCS`, `VGS`, `VGM`, `NREC`, `BVRA`)

use crate::codec::AtFrameParser;
use crate::constants::CKPD_KEY_CODE;
use crate::error::{AtError, AtResult};

/// Kind of a command, used to correlate replies with the command in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtCommandId {
    Brsf,
    Bac,
    CindTest,
    CindRead,
    Cmer,
    ChldTest,
    ChldSet,
    BindSet,
    BindTest,
    BindRead,
    Clcc,
    CopsSet,
    CopsRead,
    Cnum,
    Vgm,
    Vgs,
    BtrhRead,
    BtrhSet,
    Bcc,
    Bcs,
    Bldn,
    Ckpd,
    Nrec,
    Clip,
    Ccwa,
    Cmee,
    Biev,
    Bia,
    Bvra,
    Vts,
    Ata,
    Atd,
    Chup,
    Vendor,
}

/// Command heads as they appear on the wire.
const COMMAND_TABLE: &[(&str, AtCommandId)] = &[
    ("AT+BRSF=", AtCommandId::Brsf),
    ("AT+BAC=", AtCommandId::Bac),
    ("AT+CIND=?", AtCommandId::CindTest),
    ("AT+CIND?", AtCommandId::CindRead),
    ("AT+CMER=", AtCommandId::Cmer),
    ("AT+CHLD=?", AtCommandId::ChldTest),
    ("AT+CHLD=", AtCommandId::ChldSet),
    ("AT+BIND=?", AtCommandId::BindTest),
    ("AT+BIND?", AtCommandId::BindRead),
    ("AT+BIND=", AtCommandId::BindSet),
    ("AT+CLCC", AtCommandId::Clcc),
    ("AT+COPS?", AtCommandId::CopsRead),
    ("AT+COPS=", AtCommandId::CopsSet),
    ("AT+CNUM", AtCommandId::Cnum),
    ("AT+VGM=", AtCommandId::Vgm),
    ("AT+VGS=", AtCommandId::Vgs),
    ("AT+BTRH?", AtCommandId::BtrhRead),
    ("AT+BTRH=", AtCommandId::BtrhSet),
    ("AT+BCC", AtCommandId::Bcc),
    ("AT+BCS=", AtCommandId::Bcs),
    ("AT+BLDN", AtCommandId::Bldn),
    ("AT+CKPD=", AtCommandId::Ckpd),
    ("AT+NREC=", AtCommandId::Nrec),
    ("AT+CLIP=", AtCommandId::Clip),
    ("AT+CCWA=", AtCommandId::Ccwa),
    ("AT+CMEE=", AtCommandId::Cmee),
    ("AT+BIEV=", AtCommandId::Biev),
    ("AT+BIA=", AtCommandId::Bia),
    ("AT+BVRA=", AtCommandId::Bvra),
    ("AT+VTS=", AtCommandId::Vts),
    ("AT+CHUP", AtCommandId::Chup),
    ("ATA", AtCommandId::Ata),
    ("ATD", AtCommandId::Atd),
];

impl AtCommandId {
    /// Command head as sent on the wire, or `None` for vendor commands.
    pub fn head(&self) -> Option<&'static str> {
        COMMAND_TABLE
            .iter()
            .find(|(_, id)| id == self)
            .map(|(head, _)| *head)
    }

    /// Whether the command is part of service level connection setup.
    ///
    /// Errors for these are tolerated so that optional features degrade.
    pub fn is_slc_setup(&self) -> bool {
        matches!(
            self,
            AtCommandId::Brsf
                | AtCommandId::Bac
                | AtCommandId::CindTest
                | AtCommandId::CindRead
                | AtCommandId::Cmer
                | AtCommandId::ChldTest
                | AtCommandId::BindSet
                | AtCommandId::BindTest
                | AtCommandId::BindRead
        )
    }

    /// Whether errors for this command are swallowed rather than reported.
    pub fn tolerates_error(&self) -> bool {
        self.is_slc_setup()
            || matches!(
                self,
                AtCommandId::Bcs
                    | AtCommandId::CopsSet
                    | AtCommandId::Bia
                    | AtCommandId::Clip
                    | AtCommandId::Ccwa
                    | AtCommandId::Cmee
            )
    }
}

impl std::fmt::Display for AtCommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.head() {
            Some(head) => f.write_str(head.trim_end_matches(['=', '?'])),
            None => f.write_str("vendor"),
        }
    }
}

/// Call hold and multiparty actions for `AT+CHLD=<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChldAction {
    /// `0`: release held calls, or reject a waiting call.
    ReleaseHeld,
    /// `1`: release active calls and accept the held or waiting call.
    ReleaseActiveAcceptOther,
    /// `1x`: release the call with the given index.
    ReleaseSpecified(u16),
    /// `2`: hold active calls and accept the held or waiting call.
    HoldActiveAcceptOther,
    /// `2x`: private consultation with the call with the given index.
    PrivateConsultation(u16),
    /// `3`: add the held call to the conversation.
    Merge,
    /// `4`: connect the two calls and drop out (explicit call transfer).
    MergeDetach,
}

impl ChldAction {
    /// Argument text of the action.
    pub fn to_argument(&self) -> String {
        match self {
            ChldAction::ReleaseHeld => "0".to_string(),
            ChldAction::ReleaseActiveAcceptOther => "1".to_string(),
            ChldAction::ReleaseSpecified(idx) => format!("1{}", idx),
            ChldAction::HoldActiveAcceptOther => "2".to_string(),
            ChldAction::PrivateConsultation(idx) => format!("2{}", idx),
            ChldAction::Merge => "3".to_string(),
            ChldAction::MergeDetach => "4".to_string(),
        }
    }

    /// Capability bit in the `+CHLD` feature mask required by this action.
    pub fn required_feature(&self) -> u32 {
        use crate::constants::*;
        match self {
            ChldAction::ReleaseHeld => CHLD_RELEASE_HELD,
            ChldAction::ReleaseActiveAcceptOther => CHLD_RELEASE_ACTIVE_ACCEPT_OTHER,
            ChldAction::ReleaseSpecified(_) => CHLD_RELEASE_SPECIFIED,
            ChldAction::HoldActiveAcceptOther => CHLD_HOLD_ACTIVE_ACCEPT_OTHER,
            ChldAction::PrivateConsultation(_) => CHLD_PRIVATE_CONSULTATION,
            ChldAction::Merge => CHLD_MERGE,
            ChldAction::MergeDetach => CHLD_MERGE_DETACH,
        }
    }
}

/// Commands that can be sent to the Audio Gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtCommand {
    // ========== Service Level Connection ==========
    /// Exchange supported features.
    Brsf {
        /// HF supported features bitmask.
        features: u32,
    },
    /// Announce available codecs.
    Bac {
        /// Codec identifiers.
        codecs: Vec<u8>,
    },
    /// Ask for the indicator names and ranges.
    CindTest,
    /// Ask for the current indicator values.
    CindRead,
    /// Enable indicator event reporting.
    Cmer,
    /// Ask for call hold capabilities.
    ChldTest,
    /// Announce supported HF indicators.
    BindSet {
        /// Assigned numbers of the supported indicators.
        indicators: Vec<u16>,
    },
    /// Ask which HF indicators the AG supports.
    BindTest,
    /// Ask which HF indicators the AG has enabled.
    BindRead,

    // ========== Post-SLC setup ==========
    /// Select long alphanumeric operator name format (`AT+COPS=3,0`).
    CopsSetFormat,
    /// Activate or deactivate individual indicators.
    Bia {
        /// Activation flag per indicator, in announce order.
        activation: Vec<bool>,
    },
    /// Enable calling line identification.
    Clip {
        /// Enable flag.
        enable: bool,
    },
    /// Enable call waiting notification.
    Ccwa {
        /// Enable flag.
        enable: bool,
    },
    /// Enable extended error result codes.
    Cmee {
        /// Enable flag.
        enable: bool,
    },

    // ========== Call Control ==========
    /// Answer an incoming call.
    Answer,
    /// Dial a number.
    Dial {
        /// Number to dial.
        number: String,
    },
    /// Dial from a phone book memory location.
    MemoryDial {
        /// Memory location.
        location: u32,
    },
    /// Redial the last number.
    Redial,
    /// Hang up or reject.
    HangUp,
    /// Call hold and multiparty handling.
    CallHold {
        /// Requested action.
        action: ChldAction,
    },
    /// Send a DTMF tone.
    Dtmf {
        /// Tone character.
        tone: char,
    },
    /// Response and hold query.
    BtrhRead,
    /// Response and hold action (0 hold, 1 accept held, 2 reject held).
    BtrhSet {
        /// Action code.
        action: u8,
    },
    /// Headset key press.
    KeyPress,

    // ========== Queries ==========
    /// List current calls.
    ListCurrentCalls,
    /// Query the network operator.
    CopsRead,
    /// Query the subscriber number.
    SubscriberNumber,

    // ========== Audio ==========
    /// Ask the AG to start codec connection setup.
    Bcc,
    /// Confirm the codec selected by the AG.
    Bcs {
        /// Codec identifier.
        codec: u8,
    },
    /// Speaker gain.
    SpeakerVolume {
        /// Gain 0-15.
        level: u8,
    },
    /// Microphone gain.
    MicrophoneVolume {
        /// Gain 0-15.
        level: u8,
    },
    /// Echo cancelling and noise reduction (only disabling is meaningful).
    Nrec {
        /// Enable flag.
        enable: bool,
    },
    /// Voice recognition activation.
    VoiceRecognition {
        /// Enable flag.
        enable: bool,
    },
    /// Report an HF indicator value.
    Biev {
        /// Indicator assigned number.
        anum: u16,
        /// New value.
        value: u32,
    },

    // ========== Other ==========
    /// Raw vendor specific command, sent as given.
    Vendor {
        /// Full command text without terminator.
        text: String,
    },
}

impl AtCommand {
    /// Kind of this command.
    pub fn id(&self) -> AtCommandId {
        match self {
            AtCommand::Brsf { .. } => AtCommandId::Brsf,
            AtCommand::Bac { .. } => AtCommandId::Bac,
            AtCommand::CindTest => AtCommandId::CindTest,
            AtCommand::CindRead => AtCommandId::CindRead,
            AtCommand::Cmer => AtCommandId::Cmer,
            AtCommand::ChldTest => AtCommandId::ChldTest,
            AtCommand::BindSet { .. } => AtCommandId::BindSet,
            AtCommand::BindTest => AtCommandId::BindTest,
            AtCommand::BindRead => AtCommandId::BindRead,
            AtCommand::CopsSetFormat => AtCommandId::CopsSet,
            AtCommand::Bia { .. } => AtCommandId::Bia,
            AtCommand::Clip { .. } => AtCommandId::Clip,
            AtCommand::Ccwa { .. } => AtCommandId::Ccwa,
            AtCommand::Cmee { .. } => AtCommandId::Cmee,
            AtCommand::Answer => AtCommandId::Ata,
            AtCommand::Dial { .. } | AtCommand::MemoryDial { .. } => AtCommandId::Atd,
            AtCommand::Redial => AtCommandId::Bldn,
            AtCommand::HangUp => AtCommandId::Chup,
            AtCommand::CallHold { .. } => AtCommandId::ChldSet,
            AtCommand::Dtmf { .. } => AtCommandId::Vts,
            AtCommand::BtrhRead => AtCommandId::BtrhRead,
            AtCommand::BtrhSet { .. } => AtCommandId::BtrhSet,
            AtCommand::KeyPress => AtCommandId::Ckpd,
            AtCommand::ListCurrentCalls => AtCommandId::Clcc,
            AtCommand::CopsRead => AtCommandId::CopsRead,
            AtCommand::SubscriberNumber => AtCommandId::Cnum,
            AtCommand::Bcc => AtCommandId::Bcc,
            AtCommand::Bcs { .. } => AtCommandId::Bcs,
            AtCommand::SpeakerVolume { .. } => AtCommandId::Vgs,
            AtCommand::MicrophoneVolume { .. } => AtCommandId::Vgm,
            AtCommand::Nrec { .. } => AtCommandId::Nrec,
            AtCommand::VoiceRecognition { .. } => AtCommandId::Bvra,
            AtCommand::Biev { .. } => AtCommandId::Biev,
            AtCommand::Vendor { .. } => AtCommandId::Vendor,
        }
    }

    /// Encode the command text (without the `\r` terminator).
    pub fn encode(&self) -> String {
        match self {
            AtCommand::Brsf { features } => format!("AT+BRSF={}", features),
            AtCommand::Bac { codecs } => format!("AT+BAC={}", join(codecs)),
            AtCommand::CindTest => "AT+CIND=?".to_string(),
            AtCommand::CindRead => "AT+CIND?".to_string(),
            AtCommand::Cmer => "AT+CMER=3,0,0,1".to_string(),
            AtCommand::ChldTest => "AT+CHLD=?".to_string(),
            AtCommand::BindSet { indicators } => format!("AT+BIND={}", join(indicators)),
            AtCommand::BindTest => "AT+BIND=?".to_string(),
            AtCommand::BindRead => "AT+BIND?".to_string(),
            AtCommand::CopsSetFormat => "AT+COPS=3,0".to_string(),
            AtCommand::Bia { activation } => {
                let flags: Vec<u8> = activation.iter().map(|&on| on as u8).collect();
                format!("AT+BIA={}", join(&flags))
            }
            AtCommand::Clip { enable } => format!("AT+CLIP={}", *enable as u8),
            AtCommand::Ccwa { enable } => format!("AT+CCWA={}", *enable as u8),
            AtCommand::Cmee { enable } => format!("AT+CMEE={}", *enable as u8),
            AtCommand::Answer => "ATA".to_string(),
            AtCommand::Dial { number } => format!("ATD{};", number),
            AtCommand::MemoryDial { location } => format!("ATD>{};", location),
            AtCommand::Redial => "AT+BLDN".to_string(),
            AtCommand::HangUp => "AT+CHUP".to_string(),
            AtCommand::CallHold { action } => format!("AT+CHLD={}", action.to_argument()),
            AtCommand::Dtmf { tone } => format!("AT+VTS={}", tone),
            AtCommand::BtrhRead => "AT+BTRH?".to_string(),
            AtCommand::BtrhSet { action } => format!("AT+BTRH={}", action),
            AtCommand::KeyPress => format!("AT+CKPD={}", CKPD_KEY_CODE),
            AtCommand::ListCurrentCalls => "AT+CLCC".to_string(),
            AtCommand::CopsRead => "AT+COPS?".to_string(),
            AtCommand::SubscriberNumber => "AT+CNUM".to_string(),
            AtCommand::Bcc => "AT+BCC".to_string(),
            AtCommand::Bcs { codec } => format!("AT+BCS={}", codec),
            AtCommand::SpeakerVolume { level } => format!("AT+VGS={}", level),
            AtCommand::MicrophoneVolume { level } => format!("AT+VGM={}", level),
            AtCommand::Nrec { enable } => format!("AT+NREC={}", *enable as u8),
            AtCommand::VoiceRecognition { enable } => format!("AT+BVRA={}", *enable as u8),
            AtCommand::Biev { anum, value } => format!("AT+BIEV={},{}", anum, value),
            AtCommand::Vendor { text } => text.clone(),
        }
    }

    /// Encode the command as bytes ready for transmission.
    pub fn to_bytes(&self) -> Vec<u8> {
        AtFrameParser::encode_command(&self.encode())
    }

    /// Validate parameters that the type system cannot express.
    pub fn validate(&self) -> AtResult<()> {
        use crate::constants::MAX_VOLUME_LEVEL;
        match self {
            AtCommand::Dial { number } if !is_dialable(number) => Err(AtError::InvalidCommand(
                format!("not a dialable number: '{}'", number),
            )),
            AtCommand::Dtmf { tone } if !is_dtmf(*tone) => Err(AtError::InvalidCommand(format!(
                "not a DTMF tone: '{}'",
                tone
            ))),
            AtCommand::SpeakerVolume { level } | AtCommand::MicrophoneVolume { level }
                if *level > MAX_VOLUME_LEVEL =>
            {
                Err(AtError::InvalidCommand(format!(
                    "volume {} out of range 0-{}",
                    level, MAX_VOLUME_LEVEL
                )))
            }
            AtCommand::BtrhSet { action } if *action > 2 => Err(AtError::InvalidCommand(format!(
                "response and hold action {} out of range 0-2",
                action
            ))),
            AtCommand::Vendor { text } if !text.starts_with("AT") || text.contains('\r') => {
                Err(AtError::InvalidCommand(format!("not an AT command: '{}'", text)))
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for AtCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Whether a string only contains characters valid in a dial string.
pub fn is_dialable(number: &str) -> bool {
    !number.is_empty()
        && number
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '*' | '#' | '+' | 'A'..='D' | 'a'..='d' | ',' | 'W' | 'w' | 'P' | 'p'))
}

/// Whether a character is a DTMF tone.
pub fn is_dtmf(tone: char) -> bool {
    tone.is_ascii_digit() || matches!(tone, '*' | '#' | 'A'..='D')
}

fn join<T: std::fmt::Display>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_slc_commands() {
        assert_eq!(AtCommand::Brsf { features: 0x1ff }.encode(), "AT+BRSF=511");
        assert_eq!(AtCommand::Bac { codecs: vec![1, 2] }.encode(), "AT+BAC=1,2");
        assert_eq!(AtCommand::Cmer.encode(), "AT+CMER=3,0,0,1");
        assert_eq!(AtCommand::BindSet { indicators: vec![1, 2] }.encode(), "AT+BIND=1,2");
    }

    #[test]
    fn test_encode_call_control() {
        assert_eq!(AtCommand::Dial { number: "5551234".into() }.encode(), "ATD5551234;");
        assert_eq!(AtCommand::MemoryDial { location: 3 }.encode(), "ATD>3;");
        assert_eq!(
            AtCommand::CallHold { action: ChldAction::ReleaseSpecified(2) }.encode(),
            "AT+CHLD=12"
        );
        assert_eq!(AtCommand::KeyPress.encode(), "AT+CKPD=200");
    }

    #[test]
    fn test_bia_encoding() {
        let cmd = AtCommand::Bia { activation: vec![true, false, true] };
        assert_eq!(cmd.encode(), "AT+BIA=1,0,1");
    }

    #[test]
    fn test_to_bytes_appends_cr() {
        assert_eq!(AtCommand::HangUp.to_bytes(), b"AT+CHUP\r");
    }

    #[test]
    fn test_command_heads() {
        assert_eq!(AtCommandId::CindTest.head(), Some("AT+CIND=?"));
        assert_eq!(AtCommandId::ChldSet.head(), Some("AT+CHLD="));
        assert_eq!(AtCommandId::Vendor.head(), None);
    }

    #[test]
    fn test_id_agrees_with_encoding() {
        let commands = [
            AtCommand::CindTest,
            AtCommand::CindRead,
            AtCommand::ChldTest,
            AtCommand::BindRead,
            AtCommand::CopsSetFormat,
            AtCommand::Answer,
            AtCommand::Redial,
            AtCommand::ListCurrentCalls,
            AtCommand::Bcs { codec: 2 },
            AtCommand::Biev { anum: 2, value: 80 },
        ];
        for cmd in commands {
            let head = cmd.id().head().expect("table entry");
            assert!(cmd.encode().starts_with(head), "{}", cmd);
        }
    }

    #[test]
    fn test_validate() {
        assert!(AtCommand::Dial { number: "+1555*31#".into() }.validate().is_ok());
        assert!(AtCommand::Dial { number: "".into() }.validate().is_err());
        assert!(AtCommand::Dial { number: "12;ATH".into() }.validate().is_err());
        assert!(AtCommand::SpeakerVolume { level: 16 }.validate().is_err());
        assert!(AtCommand::Dtmf { tone: 'x' }.validate().is_err());
        assert!(AtCommand::Vendor { text: "AT+XAPL=1".into() }.validate().is_ok());
    }

    #[test]
    fn test_error_tolerance() {
        assert!(AtCommandId::Bac.tolerates_error());
        assert!(AtCommandId::Bcs.tolerates_error());
        assert!(!AtCommandId::Clcc.tolerates_error());
        assert!(!AtCommandId::Atd.tolerates_error());
    }
}
