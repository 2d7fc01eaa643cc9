//! Protocol constants
//!
//! Feature bits exchanged in `AT+BRSF` / `+BRSF`, call-hold capabilities
//! from `+CHLD`, codec identifiers and HF indicator assigned numbers.

// ============================================================================
// HF Supported Features (sent in AT+BRSF)
// ============================================================================

/// EC and/or NR function.
pub const HF_FEATURE_ECNR: u32 = 1 << 0;
/// Call waiting or three-way calling.
pub const HF_FEATURE_THREE_WAY: u32 = 1 << 1;
/// CLI presentation capability.
pub const HF_FEATURE_CLI: u32 = 1 << 2;
/// Voice recognition activation.
pub const HF_FEATURE_VOICE_RECOGNITION: u32 = 1 << 3;
/// Remote volume control.
pub const HF_FEATURE_REMOTE_VOLUME: u32 = 1 << 4;
/// Enhanced call status.
pub const HF_FEATURE_ENHANCED_CALL_STATUS: u32 = 1 << 5;
/// Enhanced call control.
pub const HF_FEATURE_ENHANCED_CALL_CONTROL: u32 = 1 << 6;
/// Codec negotiation.
pub const HF_FEATURE_CODEC_NEGOTIATION: u32 = 1 << 7;
/// HF indicators.
pub const HF_FEATURE_HF_INDICATORS: u32 = 1 << 8;
/// eSCO S4 settings.
pub const HF_FEATURE_ESCO_S4: u32 = 1 << 9;

// ============================================================================
// AG Supported Features (received in +BRSF)
// ============================================================================

/// Three-way calling.
pub const AG_FEATURE_THREE_WAY: u32 = 1 << 0;
/// EC and/or NR function.
pub const AG_FEATURE_ECNR: u32 = 1 << 1;
/// Voice recognition function.
pub const AG_FEATURE_VOICE_RECOGNITION: u32 = 1 << 2;
/// In-band ring tone capability.
pub const AG_FEATURE_IN_BAND_RING: u32 = 1 << 3;
/// Attach a number to a voice tag.
pub const AG_FEATURE_VOICE_TAG: u32 = 1 << 4;
/// Ability to reject a call.
pub const AG_FEATURE_REJECT_CALL: u32 = 1 << 5;
/// Enhanced call status.
pub const AG_FEATURE_ENHANCED_CALL_STATUS: u32 = 1 << 6;
/// Enhanced call control.
pub const AG_FEATURE_ENHANCED_CALL_CONTROL: u32 = 1 << 7;
/// Extended error result codes.
pub const AG_FEATURE_EXTENDED_ERRORS: u32 = 1 << 8;
/// Codec negotiation.
pub const AG_FEATURE_CODEC_NEGOTIATION: u32 = 1 << 9;
/// HF indicators.
pub const AG_FEATURE_HF_INDICATORS: u32 = 1 << 10;
/// eSCO S4 settings.
pub const AG_FEATURE_ESCO_S4: u32 = 1 << 11;

// ============================================================================
// Call hold capabilities (+CHLD: (...))
// ============================================================================

/// `0`: release all held calls or set UDUB for a waiting call.
pub const CHLD_RELEASE_HELD: u32 = 1 << 0;
/// `1`: release active calls and accept the other call.
pub const CHLD_RELEASE_ACTIVE_ACCEPT_OTHER: u32 = 1 << 1;
/// `1x`: release a specific active call.
pub const CHLD_RELEASE_SPECIFIED: u32 = 1 << 2;
/// `2`: hold active calls and accept the other call.
pub const CHLD_HOLD_ACTIVE_ACCEPT_OTHER: u32 = 1 << 3;
/// `2x`: private consultation with a specific call.
pub const CHLD_PRIVATE_CONSULTATION: u32 = 1 << 4;
/// `3`: add held call to the conversation.
pub const CHLD_MERGE: u32 = 1 << 5;
/// `4`: explicit call transfer.
pub const CHLD_MERGE_DETACH: u32 = 1 << 6;

// ============================================================================
// Codecs and indicators
// ============================================================================

/// CVSD narrow band codec, mandatory.
pub const CODEC_CVSD: u8 = 1;
/// mSBC wide band codec.
pub const CODEC_MSBC: u8 = 2;

/// Enhanced driver safety HF indicator.
pub const HF_INDICATOR_DRIVER_SAFETY: u16 = 1;
/// Battery level HF indicator.
pub const HF_INDICATOR_BATTERY_LEVEL: u16 = 2;

/// Key code sent by `AT+CKPD` (headset button press).
pub const CKPD_KEY_CODE: u16 = 200;

/// Highest speaker / microphone gain accepted by `AT+VGS` / `AT+VGM`.
pub const MAX_VOLUME_LEVEL: u8 = 15;
