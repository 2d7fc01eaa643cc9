//! HF configuration.
//!
//! [`HfConfig`] is the YAML-facing description of the local HF. It is
//! validated once and turned into [`LocalCapabilities`], which every
//! connection shares read-only.

use hfp_at_protocol::{
    CODEC_CVSD, CODEC_MSBC, HF_FEATURE_CLI, HF_FEATURE_CODEC_NEGOTIATION, HF_FEATURE_ECNR,
    HF_FEATURE_ENHANCED_CALL_CONTROL, HF_FEATURE_ENHANCED_CALL_STATUS, HF_FEATURE_ESCO_S4,
    HF_FEATURE_HF_INDICATORS, HF_FEATURE_REMOTE_VOLUME, HF_FEATURE_THREE_WAY,
    HF_FEATURE_VOICE_RECOGNITION, HF_INDICATOR_BATTERY_LEVEL, HF_INDICATOR_DRIVER_SAFETY,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{HfError, Result};

/// Default time the AG has to close a command.
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 30_000;
/// Default budget for a transient connection state.
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 10_000;
/// Default budget for a transient audio state.
pub const DEFAULT_AUDIO_TIMEOUT_MS: u64 = 10_000;

/// Local HF feature switches, mapped onto the `AT+BRSF` bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HfFeatures {
    pub ecnr: bool,
    pub three_way_calling: bool,
    pub cli_presentation: bool,
    pub voice_recognition: bool,
    pub remote_volume: bool,
    pub enhanced_call_status: bool,
    pub enhanced_call_control: bool,
    pub codec_negotiation: bool,
    pub hf_indicators: bool,
    pub esco_s4: bool,
}

impl HfFeatures {
    /// Every feature switched off.
    pub const fn none() -> Self {
        HfFeatures {
            ecnr: false,
            three_way_calling: false,
            cli_presentation: false,
            voice_recognition: false,
            remote_volume: false,
            enhanced_call_status: false,
            enhanced_call_control: false,
            codec_negotiation: false,
            hf_indicators: false,
            esco_s4: false,
        }
    }

    /// The `AT+BRSF` bitmask for these switches.
    pub fn bits(&self) -> u32 {
        [
            (self.ecnr, HF_FEATURE_ECNR),
            (self.three_way_calling, HF_FEATURE_THREE_WAY),
            (self.cli_presentation, HF_FEATURE_CLI),
            (self.voice_recognition, HF_FEATURE_VOICE_RECOGNITION),
            (self.remote_volume, HF_FEATURE_REMOTE_VOLUME),
            (self.enhanced_call_status, HF_FEATURE_ENHANCED_CALL_STATUS),
            (self.enhanced_call_control, HF_FEATURE_ENHANCED_CALL_CONTROL),
            (self.codec_negotiation, HF_FEATURE_CODEC_NEGOTIATION),
            (self.hf_indicators, HF_FEATURE_HF_INDICATORS),
            (self.esco_s4, HF_FEATURE_ESCO_S4),
        ]
        .iter()
        .filter(|(enabled, _)| *enabled)
        .fold(0, |acc, (_, bit)| acc | bit)
    }
}

impl Default for HfFeatures {
    fn default() -> Self {
        HfFeatures {
            ecnr: true,
            three_way_calling: true,
            cli_presentation: true,
            voice_recognition: true,
            remote_volume: true,
            enhanced_call_status: true,
            enhanced_call_control: true,
            codec_negotiation: true,
            hf_indicators: true,
            esco_s4: true,
        }
    }
}

/// Configuration of the local HF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HfConfig {
    /// Supported features announced in `AT+BRSF`.
    pub features: HfFeatures,
    /// Codecs announced in `AT+BAC`, CVSD is mandatory.
    pub codecs: Vec<u8>,
    /// HF indicators announced in `AT+BIND`.
    pub hf_indicators: Vec<u16>,
    /// AG indicator names to deactivate with `AT+BIA`.
    pub deactivated_indicators: Vec<String>,
    /// Time the AG has to close a command, in milliseconds.
    pub response_timeout_ms: u64,
    /// Budget for connecting and disconnecting, in milliseconds.
    pub connection_timeout_ms: u64,
    /// Budget for audio setup and teardown, in milliseconds.
    pub audio_timeout_ms: u64,
}

impl Default for HfConfig {
    fn default() -> Self {
        HfConfig {
            features: HfFeatures::default(),
            codecs: vec![CODEC_CVSD, CODEC_MSBC],
            hf_indicators: vec![HF_INDICATOR_DRIVER_SAFETY, HF_INDICATOR_BATTERY_LEVEL],
            deactivated_indicators: Vec::new(),
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            audio_timeout_ms: DEFAULT_AUDIO_TIMEOUT_MS,
        }
    }
}

impl HfConfig {
    /// Parse a configuration from YAML text. Missing fields take defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Validate and derive the capabilities shared by all connections.
    pub fn capabilities(&self) -> Result<LocalCapabilities> {
        if !self.codecs.contains(&CODEC_CVSD) {
            return Err(HfError::Config("codec list must contain CVSD (1)".into()));
        }
        if let Some(codec) = self.codecs.iter().find(|c| **c != CODEC_CVSD && **c != CODEC_MSBC) {
            return Err(HfError::Config(format!("unknown codec id {}", codec)));
        }
        if let Some(anum) = self
            .hf_indicators
            .iter()
            .find(|a| **a != HF_INDICATOR_DRIVER_SAFETY && **a != HF_INDICATOR_BATTERY_LEVEL)
        {
            return Err(HfError::Config(format!("unknown HF indicator {}", anum)));
        }
        if self.response_timeout_ms == 0 || self.connection_timeout_ms == 0 || self.audio_timeout_ms == 0 {
            return Err(HfError::Config("timeouts must be non-zero".into()));
        }

        let mut codecs = self.codecs.clone();
        codecs.sort_unstable();
        codecs.dedup();
        let mut hf_indicators = self.hf_indicators.clone();
        hf_indicators.sort_unstable();
        hf_indicators.dedup();

        Ok(LocalCapabilities {
            features: self.features.bits(),
            codecs,
            hf_indicators,
            deactivated_indicators: self.deactivated_indicators.clone(),
            response_timeout: Duration::from_millis(self.response_timeout_ms),
            connection_timeout: Duration::from_millis(self.connection_timeout_ms),
            audio_timeout: Duration::from_millis(self.audio_timeout_ms),
        })
    }
}

/// Immutable local capabilities, derived from [`HfConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCapabilities {
    /// HF supported features bitmask.
    pub features: u32,
    /// Supported codecs, sorted.
    pub codecs: Vec<u8>,
    /// Supported HF indicators, sorted.
    pub hf_indicators: Vec<u16>,
    /// AG indicator names to deactivate.
    pub deactivated_indicators: Vec<String>,
    pub response_timeout: Duration,
    pub connection_timeout: Duration,
    pub audio_timeout: Duration,
}

impl LocalCapabilities {
    /// Whether the given HF feature bit is set.
    pub fn supports(&self, feature: u32) -> bool {
        self.features & feature != 0
    }

    /// Whether the codec is supported locally.
    pub fn supports_codec(&self, codec: u8) -> bool {
        self.codecs.contains(&codec)
    }
}

impl Default for LocalCapabilities {
    fn default() -> Self {
        // The default configuration always validates.
        let config = HfConfig::default();
        LocalCapabilities {
            features: config.features.bits(),
            codecs: config.codecs,
            hf_indicators: config.hf_indicators,
            deactivated_indicators: Vec::new(),
            response_timeout: Duration::from_millis(config.response_timeout_ms),
            connection_timeout: Duration::from_millis(config.connection_timeout_ms),
            audio_timeout: Duration::from_millis(config.audio_timeout_ms),
        }
    }
}
