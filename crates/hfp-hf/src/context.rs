//! Per-connection negotiated state.

use hfp_at_protocol::{
    AG_FEATURE_CODEC_NEGOTIATION, AG_FEATURE_ECNR, AG_FEATURE_ENHANCED_CALL_CONTROL,
    AG_FEATURE_ENHANCED_CALL_STATUS, AG_FEATURE_HF_INDICATORS, AG_FEATURE_IN_BAND_RING,
    AG_FEATURE_THREE_WAY, AG_FEATURE_VOICE_RECOGNITION, CODEC_CVSD, HF_FEATURE_CODEC_NEGOTIATION,
    HF_FEATURE_ECNR, HF_FEATURE_ENHANCED_CALL_CONTROL, HF_FEATURE_ENHANCED_CALL_STATUS,
    HF_FEATURE_HF_INDICATORS, HF_FEATURE_THREE_WAY, HF_FEATURE_VOICE_RECOGNITION,
};
use std::sync::Arc;

use crate::config::LocalCapabilities;
use crate::indicators::{AgIndicatorTable, HfIndicatorSet};
use crate::types::{DeviceAddress, Role};

/// SDP supported-feature bits that sit at the same position in `+BRSF`.
const SDP_BRSF_SHARED_FEATURES: u32 = 0x1F;

/// What one HF/AG pair negotiated. Created on first contact with a device
/// and dropped once it is back in Disconnected.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub address: DeviceAddress,
    pub role: Role,
    local: Arc<LocalCapabilities>,
    /// AG features from `+BRSF`.
    pub remote_features: u32,
    /// AG features found by service discovery, if any.
    pub sdp_features: Option<u32>,
    /// Call hold capabilities from `+CHLD: (...)`.
    pub remote_chld_features: u32,
    pub negotiated_codec: u8,
    pub slc_established: bool,
    pub ag_indicators: AgIndicatorTable,
    pub hf_indicators: HfIndicatorSet,
    pub in_band_ring: bool,
    pub operator_name: Option<String>,
    pub speaker_volume: Option<u8>,
    pub microphone_volume: Option<u8>,
    pub voice_recognition_active: bool,
}

impl ConnectionContext {
    pub fn new(address: DeviceAddress, role: Role, local: Arc<LocalCapabilities>) -> Self {
        let hf_indicators = HfIndicatorSet::new(&local.hf_indicators);
        ConnectionContext {
            address,
            role,
            local,
            remote_features: 0,
            sdp_features: None,
            remote_chld_features: 0,
            negotiated_codec: CODEC_CVSD,
            slc_established: false,
            ag_indicators: AgIndicatorTable::default(),
            hf_indicators,
            in_band_ring: false,
            operator_name: None,
            speaker_volume: None,
            microphone_volume: None,
            voice_recognition_active: false,
        }
    }

    /// Local capabilities shared by all connections.
    pub fn local(&self) -> &LocalCapabilities {
        &self.local
    }

    /// Record the AG features from `+BRSF`.
    pub fn set_remote_features(&mut self, features: u32) {
        self.remote_features = features;
        self.in_band_ring = features & AG_FEATURE_IN_BAND_RING != 0;
    }

    /// Record the AG features found by service discovery. Until `+BRSF`
    /// answers they stand in for the remote feature set.
    pub fn set_sdp_features(&mut self, features: Option<u32>) {
        self.sdp_features = features;
        if let Some(features) = features {
            self.set_remote_features(features & SDP_BRSF_SHARED_FEATURES);
        }
    }

    /// Whether both sides set their bit for a feature.
    pub fn both_support(&self, hf_feature: u32, ag_feature: u32) -> bool {
        self.local.supports(hf_feature) && self.remote_features & ag_feature != 0
    }

    pub fn codec_negotiation_supported(&self) -> bool {
        self.both_support(HF_FEATURE_CODEC_NEGOTIATION, AG_FEATURE_CODEC_NEGOTIATION)
    }

    pub fn three_way_supported(&self) -> bool {
        self.both_support(HF_FEATURE_THREE_WAY, AG_FEATURE_THREE_WAY)
    }

    pub fn hf_indicators_supported(&self) -> bool {
        self.both_support(HF_FEATURE_HF_INDICATORS, AG_FEATURE_HF_INDICATORS)
    }

    pub fn enhanced_call_status_supported(&self) -> bool {
        self.both_support(HF_FEATURE_ENHANCED_CALL_STATUS, AG_FEATURE_ENHANCED_CALL_STATUS)
    }

    pub fn enhanced_call_control_supported(&self) -> bool {
        self.both_support(HF_FEATURE_ENHANCED_CALL_CONTROL, AG_FEATURE_ENHANCED_CALL_CONTROL)
    }

    pub fn voice_recognition_supported(&self) -> bool {
        self.both_support(HF_FEATURE_VOICE_RECOGNITION, AG_FEATURE_VOICE_RECOGNITION)
    }

    pub fn ecnr_supported(&self) -> bool {
        self.both_support(HF_FEATURE_ECNR, AG_FEATURE_ECNR)
    }

    /// Forget everything negotiated with the AG, keeping address and local
    /// capabilities.
    pub fn reset(&mut self) {
        let role = self.role;
        *self = ConnectionContext::new(self.address, role, Arc::clone(&self.local));
    }
}
