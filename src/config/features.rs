//! HFP feature bits advertised over SDP and exchanged via AT+BRSF
//!
//! The optional `msbc` cargo feature adds wideband speech, codec negotiation
//! and eSCO S4 support to the advertised masks.

/// SDP "SupportedFeatures" bits of the hands-free role
pub mod sdp_hf {
    pub const ECNR: u32 = 1 << 0;
    pub const THREE_WAY_CALLING: u32 = 1 << 1;
    pub const CLI: u32 = 1 << 2;
    pub const VOICE_RECOGNITION: u32 = 1 << 3;
    pub const VOLUME: u32 = 1 << 4;
    pub const WIDEBAND: u32 = 1 << 5;
}

/// SDP "SupportedFeatures" bits of the audio-gateway role
pub mod sdp_ag {
    pub const THREE_WAY_CALLING: u32 = 1 << 0;
    pub const ECNR: u32 = 1 << 1;
    pub const VOICE_RECOGNITION: u32 = 1 << 2;
    pub const IN_BAND_RING: u32 = 1 << 3;
    pub const VOICE_TAG: u32 = 1 << 4;
    pub const WIDEBAND: u32 = 1 << 5;
}

/// AT+BRSF bits of the hands-free role
pub mod rfcomm_hf {
    pub const ECNR: u32 = 1 << 0;
    pub const THREE_WAY_CALLING: u32 = 1 << 1;
    pub const CLI: u32 = 1 << 2;
    pub const VOICE_RECOGNITION: u32 = 1 << 3;
    pub const VOLUME: u32 = 1 << 4;
    pub const ENHANCED_CALL_STATUS: u32 = 1 << 5;
    pub const ENHANCED_CALL_CONTROL: u32 = 1 << 6;
    pub const CODEC_NEGOTIATION: u32 = 1 << 7;
    pub const HF_INDICATORS: u32 = 1 << 8;
    pub const ESCO_S4: u32 = 1 << 9;
}

/// +BRSF bits of the audio-gateway role
pub mod rfcomm_ag {
    pub const THREE_WAY_CALLING: u32 = 1 << 0;
    pub const ECNR: u32 = 1 << 1;
    pub const VOICE_RECOGNITION: u32 = 1 << 2;
    pub const IN_BAND_RING: u32 = 1 << 3;
    pub const VOICE_TAG: u32 = 1 << 4;
    pub const REJECT_CALL: u32 = 1 << 5;
    pub const ENHANCED_CALL_STATUS: u32 = 1 << 6;
    pub const ENHANCED_CALL_CONTROL: u32 = 1 << 7;
    pub const EXTENDED_ERROR_CODES: u32 = 1 << 8;
    pub const CODEC_NEGOTIATION: u32 = 1 << 9;
    pub const HF_INDICATORS: u32 = 1 << 10;
    pub const ESCO_S4: u32 = 1 << 11;
}

/// Feature masks for both HFP roles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HfpFeatures {
    pub sdp_hf: u32,
    pub sdp_ag: u32,
    pub rfcomm_hf: u32,
    pub rfcomm_ag: u32,
}

impl HfpFeatures {
    /// Masks for the capabilities compiled into this build
    pub fn compiled() -> Self {
        Self::compose(cfg!(feature = "msbc"))
    }

    /// Base masks, plus the mSBC-related bits when `wideband` is set
    pub fn compose(wideband: bool) -> Self {
        let mut features = Self {
            sdp_hf: sdp_hf::CLI | sdp_hf::VOLUME,
            sdp_ag: 0,
            rfcomm_hf: rfcomm_hf::CLI
                | rfcomm_hf::VOLUME
                | rfcomm_hf::ENHANCED_CALL_STATUS
                | rfcomm_hf::ENHANCED_CALL_CONTROL,
            rfcomm_ag: rfcomm_ag::REJECT_CALL
                | rfcomm_ag::ENHANCED_CALL_STATUS
                | rfcomm_ag::ENHANCED_CALL_CONTROL
                | rfcomm_ag::EXTENDED_ERROR_CODES,
        };

        if wideband {
            features.sdp_hf |= sdp_hf::WIDEBAND;
            features.sdp_ag |= sdp_ag::WIDEBAND;
            features.rfcomm_hf |= rfcomm_hf::CODEC_NEGOTIATION | rfcomm_hf::ESCO_S4;
            features.rfcomm_ag |= rfcomm_ag::CODEC_NEGOTIATION | rfcomm_ag::ESCO_S4;
        }

        features
    }

    /// Whether codec negotiation (and thus mSBC) is advertised
    pub fn supports_wideband(&self) -> bool {
        self.rfcomm_ag & rfcomm_ag::CODEC_NEGOTIATION != 0
    }
}
