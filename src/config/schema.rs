use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::registry::TransportProfile;

/// Daemon settings, as loaded from file and CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaConfig {
    /// Profiles the daemon serves
    pub enable: EnabledProfiles,
    /// Accepted HCI adapters, e.g. `["hci0"]` (empty = all)
    pub hci_filter: Vec<String>,
    /// Group owning the exported audio endpoints (empty = no group restriction)
    pub audio_group: String,
    /// Discard sink the daemon keeps open for the whole run
    pub discard_sink: PathBuf,
    /// A2DP settings
    pub a2dp: A2dpConfig,
    /// AAC encoder settings
    pub aac: AacConfig,
    /// LDAC encoder settings
    pub ldac: LdacConfig,
}

impl Default for BaConfig {
    fn default() -> Self {
        Self {
            enable: EnabledProfiles::default(),
            hci_filter: Vec::new(),
            audio_group: "audio".to_string(),
            discard_sink: PathBuf::from("/dev/null"),
            a2dp: A2dpConfig::default(),
            aac: AacConfig::default(),
            ldac: LdacConfig::default(),
        }
    }
}

impl BaConfig {
    /// Load settings from a JSON file; missing sections take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde can not express
    pub fn validate(&self) -> Result<()> {
        if self.aac.vbr_mode > AacConfig::MAX_VBR_MODE {
            return Err(AppError::Config(format!(
                "AAC VBR mode {} out of range (0-{})",
                self.aac.vbr_mode,
                AacConfig::MAX_VBR_MODE
            )));
        }
        if let Some(name) = self
            .hci_filter
            .iter()
            .find(|name| parse_hci_name(name).is_none())
        {
            return Err(AppError::Config(format!("Invalid HCI device name: {}", name)));
        }
        Ok(())
    }
}

fn parse_hci_name(name: &str) -> Option<u16> {
    name.strip_prefix("hci")?.parse().ok()
}

/// Profile enable switches
///
/// Output profiles (A2DP source, HFP AG, HSP AG) are on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnabledProfiles {
    pub a2dp_source: bool,
    pub a2dp_sink: bool,
    pub hfp_hf: bool,
    pub hfp_ag: bool,
    pub hsp_hs: bool,
    pub hsp_ag: bool,
}

impl Default for EnabledProfiles {
    fn default() -> Self {
        Self {
            a2dp_source: true,
            a2dp_sink: false,
            hfp_hf: false,
            hfp_ag: true,
            hsp_hs: false,
            hsp_ag: true,
        }
    }
}

impl EnabledProfiles {
    /// Profile names accepted on the command line
    pub const NAMES: [&'static str; 6] = ["a2dp-source", "a2dp-sink", "hfp-hf", "hfp-ag", "hsp-hs", "hsp-ag"];

    /// Nothing enabled
    pub fn none() -> Self {
        Self {
            a2dp_source: false,
            a2dp_sink: false,
            hfp_hf: false,
            hfp_ag: false,
            hsp_hs: false,
            hsp_ag: false,
        }
    }

    /// Build from a list of profile names (e.g. `-p a2dp-sink -p hfp-hf`)
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut enabled = Self::none();
        for name in names {
            match name.as_ref() {
                "a2dp-source" => enabled.a2dp_source = true,
                "a2dp-sink" => enabled.a2dp_sink = true,
                "hfp-hf" => enabled.hfp_hf = true,
                "hfp-ag" => enabled.hfp_ag = true,
                "hsp-hs" => enabled.hsp_hs = true,
                "hsp-ag" => enabled.hsp_ag = true,
                other => {
                    return Err(AppError::Config(format!(
                        "Unknown profile '{}' (expected one of: {})",
                        other,
                        Self::NAMES.join(", ")
                    )))
                }
            }
        }
        Ok(enabled)
    }

    /// Check whether transports of `profile` may be served
    ///
    /// A control channel follows its audio profile; a bare RFCOMM channel is
    /// allowed when any HFP/HSP role is enabled.
    pub fn allows(&self, profile: TransportProfile) -> bool {
        match profile.audio_profile() {
            Some(p) if p == TransportProfile::A2DP_SOURCE => self.a2dp_source,
            Some(p) if p == TransportProfile::A2DP_SINK => self.a2dp_sink,
            Some(p) if p == TransportProfile::HFP_HF => self.hfp_hf,
            Some(p) if p == TransportProfile::HFP_AG => self.hfp_ag,
            Some(p) if p == TransportProfile::HSP_HS => self.hsp_hs,
            Some(p) if p == TransportProfile::HSP_AG => self.hsp_ag,
            Some(_) => false,
            None => self.hfp_hf || self.hfp_ag || self.hsp_hs || self.hsp_ag,
        }
    }
}

/// A2DP configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct A2dpConfig {
    /// Use native volume control instead of software scaling
    pub volume: bool,
    /// Force monophonic sound
    pub force_mono: bool,
    /// Force 44.1 kHz sampling
    pub force_44100: bool,
    /// Keep transport alive after the PCM is closed (seconds)
    pub keep_alive: u32,
}

impl Default for A2dpConfig {
    fn default() -> Self {
        Self {
            volume: false,
            force_mono: false,
            force_44100: false,
            keep_alive: 0,
        }
    }
}

/// AAC encoder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AacConfig {
    /// Afterburner costs a lot of power and produces larger payloads
    pub afterburner: bool,
    /// Variable bitrate mode (0 = CBR, 1-5 = VBR quality)
    pub vbr_mode: u8,
}

impl AacConfig {
    pub const MAX_VBR_MODE: u8 = 5;
}

impl Default for AacConfig {
    fn default() -> Self {
        Self {
            afterburner: false,
            vbr_mode: 4,
        }
    }
}

/// LDAC encoder quality (encoder EQMID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LdacQuality {
    /// High quality, 990/909 kbps
    High,
    /// Standard quality, 660/606 kbps
    Standard,
    /// Mobile use quality, 330/303 kbps
    Mobile,
}

impl LdacQuality {
    /// Encoder EQMID value
    pub fn eqmid(self) -> u8 {
        match self {
            LdacQuality::High => 0,
            LdacQuality::Standard => 1,
            LdacQuality::Mobile => 2,
        }
    }
}

/// LDAC encoder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LdacConfig {
    /// Adaptive bitrate
    pub abr: bool,
    pub eqmid: LdacQuality,
}

impl Default for LdacConfig {
    fn default() -> Self {
        Self {
            abr: false,
            eqmid: LdacQuality::Standard,
        }
    }
}
