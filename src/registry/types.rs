//! Registry identity types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Maximum number of HCI adapters (BlueZ `HCI_MAX_DEV`)
pub const HCI_MAX_DEV: u16 = 16;

/// Bluetooth device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BdAddr([u8; 6]);

impl BdAddr {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Path element form, e.g. `dev_AA_BB_CC_DD_EE_FF`
    pub fn path_element(&self) -> String {
        let b = self.0;
        format!(
            "dev_{:02X}_{:02X}_{:02X}_{:02X}_{:02X}_{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for BdAddr {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts
                .next()
                .filter(|p| p.len() == 2 && p.bytes().all(|b| b.is_ascii_hexdigit()))
                .ok_or_else(|| AppError::InvalidAddress(s.to_string()))?;
            *byte = u8::from_str_radix(part, 16)
                .map_err(|_| AppError::InvalidAddress(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(AppError::InvalidAddress(s.to_string()));
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for BdAddr {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BdAddr> for String {
    fn from(addr: BdAddr) -> Self {
        addr.to_string()
    }
}

/// Transport profile classifier
///
/// Bit layout: bits 0-1 A2DP (source, sink), bits 2-3 HFP (HF, AG),
/// bits 4-5 HSP (HS, AG), bit 6 RFCOMM. A valid classifier carries at most
/// one audio profile, optionally combined with the RFCOMM bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportProfile(u32);

impl TransportProfile {
    pub const A2DP_SOURCE: Self = Self(1 << 0);
    pub const A2DP_SINK: Self = Self(2 << 0);
    pub const HFP_HF: Self = Self(1 << 2);
    pub const HFP_AG: Self = Self(2 << 2);
    pub const HSP_HS: Self = Self(1 << 4);
    pub const HSP_AG: Self = Self(2 << 4);
    pub const RFCOMM: Self = Self(1 << 6);

    pub const MASK_A2DP: u32 = Self::A2DP_SOURCE.0 | Self::A2DP_SINK.0;
    pub const MASK_HFP: u32 = Self::HFP_HF.0 | Self::HFP_AG.0;
    pub const MASK_HSP: u32 = Self::HSP_HS.0 | Self::HSP_AG.0;
    pub const MASK_SCO: u32 = Self::MASK_HFP | Self::MASK_HSP;

    const AUDIO_PROFILES: [(Self, &'static str); 6] = [
        (Self::A2DP_SOURCE, "a2dpsrc"),
        (Self::A2DP_SINK, "a2dpsnk"),
        (Self::HFP_HF, "hfphf"),
        (Self::HFP_AG, "hfpag"),
        (Self::HSP_HS, "hsphs"),
        (Self::HSP_AG, "hspag"),
    ];

    /// Build a classifier from raw bits, rejecting unknown or conflicting bits
    pub fn from_bits(bits: u32) -> Result<Self> {
        let audio = bits & !Self::RFCOMM.0;
        let valid = bits != 0
            && (audio == 0 || Self::AUDIO_PROFILES.iter().any(|(p, _)| p.0 == audio));
        if valid {
            Ok(Self(bits))
        } else {
            Err(AppError::InvalidProfile(bits))
        }
    }

    /// Control channel for the given audio profile (e.g. HFP AG signaling)
    pub fn control_channel(self) -> Self {
        Self(self.0 | Self::RFCOMM.0)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Control-only transports carry no audio and are never enumerated
    pub fn is_control_only(self) -> bool {
        self.contains(Self::RFCOMM)
    }

    pub fn is_a2dp(self) -> bool {
        self.0 & Self::MASK_A2DP != 0
    }

    pub fn is_sco(self) -> bool {
        self.0 & Self::MASK_SCO != 0
    }

    /// Audio profile without the RFCOMM bit, if any
    pub fn audio_profile(self) -> Option<Self> {
        let audio = self.0 & !Self::RFCOMM.0;
        (audio != 0).then_some(Self(audio))
    }

    /// Last path element for transports of this profile
    ///
    /// Injective over valid classifiers, which keeps derived paths unique.
    pub fn path_tag(self) -> String {
        let base = Self::AUDIO_PROFILES
            .iter()
            .find(|(p, _)| Some(*p) == self.audio_profile())
            .map(|(_, tag)| *tag);
        match (base, self.is_control_only()) {
            (Some(tag), false) => tag.to_string(),
            (Some(tag), true) => format!("{}_rfcomm", tag),
            (None, _) => "rfcomm".to_string(),
        }
    }
}

impl fmt::Display for TransportProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path_tag())
    }
}
