//! A2DP codec table
//!
//! Lists the codecs this build can offer to BlueZ, per stream direction.
//! SBC is mandatory; the rest depend on cargo features.

use serde::Serialize;

/// A2DP media codec type: SBC
pub const A2DP_CODEC_SBC: u8 = 0x00;
/// A2DP media codec type: MPEG-1,2 Audio
pub const A2DP_CODEC_MPEG12: u8 = 0x01;
/// A2DP media codec type: MPEG-2,4 AAC
pub const A2DP_CODEC_MPEG24: u8 = 0x02;
/// A2DP media codec type: vendor specific
pub const A2DP_CODEC_VENDOR: u8 = 0xFF;

/// Known A2DP codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum A2dpCodec {
    Sbc,
    Mpeg12,
    Aac,
    Aptx,
    Ldac,
}

impl A2dpCodec {
    /// Media codec type octet
    pub fn codec_type(self) -> u8 {
        match self {
            A2dpCodec::Sbc => A2DP_CODEC_SBC,
            A2dpCodec::Mpeg12 => A2DP_CODEC_MPEG12,
            A2dpCodec::Aac => A2DP_CODEC_MPEG24,
            A2dpCodec::Aptx | A2dpCodec::Ldac => A2DP_CODEC_VENDOR,
        }
    }

    /// (vendor ID, vendor codec ID) for vendor-specific codecs
    pub fn vendor_id(self) -> Option<(u32, u16)> {
        match self {
            A2dpCodec::Aptx => Some((0x0000_004F, 0x0001)),
            A2dpCodec::Ldac => Some((0x0000_012D, 0x00AA)),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            A2dpCodec::Sbc => "SBC",
            A2dpCodec::Mpeg12 => "MP3",
            A2dpCodec::Aac => "AAC",
            A2dpCodec::Aptx => "aptX",
            A2dpCodec::Ldac => "LDAC",
        }
    }
}

/// Stream direction of a codec endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecDirection {
    /// We encode and send
    Source,
    /// We receive and decode
    Sink,
}

/// One registered codec endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CodecEntry {
    pub codec: A2dpCodec,
    pub direction: CodecDirection,
}

/// Ordered codec table (earlier entries are preferred)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodecTable {
    entries: Vec<CodecEntry>,
}

impl CodecTable {
    pub fn new(entries: Vec<CodecEntry>) -> Self {
        Self { entries }
    }

    /// Table for the codecs compiled into this build
    pub fn compiled() -> Self {
        use A2dpCodec::*;
        use CodecDirection::*;

        let mut entries = Vec::with_capacity(8);
        let mut push = |codec, direction| entries.push(CodecEntry { codec, direction });

        if cfg!(feature = "ldac") {
            push(Ldac, Source);
        }
        if cfg!(feature = "aptx") {
            push(Aptx, Source);
        }
        if cfg!(feature = "aac") {
            push(Aac, Source);
            push(Aac, Sink);
        }
        if cfg!(feature = "mpeg") {
            push(Mpeg12, Source);
            push(Mpeg12, Sink);
        }
        push(Sbc, Source);
        push(Sbc, Sink);

        Self { entries }
    }

    pub fn entries(&self) -> &[CodecEntry] {
        &self.entries
    }

    /// Codecs available for one direction, in preference order
    pub fn for_direction(&self, direction: CodecDirection) -> impl Iterator<Item = A2dpCodec> + '_ {
        self.entries
            .iter()
            .filter(move |e| e.direction == direction)
            .map(|e| e.codec)
    }

    pub fn supports(&self, codec: A2dpCodec, direction: CodecDirection) -> bool {
        self.entries
            .iter()
            .any(|e| e.codec == codec && e.direction == direction)
    }
}

impl Default for CodecTable {
    fn default() -> Self {
        Self::compiled()
    }
}
