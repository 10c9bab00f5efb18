//! Process-wide configuration
//!
//! Built once at startup from [`BaConfig`] and shared read-only afterwards.

use std::fs::{File, OpenOptions};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use nix::unistd::{Gid, Group};
use tracing::{debug, info, warn};

use crate::codec::CodecTable;
use crate::error::{AppError, Result};
use crate::registry::TransportProfile;

use super::features::HfpFeatures;
use super::schema::{BaConfig, EnabledProfiles};

/// Immutable process configuration
#[derive(Debug)]
pub struct ProcessConfig {
    settings: BaConfig,
    hfp: HfpFeatures,
    /// `None` when the audio group is unset or does not exist
    audio_gid: Option<Gid>,
    /// Write-only, non-blocking; held open for the life of the process
    discard_sink: File,
    owner_thread: ThreadId,
    codecs: CodecTable,
}

impl ProcessConfig {
    /// Initialize from settings, with the codecs compiled into this build
    ///
    /// The calling thread becomes the owner thread. Fails only if the
    /// discard sink can not be opened; a missing audio group is not fatal.
    pub fn init(settings: BaConfig) -> Result<Arc<Self>> {
        Self::init_with_codecs(settings, CodecTable::compiled())
    }

    /// Initialize with an explicit codec table
    pub fn init_with_codecs(settings: BaConfig, codecs: CodecTable) -> Result<Arc<Self>> {
        let discard_sink = open_discard_sink(&settings)?;
        let audio_gid = resolve_audio_group(&settings.audio_group);
        let hfp = HfpFeatures::compiled();

        info!(
            "Process config ready: audio group {}, {} codec endpoint(s)",
            audio_gid.map_or_else(|| "none".to_string(), |gid| gid.to_string()),
            codecs.entries().len()
        );
        debug!(
            "HFP features: SDP HF {:#x}, SDP AG {:#x}, RFCOMM HF {:#x}, RFCOMM AG {:#x}",
            hfp.sdp_hf, hfp.sdp_ag, hfp.rfcomm_hf, hfp.rfcomm_ag
        );

        Ok(Arc::new(Self {
            settings,
            hfp,
            audio_gid,
            discard_sink,
            owner_thread: thread::current().id(),
            codecs,
        }))
    }

    pub fn settings(&self) -> &BaConfig {
        &self.settings
    }

    /// Check whether transports of `profile` may be exported
    pub fn allows(&self, profile: TransportProfile) -> bool {
        self.settings.enable.allows(profile)
    }

    pub fn hfp_features(&self) -> &HfpFeatures {
        &self.hfp
    }

    /// Group that owns exported audio endpoints, if any
    pub fn audio_gid(&self) -> Option<Gid> {
        self.audio_gid
    }

    /// Descriptor of the discard sink
    pub fn discard_sink(&self) -> BorrowedFd<'_> {
        self.discard_sink.as_fd()
    }

    pub fn owner_thread(&self) -> ThreadId {
        self.owner_thread
    }

    /// Check whether the caller runs on the thread that initialized the config
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner_thread
    }

    pub fn codecs(&self) -> &CodecTable {
        &self.codecs
    }
}

fn open_discard_sink(settings: &BaConfig) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(&settings.discard_sink)
        .map_err(|e| {
            AppError::Config(format!(
                "Failed to open discard sink {}: {}",
                settings.discard_sink.display(),
                e
            ))
        })
}

fn resolve_audio_group(name: &str) -> Option<Gid> {
    if name.is_empty() {
        return None;
    }
    match Group::from_name(name) {
        Ok(Some(group)) => Some(group.gid),
        Ok(None) => {
            warn!("Couldn't get audio group: {} (not found)", name);
            None
        }
        Err(e) => {
            warn!("Couldn't get audio group: {} ({})", name, e);
            None
        }
    }
}
