//! Configuration
//!
//! `BaConfig` holds user-facing settings (file + CLI); `ProcessConfig` is the
//! immutable process-wide state derived from it at startup.

pub mod features;
pub mod process;
pub mod schema;

pub use features::HfpFeatures;
pub use process::ProcessConfig;
pub use schema::{A2dpConfig, AacConfig, BaConfig, EnabledProfiles, LdacConfig, LdacQuality};
