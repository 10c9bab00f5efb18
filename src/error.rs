use thiserror::Error;

use crate::bus::{BusError, ObjectPath};

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid adapter index: hci{0}")]
    InvalidAdapter(u16),

    #[error("Adapter excluded by HCI filter: {0}")]
    AdapterFiltered(String),

    #[error("Adapter not found: hci{0}")]
    AdapterNotFound(u16),

    #[error("Device not found [hci{adapter}]: {device}")]
    DeviceNotFound { adapter: u16, device: String },

    #[error("Invalid Bluetooth address: {0}")]
    InvalidAddress(String),

    #[error("Invalid transport profile: {0:#x}")]
    InvalidProfile(u32),

    #[error("Transport not found: {0}")]
    TransportNotFound(ObjectPath),

    #[error("Transport already exists: {0}")]
    TransportExists(ObjectPath),

    #[error("Transport already exposed: {0}")]
    AlreadyExposed(ObjectPath),

    #[error("Profile disabled: {0}")]
    ProfileDisabled(String),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

/// Result type alias for library operations
pub type Result<T> = std::result::Result<T, AppError>;
