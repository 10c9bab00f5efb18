//! BlueALSA - Bluetooth audio object registry
//!
//! This crate provides the core of the BlueALSA daemon: the registry of
//! adapters, devices and transports, their exposure as bus objects, and the
//! manager query that lets peers discover audio endpoints.

pub mod bus;
pub mod codec;
pub mod config;
pub mod error;
pub mod exporter;
pub mod manager;
pub mod registry;

pub use error::{AppError, Result};
