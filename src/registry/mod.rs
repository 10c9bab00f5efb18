//! Bluetooth entity registry
//!
//! Tracks the Adapter → Device → Transport tree that external lifecycle
//! managers populate, and derives the bus object path of every entity.
//!
//! # Architecture
//!
//! ```text
//!                       Registry
//!              ┌──────────────────────────┐
//!              │ RwLock<[Option<Adapter>; │
//!              │         HCI_MAX_DEV]>    │
//!              └────────────┬─────────────┘
//!                           │ index
//!                           ▼
//!                AdapterNode { devices: HashMap<BdAddr, _> }
//!                           │ address
//!                           ▼
//!                DeviceNode { transports: HashMap<TransportProfile, _> }
//!                           │ profile
//!                           ▼
//!                TransportNode { path, export }
//! ```
//!
//! Paths are derived from (index, address, profile), so path uniqueness
//! follows from key uniqueness.

pub mod path;
pub mod store;
pub mod types;

pub use path::{manager_path, transport_path, ROOT_PATH};
pub use store::{Adapter, Device, Registry, Transport, TransportKey};
pub use types::{BdAddr, TransportProfile, HCI_MAX_DEV};
