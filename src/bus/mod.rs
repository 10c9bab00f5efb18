//! Message bus substrate
//!
//! The exporter talks to the bus through two seams:
//!
//! ```text
//! ObjectExporter ──register/unregister/emit──► dyn ObjectBus
//!                                                  │
//!                         incoming calls ──────────┤ routed by path
//!                                                  ▼
//!                                            dyn BusObject
//!                                   (ManagerObject | TransportObject)
//! ```
//!
//! `DbusBus` serves the objects on a D-Bus connection (zbus object server);
//! `LocalBus` is the in-process implementation used when embedding the core
//! without a bus daemon, and by the tests.

pub mod dbus;
pub mod local;
pub mod message;

pub use dbus::{BusKind, DbusBus};
pub use local::LocalBus;
pub use message::{
    BusSignal, EndpointEntry, MethodError, MethodReply, PropertyMap, PropertyValue, SignalMessage,
};
/// Owned, validated D-Bus object path
pub use zbus::zvariant::OwnedObjectPath as ObjectPath;

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

use thiserror::Error;
use zbus::zvariant;

/// Validate `path` against the object path grammar
pub fn object_path(path: &str) -> Result<ObjectPath, BusError> {
    zvariant::ObjectPath::try_from(path)
        .map(ObjectPath::from)
        .map_err(|_| BusError::InvalidPath(path.to_string()))
}

/// Identifier of a live object registration
///
/// Never zero; an unexposed object has no registration at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(NonZeroU32);

impl RegistrationId {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bind-time errors reported by the bus
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Invalid object path: {0:?}")]
    InvalidPath(String),

    #[error("Object path already registered: {0}")]
    PathInUse(ObjectPath),

    #[error("Object limit reached ({0})")]
    Exhausted(usize),

    #[error("Interface not served by this bus: {0}")]
    UnsupportedInterface(String),

    #[error("D-Bus error: {0}")]
    Dbus(String),
}

/// Handlers for one exported object
///
/// Implementors override the handlers their interface supports; the defaults
/// answer with the standard "unknown" errors.
pub trait BusObject: Send + Sync {
    /// Handle a method call on this object
    fn method_call(&self, interface: &str, method: &str) -> Result<MethodReply, MethodError> {
        Err(MethodError::unknown_method(interface, method))
    }

    /// Handle a property read on this object
    fn get_property(&self, _interface: &str, property: &str) -> Result<PropertyValue, MethodError> {
        Err(MethodError::no_such_property(property))
    }
}

/// Object registration and signal emission
pub trait ObjectBus: Send + Sync {
    /// Bind `object` at `path` for `interface`
    ///
    /// Fails if the path is already bound or the bus is out of resources.
    fn register_object(
        &self,
        path: &ObjectPath,
        interface: &str,
        object: Arc<dyn BusObject>,
    ) -> Result<RegistrationId, BusError>;

    /// Remove a registration; returns false if it was not live
    fn unregister_object(&self, id: RegistrationId) -> bool;

    /// Emit a signal from `path`; best-effort, no delivery confirmation
    fn emit_signal(&self, path: &ObjectPath, interface: &str, signal: BusSignal);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_path_validation() {
        assert_eq!(object_path("/org/bluealsa").unwrap().as_str(), "/org/bluealsa");
        assert!(object_path("/").is_ok());
        for path in ["", "org", "/org/", "//org", "/dev:AA", "/a-b"] {
            assert_eq!(
                object_path(path),
                Err(BusError::InvalidPath(path.to_string())),
                "{path:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_registration_id_is_non_zero() {
        assert!(RegistrationId::new(0).is_none());
        assert_eq!(RegistrationId::new(7).unwrap().get(), 7);
    }
}
