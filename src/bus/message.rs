//! Bus message payloads: replies, errors and signals

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ObjectPath;

/// Typed property value (the `v` in `a{sv}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    Bool(bool),
    U32(u32),
    Str(String),
    ObjectPath(ObjectPath),
}

/// Property map (`a{sv}`)
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// One `{oa{sv}}` entry of an endpoint listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointEntry {
    pub path: ObjectPath,
    pub properties: PropertyMap,
}

impl EndpointEntry {
    /// Entry with an empty property map
    pub fn new(path: ObjectPath) -> Self {
        Self {
            path,
            properties: PropertyMap::new(),
        }
    }
}

/// Successful method reply body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body")]
pub enum MethodReply {
    /// `(a{oa{sv}})`
    Endpoints(Vec<EndpointEntry>),
}

/// Error reply sent back to the calling peer
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{name}: {message}")]
pub struct MethodError {
    /// D-Bus error name (e.g. `org.freedesktop.DBus.Error.InvalidArgs`)
    pub name: String,
    /// Human-readable message
    pub message: String,
}

impl MethodError {
    pub const INVALID_ARGS: &'static str = "org.freedesktop.DBus.Error.InvalidArgs";
    pub const UNKNOWN_METHOD: &'static str = "org.freedesktop.DBus.Error.UnknownMethod";
    pub const UNKNOWN_OBJECT: &'static str = "org.freedesktop.DBus.Error.UnknownObject";
    pub const UNKNOWN_INTERFACE: &'static str = "org.freedesktop.DBus.Error.UnknownInterface";

    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn no_such_property(property: &str) -> Self {
        Self::new(Self::INVALID_ARGS, format!("No such property '{}'", property))
    }

    pub fn unknown_method(interface: &str, method: &str) -> Self {
        Self::new(
            Self::UNKNOWN_METHOD,
            format!("No such method '{}' in interface '{}'", method, interface),
        )
    }

    pub fn unknown_object(path: &ObjectPath) -> Self {
        Self::new(Self::UNKNOWN_OBJECT, format!("No such object path '{}'", path))
    }

    pub fn unknown_interface(path: &ObjectPath, interface: &str) -> Self {
        Self::new(
            Self::UNKNOWN_INTERFACE,
            format!("No such interface '{}' at object path '{}'", interface, path),
        )
    }
}

/// Manager signals
///
/// Serialized as `{"signal": "EndpointAdded", "args": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", content = "args")]
pub enum BusSignal {
    /// `EndpointAdded(o, a{sv})`, emitted once per successful expose
    EndpointAdded {
        path: ObjectPath,
        properties: PropertyMap,
    },
    /// `EndpointRemoved(o)`, emitted once per successful retract
    EndpointRemoved { path: ObjectPath },
}

impl BusSignal {
    /// Signal member name
    pub fn member(&self) -> &'static str {
        match self {
            BusSignal::EndpointAdded { .. } => "EndpointAdded",
            BusSignal::EndpointRemoved { .. } => "EndpointRemoved",
        }
    }

    /// Object path carried as the first signal argument
    pub fn endpoint(&self) -> &ObjectPath {
        match self {
            BusSignal::EndpointAdded { path, .. } | BusSignal::EndpointRemoved { path } => path,
        }
    }
}

/// A signal as seen by bus subscribers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalMessage {
    /// Object the signal was emitted from
    pub sender: ObjectPath,
    /// Interface the signal belongs to
    pub interface: String,
    pub signal: BusSignal,
}
