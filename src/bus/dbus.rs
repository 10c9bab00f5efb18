//! D-Bus substrate
//!
//! Serves bus objects through the zbus object server. Incoming calls are
//! handled on the connection's executor thread; the `#[interface]` types
//! below only translate between zbus and the crate's [`BusObject`] handlers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, trace, warn};
use zbus::blocking::Connection;
use zbus::zvariant::{Str, Value};
use zbus::{fdo, interface, SignalContext};

use super::{
    BusError, BusObject, BusSignal, MethodError, MethodReply, ObjectBus, ObjectPath, PropertyValue,
    RegistrationId,
};
use crate::exporter::PCM_INTERFACE;
use crate::manager::{GET_ENDPOINTS, MANAGER_INTERFACE};

/// Well-known name requested on the bus
pub const SERVICE_NAME: &str = "org.bluealsa";

/// Message bus to connect to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BusKind {
    #[default]
    System,
    Session,
}

/// `org.bluealsa.Manager1` served at the manager path
struct ManagerInterface {
    object: Arc<dyn BusObject>,
}

#[interface(name = "org.bluealsa.Manager1")]
impl ManagerInterface {
    /// Audio endpoints as `a{oa{sv}}`
    fn get_endpoints(&self) -> fdo::Result<HashMap<ObjectPath, HashMap<String, Value<'static>>>> {
        let MethodReply::Endpoints(entries) =
            self.object.method_call(MANAGER_INTERFACE, GET_ENDPOINTS)?;
        Ok(entries
            .into_iter()
            .map(|entry| (entry.path, to_variant_map(entry.properties)))
            .collect())
    }

    #[zbus(signal)]
    async fn endpoint_added(
        ctxt: &SignalContext<'_>,
        path: ObjectPath,
        properties: HashMap<String, Value<'_>>,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn endpoint_removed(ctxt: &SignalContext<'_>, path: ObjectPath) -> zbus::Result<()>;
}

/// `org.bluealsa.PCM1` served at each transport path
///
/// Declares no properties, so every property read is answered with the
/// object server's unknown-property error.
struct PcmInterface;

#[interface(name = "org.bluealsa.PCM1")]
impl PcmInterface {}

#[derive(Debug, Clone, Copy)]
enum Served {
    Manager,
    Pcm,
}

struct Binding {
    path: ObjectPath,
    served: Served,
}

/// [`ObjectBus`] over a zbus connection
pub struct DbusBus {
    conn: Connection,
    bindings: Mutex<HashMap<RegistrationId, Binding>>,
    next_id: AtomicU32,
}

impl DbusBus {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            bindings: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
        }
    }

    /// Connect to the given bus and request the well-known `name`
    pub fn connect(kind: BusKind, name: &str) -> zbus::Result<Self> {
        let conn = match kind {
            BusKind::System => Connection::system()?,
            BusKind::Session => Connection::session()?,
        };
        conn.request_name(name)?;
        info!("Acquired D-Bus name {} on the {:?} bus", name, kind);
        Ok(Self::new(conn))
    }

    fn allocate_id(&self) -> RegistrationId {
        loop {
            // Skips zero after wrap-around
            if let Some(id) = RegistrationId::new(self.next_id.fetch_add(1, Ordering::Relaxed)) {
                return id;
            }
        }
    }
}

impl ObjectBus for DbusBus {
    fn register_object(
        &self,
        path: &ObjectPath,
        interface: &str,
        object: Arc<dyn BusObject>,
    ) -> Result<RegistrationId, BusError> {
        let mut bindings = self.bindings.lock();
        if bindings.values().any(|b| &b.path == path) {
            return Err(BusError::PathInUse(path.clone()));
        }

        let server = self.conn.object_server();
        let (added, served) = match interface {
            MANAGER_INTERFACE => (
                server.at(path.as_str(), ManagerInterface { object }),
                Served::Manager,
            ),
            PCM_INTERFACE => (server.at(path.as_str(), PcmInterface), Served::Pcm),
            other => return Err(BusError::UnsupportedInterface(other.to_string())),
        };
        match added {
            Ok(true) => {}
            Ok(false) => return Err(BusError::PathInUse(path.clone())),
            Err(e) => return Err(BusError::Dbus(e.to_string())),
        }

        let id = self.allocate_id();
        bindings.insert(
            id,
            Binding {
                path: path.clone(),
                served,
            },
        );
        trace!(path = %path, id = id.get(), "Object registered");
        Ok(id)
    }

    fn unregister_object(&self, id: RegistrationId) -> bool {
        let mut bindings = self.bindings.lock();
        let Some(binding) = bindings.remove(&id) else {
            return false;
        };

        let server = self.conn.object_server();
        let path = binding.path.as_str();
        let removed = match binding.served {
            Served::Manager => server.remove::<ManagerInterface, _>(path),
            Served::Pcm => server.remove::<PcmInterface, _>(path),
        };
        if let Err(e) = removed {
            warn!(path = %binding.path, "Couldn't remove object: {}", e);
        }

        trace!(path = %binding.path, id = id.get(), "Object unregistered");
        true
    }

    fn emit_signal(&self, path: &ObjectPath, interface: &str, signal: BusSignal) {
        let member = signal.member();
        let result = match signal {
            BusSignal::EndpointAdded {
                path: endpoint,
                properties,
            } => self.conn.emit_signal(
                None::<&str>,
                path.as_str(),
                interface,
                member,
                &(endpoint, to_variant_map(properties)),
            ),
            BusSignal::EndpointRemoved { path: endpoint } => {
                self.conn
                    .emit_signal(None::<&str>, path.as_str(), interface, member, &endpoint)
            }
        };
        if let Err(e) = result {
            warn!(path = %path, "Couldn't emit {}: {}", member, e);
        }
    }
}

impl From<MethodError> for fdo::Error {
    fn from(err: MethodError) -> Self {
        match err.name.as_str() {
            MethodError::INVALID_ARGS => fdo::Error::InvalidArgs(err.message),
            MethodError::UNKNOWN_METHOD => fdo::Error::UnknownMethod(err.message),
            MethodError::UNKNOWN_OBJECT => fdo::Error::UnknownObject(err.message),
            MethodError::UNKNOWN_INTERFACE => fdo::Error::UnknownInterface(err.message),
            _ => fdo::Error::Failed(err.message),
        }
    }
}

fn to_variant(value: PropertyValue) -> Value<'static> {
    match value {
        PropertyValue::Bool(b) => Value::Bool(b),
        PropertyValue::U32(n) => Value::U32(n),
        PropertyValue::Str(s) => Value::Str(Str::from(s)),
        PropertyValue::ObjectPath(p) => Value::ObjectPath(p.into_inner()),
    }
}

fn to_variant_map(properties: super::PropertyMap) -> HashMap<String, Value<'static>> {
    properties
        .into_iter()
        .map(|(name, value)| (name, to_variant(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use zbus::object_server::Interface;

    use super::*;
    use crate::bus::object_path;
    use crate::manager::{ManagerObject, ManagerQuery};
    use crate::registry::{Registry, TransportProfile};

    #[test]
    fn test_interface_names() {
        assert_eq!(ManagerInterface::name().as_str(), MANAGER_INTERFACE);
        assert_eq!(PcmInterface::name().as_str(), PCM_INTERFACE);
    }

    #[test]
    fn test_get_endpoints_delegates() {
        let registry = Arc::new(Registry::new());
        let device = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        registry.ensure_adapter(0).unwrap();
        registry.ensure_device(0, device).unwrap();
        registry
            .insert_transport(0, device, TransportProfile::A2DP_SINK)
            .unwrap();
        registry
            .insert_transport(0, device, TransportProfile::RFCOMM)
            .unwrap();

        let manager = ManagerInterface {
            object: Arc::new(ManagerObject::new(ManagerQuery::new(registry))),
        };
        let endpoints = manager.get_endpoints().unwrap();

        let sink = object_path("/org/bluealsa/hci0/dev_AA_BB_CC_DD_EE_FF/a2dpsnk").unwrap();
        assert_eq!(endpoints.len(), 1);
        assert!(endpoints[&sink].is_empty());
    }

    #[test]
    fn test_method_error_mapping() {
        let err: fdo::Error = MethodError::no_such_property("Volume").into();
        assert_eq!(err, fdo::Error::InvalidArgs("No such property 'Volume'".to_string()));

        let err: fdo::Error = MethodError::unknown_method(MANAGER_INTERFACE, "GetPCMs").into();
        assert!(matches!(err, fdo::Error::UnknownMethod(_)));

        let err: fdo::Error = MethodError::new("org.example.Error.Custom", "boom").into();
        assert_eq!(err, fdo::Error::Failed("boom".to_string()));
    }

    #[test]
    fn test_property_variants() {
        let mut properties = super::super::PropertyMap::new();
        properties.insert("Running".to_string(), PropertyValue::Bool(true));
        properties.insert("Rate".to_string(), PropertyValue::U32(44100));
        properties.insert("Codec".to_string(), PropertyValue::Str("SBC".to_string()));

        let variants = to_variant_map(properties);
        assert_eq!(variants["Running"], Value::Bool(true));
        assert_eq!(variants["Rate"], Value::U32(44100));
        assert_eq!(variants["Codec"], Value::from("SBC"));
    }
}
