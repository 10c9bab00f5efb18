//! Manager object
//!
//! Answers endpoint enumeration requests from bus peers. Lives at the fixed
//! manager path and is registered once by the exporter.

use std::sync::Arc;

use tracing::debug;

use crate::bus::{BusObject, EndpointEntry, MethodError, MethodReply};
use crate::registry::{Registry, HCI_MAX_DEV};

/// Interface of the manager object
pub const MANAGER_INTERFACE: &str = "org.bluealsa.Manager1";

/// Method returning `a{oa{sv}}` of audio endpoints
pub const GET_ENDPOINTS: &str = "GetEndpoints";

/// Read-only view of the registry for enumeration
#[derive(Clone)]
pub struct ManagerQuery {
    registry: Arc<Registry>,
}

impl ManagerQuery {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// List every audio-bearing transport with an empty property map
    ///
    /// Control-only transports (bare RFCOMM channels) are skipped. The result
    /// is built fresh on each call; its order is unspecified.
    pub fn enumerate(&self) -> Vec<EndpointEntry> {
        let mut entries = Vec::new();

        for index in 0..HCI_MAX_DEV {
            let Some(adapter) = self.registry.find_adapter(index) else {
                continue;
            };
            for device in adapter.devices() {
                entries.extend(
                    device
                        .transports()
                        .iter()
                        .filter(|t| !t.profile().is_control_only())
                        .map(|t| EndpointEntry::new(t.path().clone())),
                );
            }
        }

        debug!("Enumerated {} endpoint(s)", entries.len());
        entries
    }
}

/// Bus handler of the manager object
pub struct ManagerObject {
    query: ManagerQuery,
}

impl ManagerObject {
    pub fn new(query: ManagerQuery) -> Self {
        Self { query }
    }
}

impl BusObject for ManagerObject {
    fn method_call(&self, interface: &str, method: &str) -> Result<MethodReply, MethodError> {
        match method {
            GET_ENDPOINTS => Ok(MethodReply::Endpoints(self.query.enumerate())),
            _ => Err(MethodError::unknown_method(interface, method)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::bus::ObjectPath;
    use crate::registry::{BdAddr, TransportProfile};

    fn addr(s: &str) -> BdAddr {
        s.parse().unwrap()
    }

    fn paths(entries: &[EndpointEntry]) -> HashSet<ObjectPath> {
        entries.iter().map(|e| e.path.clone()).collect()
    }

    fn populated() -> Arc<Registry> {
        let registry = Arc::new(Registry::new());
        for index in [0, 3] {
            registry.ensure_adapter(index).unwrap();
            for device in ["00:11:22:33:44:55", "AA:BB:CC:DD:EE:FF"] {
                registry.ensure_device(index, addr(device)).unwrap();
                for profile in [
                    TransportProfile::A2DP_SOURCE,
                    TransportProfile::HFP_AG,
                    TransportProfile::HFP_AG.control_channel(),
                    TransportProfile::RFCOMM,
                ] {
                    registry.insert_transport(index, addr(device), profile).unwrap();
                }
            }
        }
        registry
    }

    #[test]
    fn test_empty_registry() {
        let query = ManagerQuery::new(Arc::new(Registry::new()));
        assert!(query.enumerate().is_empty());
    }

    #[test]
    fn test_skips_control_only() {
        let query = ManagerQuery::new(populated());
        let entries = query.enumerate();

        // 2 adapters x 2 devices x 2 audio-bearing profiles
        assert_eq!(entries.len(), 8);
        for entry in &entries {
            assert!(!entry.path.as_str().contains("rfcomm"), "{}", entry.path);
            assert!(entry.properties.is_empty());
        }
    }

    #[test]
    fn test_repeated_enumeration_is_stable() {
        let query = ManagerQuery::new(populated());
        assert_eq!(paths(&query.enumerate()), paths(&query.enumerate()));
    }

    #[test]
    fn test_reflects_mutation() {
        let registry = populated();
        let query = ManagerQuery::new(Arc::clone(&registry));

        registry.remove_adapter(3);
        let entries = query.enumerate();
        assert_eq!(entries.len(), 4);
        assert!(entries
            .iter()
            .all(|e| e.path.as_str().starts_with("/org/bluealsa/hci0/")));
    }

    #[test]
    fn test_manager_object_methods() {
        let object = ManagerObject::new(ManagerQuery::new(populated()));

        let MethodReply::Endpoints(entries) =
            object.method_call(MANAGER_INTERFACE, GET_ENDPOINTS).unwrap();
        assert_eq!(entries.len(), 8);

        let err = object.method_call(MANAGER_INTERFACE, "GetPCMs").unwrap_err();
        assert_eq!(err.name, MethodError::UNKNOWN_METHOD);

        let err = object.get_property(MANAGER_INTERFACE, "Endpoints").unwrap_err();
        assert_eq!(err.name, MethodError::INVALID_ARGS);
    }
}
