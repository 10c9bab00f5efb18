//! Bus exposure of registry entities
//!
//! `ObjectExporter` binds transports to their derived object paths and keeps
//! the registry's exposure handles in step with the bus:
//!
//! ```text
//! expose:   lookup (registry lock) ─► register_object ─► bind_export ─► EndpointAdded
//! retract:  lookup (registry lock) ─► unregister_object ─► EndpointRemoved ─► clear_export
//! ```
//!
//! Both sequences run under the transport's lifecycle lock, so signals for
//! one transport go out in the order its state changed. Lifecycle locks are
//! taken before the registry lock, and the registry lock is never held
//! across a call into the bus.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::bus::{
    BusObject, BusSignal, MethodError, ObjectBus, ObjectPath, PropertyMap, PropertyValue,
    RegistrationId,
};
use crate::config::ProcessConfig;
use crate::error::{AppError, Result};
use crate::manager::{ManagerObject, ManagerQuery, MANAGER_INTERFACE};
use crate::registry::{manager_path, transport_path, Registry, Transport, TransportKey};

/// Interface of per-transport objects
pub const PCM_INTERFACE: &str = "org.bluealsa.PCM1";

/// Lifecycle locks shared between transport keys
const LIFECYCLE_STRIPES: usize = 32;

/// Bus handler of one transport object
///
/// No per-transport properties are served at this layer.
struct TransportObject {
    path: ObjectPath,
}

impl BusObject for TransportObject {
    fn get_property(
        &self,
        _interface: &str,
        property: &str,
    ) -> std::result::Result<PropertyValue, MethodError> {
        debug!(path = %self.path, "Rejecting property read: {:?}", property);
        Err(MethodError::no_such_property(property))
    }
}

/// Binds registry entities to bus objects
pub struct ObjectExporter {
    registry: Arc<Registry>,
    bus: Arc<dyn ObjectBus>,
    config: Arc<ProcessConfig>,
    lifecycle: [Mutex<()>; LIFECYCLE_STRIPES],
}

impl ObjectExporter {
    pub fn new(registry: Arc<Registry>, bus: Arc<dyn ObjectBus>, config: Arc<ProcessConfig>) -> Self {
        Self {
            registry,
            bus,
            config,
            lifecycle: std::array::from_fn(|_| Mutex::new(())),
        }
    }

    /// Bind the manager object at the fixed manager path
    ///
    /// Must run on the thread that initialized the process configuration.
    pub fn register_manager(&self) -> Result<RegistrationId> {
        debug_assert!(
            self.config.is_owner_thread(),
            "manager registered off the owner thread"
        );

        let path = manager_path();
        let object = ManagerObject::new(ManagerQuery::new(Arc::clone(&self.registry)));
        let id = self
            .bus
            .register_object(&path, MANAGER_INTERFACE, Arc::new(object))?;

        info!(path = %path, handle = id.get(), "Manager registered");
        Ok(id)
    }

    /// Make a transport reachable on the bus
    ///
    /// On success the handle is stored on the transport and `EndpointAdded`
    /// is emitted. On failure the transport stays unexposed and nothing is
    /// emitted.
    pub fn expose(&self, key: &TransportKey) -> Result<RegistrationId> {
        let _lifecycle = self.lifecycle_lock(key);

        let Some(transport) = self.registry.transport(key) else {
            return Err(AppError::TransportNotFound(transport_path(
                key.adapter,
                &key.device,
                key.profile,
            )?));
        };
        if transport.is_exposed() {
            return Err(AppError::AlreadyExposed(transport.path().clone()));
        }
        if !self.config.allows(key.profile) {
            return Err(AppError::ProfileDisabled(key.profile.to_string()));
        }

        let path = transport.path().clone();
        let object = Arc::new(TransportObject { path: path.clone() });
        let id = match self.bus.register_object(&path, PCM_INTERFACE, object) {
            Ok(id) => id,
            Err(e) => {
                warn!(path = %path, "Couldn't register transport: {}", e);
                return Err(e.into());
            }
        };

        // Registry removal does not take the lifecycle lock and may race the bus call
        if let Err(e) = self.registry.bind_export(key, id) {
            warn!(path = %path, "Transport changed during registration: {}", e);
            self.bus.unregister_object(id);
            return Err(e);
        }

        info!(path = %path, handle = id.get(), "Endpoint exposed");
        self.bus.emit_signal(
            &manager_path(),
            MANAGER_INTERFACE,
            BusSignal::EndpointAdded {
                path,
                properties: PropertyMap::new(),
            },
        );
        Ok(id)
    }

    /// Withdraw a transport from the bus
    ///
    /// No-op for a transport that is not exposed (or not in the registry).
    /// Returns true if this call withdrew it.
    pub fn retract(&self, key: &TransportKey) -> bool {
        let _lifecycle = self.lifecycle_lock(key);

        let Some(transport) = self.registry.transport(key) else {
            return false;
        };
        let Some(id) = transport.export_id() else {
            return false;
        };

        let retracted = self.unbind(transport.path(), id);
        self.registry.clear_export(key, id);
        retracted
    }

    /// Withdraw a transport that was already unlinked from the registry
    ///
    /// Takes the snapshot returned by a registry removal call.
    pub fn retract_detached(&self, transport: &Transport) -> bool {
        let _lifecycle = self.lifecycle_lock(transport.key());

        match transport.export_id() {
            Some(id) => self.unbind(transport.path(), id),
            None => false,
        }
    }

    fn lifecycle_lock(&self, key: &TransportKey) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        self.lifecycle[hasher.finish() as usize % LIFECYCLE_STRIPES].lock()
    }

    /// Unregister, then announce the removal if the object was still bound
    fn unbind(&self, path: &ObjectPath, id: RegistrationId) -> bool {
        if !self.bus.unregister_object(id) {
            debug!(path = %path, handle = id.get(), "Endpoint already retracted");
            return false;
        }

        info!(path = %path, handle = id.get(), "Endpoint retracted");
        self.bus.emit_signal(
            &manager_path(),
            MANAGER_INTERFACE,
            BusSignal::EndpointRemoved { path: path.clone() },
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;
    use std::time::Duration;

    use tokio::sync::broadcast;

    use super::*;
    use crate::bus::{BusError, LocalBus, MethodReply, SignalMessage};
    use crate::config::{BaConfig, EnabledProfiles};
    use crate::manager::GET_ENDPOINTS;
    use crate::registry::{BdAddr, TransportProfile};

    const DEVICE: &str = "AA:BB:CC:DD:EE:FF";

    fn addr(s: &str) -> BdAddr {
        s.parse().unwrap()
    }

    fn config(enable: EnabledProfiles) -> Arc<ProcessConfig> {
        ProcessConfig::init(BaConfig {
            enable,
            audio_group: String::new(),
            ..BaConfig::default()
        })
        .unwrap()
    }

    fn all_profiles() -> EnabledProfiles {
        EnabledProfiles::from_names(&EnabledProfiles::NAMES).unwrap()
    }

    struct Fixture {
        registry: Arc<Registry>,
        bus: Arc<LocalBus>,
        exporter: ObjectExporter,
        sink: TransportKey,
        rfcomm: TransportKey,
    }

    /// hci0 with device AA:BB:CC:DD:EE:FF carrying an A2DP sink and an RFCOMM channel
    fn fixture_with(bus: LocalBus, enable: EnabledProfiles) -> Fixture {
        let registry = Arc::new(Registry::new());
        let bus = Arc::new(bus);
        let exporter = ObjectExporter::new(Arc::clone(&registry), bus.clone(), config(enable));

        registry.ensure_adapter(0).unwrap();
        registry.ensure_device(0, addr(DEVICE)).unwrap();
        let sink = *registry
            .insert_transport(0, addr(DEVICE), TransportProfile::A2DP_SINK)
            .unwrap()
            .key();
        let rfcomm = *registry
            .insert_transport(0, addr(DEVICE), TransportProfile::RFCOMM)
            .unwrap()
            .key();

        Fixture {
            registry,
            bus,
            exporter,
            sink,
            rfcomm,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(LocalBus::new(), all_profiles())
    }

    fn drain(rx: &mut broadcast::Receiver<SignalMessage>) -> Vec<SignalMessage> {
        let mut signals = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            signals.push(msg);
        }
        signals
    }

    fn enumerate(f: &Fixture) -> Vec<ObjectPath> {
        let reply = f
            .bus
            .call_method(&manager_path(), MANAGER_INTERFACE, GET_ENDPOINTS)
            .unwrap();
        let MethodReply::Endpoints(entries) = reply;
        entries.into_iter().map(|e| e.path).collect()
    }

    #[test]
    fn test_expose_then_retract() {
        let f = fixture();
        let mut rx = f.bus.subscribe();

        let id = f.exporter.expose(&f.sink).unwrap();
        let transport = f.registry.transport(&f.sink).unwrap();
        assert_eq!(transport.export_id(), Some(id));
        assert!(f.bus.is_registered(transport.path()));

        let signals = drain(&mut rx);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].sender, manager_path());
        assert_eq!(signals[0].interface, MANAGER_INTERFACE);
        assert_eq!(
            signals[0].signal,
            BusSignal::EndpointAdded {
                path: transport.path().clone(),
                properties: PropertyMap::new(),
            }
        );

        assert!(f.exporter.retract(&f.sink));
        assert_eq!(f.registry.transport(&f.sink).unwrap().export_id(), None);
        assert!(!f.bus.is_registered(transport.path()));

        let signals = drain(&mut rx);
        assert_eq!(signals.len(), 1);
        assert_eq!(
            signals[0].signal,
            BusSignal::EndpointRemoved {
                path: transport.path().clone()
            }
        );
    }

    #[test]
    fn test_double_retract_emits_once() {
        let f = fixture();
        f.exporter.expose(&f.sink).unwrap();
        let mut rx = f.bus.subscribe();

        assert!(f.exporter.retract(&f.sink));
        assert!(!f.exporter.retract(&f.sink));

        let removed = drain(&mut rx)
            .into_iter()
            .filter(|m| m.signal.member() == "EndpointRemoved")
            .count();
        assert_eq!(removed, 1);
    }

    #[test]
    fn test_retract_unexposed_is_noop() {
        let f = fixture();
        let mut rx = f.bus.subscribe();

        assert!(!f.exporter.retract(&f.sink));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_expose_twice_rejected() {
        let f = fixture();
        let id = f.exporter.expose(&f.sink).unwrap();
        let mut rx = f.bus.subscribe();

        assert!(matches!(
            f.exporter.expose(&f.sink),
            Err(AppError::AlreadyExposed(_))
        ));
        assert_eq!(f.registry.transport(&f.sink).unwrap().export_id(), Some(id));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_handle_cycles() {
        let f = fixture();
        let mut seen = HashSet::new();

        for _ in 0..3 {
            let id = f.exporter.expose(&f.sink).unwrap();
            assert!(seen.insert(id));
            assert!(f.registry.transport(&f.sink).unwrap().is_exposed());

            f.exporter.retract(&f.sink);
            assert!(!f.registry.transport(&f.sink).unwrap().is_exposed());
        }
    }

    #[test]
    fn test_same_path_second_bind_fails() {
        let f = fixture();
        f.exporter.expose(&f.sink).unwrap();

        // Unlink without retracting: the old object still holds the path
        f.registry.remove_transport(&f.sink).unwrap();
        f.registry
            .insert_transport(0, addr(DEVICE), TransportProfile::A2DP_SINK)
            .unwrap();
        let mut rx = f.bus.subscribe();

        let result = f.exporter.expose(&f.sink);
        assert!(matches!(
            result,
            Err(AppError::Bus(BusError::PathInUse(_)))
        ));
        assert!(!f.registry.transport(&f.sink).unwrap().is_exposed());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_bus_exhaustion_leaves_unexposed() {
        let f = fixture_with(LocalBus::with_max_objects(1), all_profiles());
        f.exporter.register_manager().unwrap();
        let mut rx = f.bus.subscribe();

        assert!(matches!(
            f.exporter.expose(&f.sink),
            Err(AppError::Bus(BusError::Exhausted(1)))
        ));
        assert!(!f.registry.transport(&f.sink).unwrap().is_exposed());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_disabled_profile_rejected() {
        let f = fixture_with(LocalBus::new(), EnabledProfiles::default());

        assert!(matches!(
            f.exporter.expose(&f.sink),
            Err(AppError::ProfileDisabled(_))
        ));
        assert_eq!(f.bus.object_count(), 0);
    }

    #[test]
    fn test_expose_missing_transport() {
        let f = fixture();
        let key = TransportKey::new(0, addr("00:00:00:00:00:01"), TransportProfile::A2DP_SINK);

        assert!(matches!(
            f.exporter.expose(&key),
            Err(AppError::TransportNotFound(_))
        ));
        assert!(!f.exporter.retract(&key));
    }

    #[test]
    fn test_transport_properties_rejected() {
        let f = fixture();
        f.exporter.expose(&f.sink).unwrap();
        let path = f.registry.transport(&f.sink).unwrap().path().clone();

        for name in ["", "Volume", "Format", GET_ENDPOINTS, "EndpointAdded", "EndpointRemoved"] {
            let err = f.bus.get_property(&path, PCM_INTERFACE, name).unwrap_err();
            assert_eq!(err.name, MethodError::INVALID_ARGS);
            assert_eq!(err.message, format!("No such property '{}'", name));
        }
    }

    #[test]
    fn test_enumeration_skips_control_channel() {
        let f = fixture();
        f.exporter.register_manager().unwrap();
        let sink_path = f.registry.transport(&f.sink).unwrap().path().clone();

        assert_eq!(enumerate(&f), vec![sink_path.clone()]);

        // Exposing the control channel is allowed but it stays hidden
        f.exporter.expose(&f.rfcomm).unwrap();
        assert!(f.registry.transport(&f.rfcomm).unwrap().is_exposed());
        assert_eq!(enumerate(&f), vec![sink_path]);
    }

    #[test]
    fn test_retract_detached_after_device_removal() {
        let f = fixture();
        f.exporter.expose(&f.sink).unwrap();
        let mut rx = f.bus.subscribe();

        let removed = f.registry.remove_device(0, &addr(DEVICE));
        assert_eq!(removed.len(), 2);

        let retracted = removed
            .iter()
            .filter(|t| f.exporter.retract_detached(t))
            .count();
        assert_eq!(retracted, 1);
        assert_eq!(f.bus.object_count(), 0);

        let signals = drain(&mut rx);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal.member(), "EndpointRemoved");

        // Retracting the same snapshot again is harmless
        assert!(!f.exporter.retract_detached(&removed[0]));
        assert!(!f.exporter.retract_detached(&removed[1]));
    }

    #[test]
    fn test_manager_registered_once() {
        let f = fixture();
        f.exporter.register_manager().unwrap();
        assert!(matches!(
            f.exporter.register_manager(),
            Err(AppError::Bus(BusError::PathInUse(_)))
        ));
    }

    #[test]
    #[cfg(debug_assertions)]
    fn test_manager_registration_requires_owner_thread() {
        let f = fixture();
        let joined = thread::scope(|s| s.spawn(|| f.exporter.register_manager()).join());
        assert!(joined.is_err());
        assert_eq!(f.bus.object_count(), 0);
    }

    #[test]
    fn test_concurrent_mutation_during_enumeration() {
        let f = fixture();
        f.exporter.register_manager().unwrap();
        for index in 1..4 {
            f.registry.ensure_adapter(index).unwrap();
        }

        thread::scope(|s| {
            for index in 1..4u16 {
                let exporter = &f.exporter;
                let registry = &f.registry;
                s.spawn(move || {
                    for round in 0..50u8 {
                        let device = BdAddr::new([0, 0, 0, 0, index as u8, round]);
                        registry.ensure_device(index, device).unwrap();
                        for profile in [
                            TransportProfile::A2DP_SOURCE,
                            TransportProfile::HFP_AG,
                            TransportProfile::HFP_AG.control_channel(),
                        ] {
                            let key = *registry.insert_transport(index, device, profile).unwrap().key();
                            exporter.expose(&key).unwrap();
                            if round % 2 == 0 {
                                exporter.retract(&key);
                            }
                        }
                        if round % 3 == 0 {
                            for transport in registry.remove_device(index, &device) {
                                exporter.retract_detached(&transport);
                            }
                        }
                    }
                });
            }

            for _ in 0..100 {
                let paths = enumerate(&f);
                let unique: HashSet<_> = paths.iter().collect();
                assert_eq!(unique.len(), paths.len());
                assert!(paths.iter().all(|p| !p.as_str().contains("rfcomm")));
            }
        });

        // Every bound transport object belongs to an exposed transport
        let exposed = f
            .registry
            .adapters()
            .iter()
            .flat_map(|a| a.devices().to_vec())
            .flat_map(|d| d.transports().to_vec())
            .filter(Transport::is_exposed)
            .count();
        assert_eq!(f.bus.object_count(), exposed + 1);
    }

    /// Records emitted signals in order, stalling each `EndpointAdded`
    /// to widen the gap between bind and announcement
    struct RecordingBus {
        inner: LocalBus,
        signals: Mutex<Vec<BusSignal>>,
    }

    impl ObjectBus for RecordingBus {
        fn register_object(
            &self,
            path: &ObjectPath,
            interface: &str,
            object: Arc<dyn BusObject>,
        ) -> std::result::Result<RegistrationId, BusError> {
            self.inner.register_object(path, interface, object)
        }

        fn unregister_object(&self, id: RegistrationId) -> bool {
            self.inner.unregister_object(id)
        }

        fn emit_signal(&self, path: &ObjectPath, interface: &str, signal: BusSignal) {
            if matches!(signal, BusSignal::EndpointAdded { .. }) {
                thread::sleep(Duration::from_micros(200));
            }
            self.signals.lock().push(signal.clone());
            self.inner.emit_signal(path, interface, signal);
        }
    }

    #[test]
    fn test_expose_and_retract_same_key_keep_signal_order() {
        for _ in 0..4 {
            let registry = Arc::new(Registry::new());
            let bus = Arc::new(RecordingBus {
                inner: LocalBus::new(),
                signals: Mutex::new(Vec::new()),
            });
            let exporter =
                ObjectExporter::new(Arc::clone(&registry), bus.clone(), config(all_profiles()));

            registry.ensure_adapter(0).unwrap();
            registry.ensure_device(0, addr(DEVICE)).unwrap();
            let transport = registry
                .insert_transport(0, addr(DEVICE), TransportProfile::A2DP_SINK)
                .unwrap();
            let key = *transport.key();
            let path = transport.path().clone();

            thread::scope(|s| {
                s.spawn(|| {
                    for _ in 0..200 {
                        let _ = exporter.expose(&key);
                    }
                });
                s.spawn(|| {
                    for _ in 0..2000 {
                        exporter.retract(&key);
                        thread::yield_now();
                    }
                });
            });

            let signals = bus.signals.lock();
            for (index, signal) in signals.iter().enumerate() {
                let expected = if index % 2 == 0 {
                    "EndpointAdded"
                } else {
                    "EndpointRemoved"
                };
                assert_eq!(signal.member(), expected, "signal {index} out of order");
                assert_eq!(signal.endpoint(), &path);
            }

            let exposed = registry.transport(&key).unwrap().is_exposed();
            let announced = signals
                .last()
                .is_some_and(|s| s.member() == "EndpointAdded");
            assert_eq!(announced, exposed);
            assert_eq!(bus.inner.is_registered(&path), exposed);
        }
    }
}
