//! In-process bus
//!
//! Holds the table of exported objects, routes method calls and property
//! reads to them, and fans signals out to subscribers over a tokio broadcast
//! channel. Signals are fire-and-forget: with no subscribers they are dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::message::SignalMessage;
use super::{
    BusError, BusObject, BusSignal, MethodError, MethodReply, ObjectBus, ObjectPath,
    PropertyValue, RegistrationId,
};

/// Signal channel capacity (ring buffer size)
const SIGNAL_CHANNEL_CAPACITY: usize = 256;

struct Registration {
    id: RegistrationId,
    interface: String,
    object: Arc<dyn BusObject>,
}

#[derive(Default)]
struct ObjectTable {
    by_path: HashMap<ObjectPath, Registration>,
    by_id: HashMap<RegistrationId, ObjectPath>,
}

/// In-process implementation of [`ObjectBus`]
pub struct LocalBus {
    objects: RwLock<ObjectTable>,
    next_id: AtomicU32,
    /// Maximum number of live registrations (None = unlimited)
    max_objects: Option<usize>,
    signals: broadcast::Sender<SignalMessage>,
}

impl LocalBus {
    /// Create a new bus without an object limit
    pub fn new() -> Self {
        let (signals, _rx) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
        Self {
            objects: RwLock::new(ObjectTable::default()),
            next_id: AtomicU32::new(1),
            max_objects: None,
            signals,
        }
    }

    /// Create a bus that rejects registrations beyond `max_objects`
    pub fn with_max_objects(max_objects: usize) -> Self {
        Self {
            max_objects: Some(max_objects),
            ..Self::new()
        }
    }

    /// Subscribe to emitted signals
    ///
    /// A subscriber that falls too far behind receives `Lagged` and misses
    /// some signals.
    pub fn subscribe(&self) -> broadcast::Receiver<SignalMessage> {
        self.signals.subscribe()
    }

    /// Check whether an object is bound at `path`
    pub fn is_registered(&self, path: &ObjectPath) -> bool {
        self.objects.read().by_path.contains_key(path)
    }

    /// Number of live registrations
    pub fn object_count(&self) -> usize {
        self.objects.read().by_path.len()
    }

    /// Route a method call to the object bound at `path`
    ///
    /// The object table lock is released before the handler runs, so handlers
    /// may take their own locks freely.
    pub fn call_method(
        &self,
        path: &ObjectPath,
        interface: &str,
        method: &str,
    ) -> Result<MethodReply, MethodError> {
        debug!("Method call: {} {}.{}()", path, interface, method);
        let object = self.lookup(path, interface)?;
        object.method_call(interface, method)
    }

    /// Route a property read to the object bound at `path`
    pub fn get_property(
        &self,
        path: &ObjectPath,
        interface: &str,
        property: &str,
    ) -> Result<PropertyValue, MethodError> {
        debug!("Property read: {} {}.{}", path, interface, property);
        let object = self.lookup(path, interface)?;
        object.get_property(interface, property)
    }

    fn lookup(&self, path: &ObjectPath, interface: &str) -> Result<Arc<dyn BusObject>, MethodError> {
        let objects = self.objects.read();
        let registration = objects
            .by_path
            .get(path)
            .ok_or_else(|| MethodError::unknown_object(path))?;
        if registration.interface != interface {
            return Err(MethodError::unknown_interface(path, interface));
        }
        Ok(Arc::clone(&registration.object))
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

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectBus for LocalBus {
    fn register_object(
        &self,
        path: &ObjectPath,
        interface: &str,
        object: Arc<dyn BusObject>,
    ) -> Result<RegistrationId, BusError> {
        let mut objects = self.objects.write();

        if objects.by_path.contains_key(path) {
            return Err(BusError::PathInUse(path.clone()));
        }
        if let Some(max) = self.max_objects {
            if objects.by_path.len() >= max {
                return Err(BusError::Exhausted(max));
            }
        }

        let id = self.allocate_id();
        objects.by_path.insert(
            path.clone(),
            Registration {
                id,
                interface: interface.to_string(),
                object,
            },
        );
        objects.by_id.insert(id, path.clone());

        trace!(path = %path, id = id.get(), "Object registered");
        Ok(id)
    }

    fn unregister_object(&self, id: RegistrationId) -> bool {
        let mut objects = self.objects.write();

        let Some(path) = objects.by_id.remove(&id) else {
            return false;
        };
        let removed = objects.by_path.remove(&path);
        debug_assert!(removed.map(|r| r.id) == Some(id));

        trace!(path = %path, id = id.get(), "Object unregistered");
        true
    }

    fn emit_signal(&self, path: &ObjectPath, interface: &str, signal: BusSignal) {
        trace!(path = %path, member = signal.member(), "Emitting signal");
        // If no subscribers, send returns Err which is normal
        let _ = self.signals.send(SignalMessage {
            sender: path.clone(),
            interface: interface.to_string(),
            signal,
        });
    }
}
