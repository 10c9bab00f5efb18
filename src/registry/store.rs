//! Adapter → Device → Transport tree
//!
//! All structural reads and writes go through one `RwLock`. Callers never get
//! references into the tree; lookups return owned snapshots taken while the
//! lock is held, so an in-progress iteration can not observe a concurrent
//! insert or remove half-way through.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::bus::{ObjectPath, RegistrationId};
use crate::error::{AppError, Result};

use super::path::{adapter_name, adapter_path, device_path, transport_path};
use super::types::{BdAddr, TransportProfile, HCI_MAX_DEV};

/// Stable key of a transport: (adapter index, device address, profile)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportKey {
    pub adapter: u16,
    pub device: BdAddr,
    pub profile: TransportProfile,
}

impl TransportKey {
    pub fn new(adapter: u16, device: BdAddr, profile: TransportProfile) -> Self {
        Self {
            adapter,
            device,
            profile,
        }
    }
}

/// Snapshot of a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transport {
    key: TransportKey,
    path: ObjectPath,
    export: Option<RegistrationId>,
}

impl Transport {
    pub fn key(&self) -> &TransportKey {
        &self.key
    }

    pub fn profile(&self) -> TransportProfile {
        self.key.profile
    }

    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// Exposure handle; `None` while the transport is not bound on the bus
    pub fn export_id(&self) -> Option<RegistrationId> {
        self.export
    }

    pub fn is_exposed(&self) -> bool {
        self.export.is_some()
    }
}

/// Snapshot of a device and its transports
#[derive(Debug, Clone)]
pub struct Device {
    adapter: u16,
    address: BdAddr,
    path: ObjectPath,
    transports: Vec<Transport>,
}

impl Device {
    pub fn adapter(&self) -> u16 {
        self.adapter
    }

    pub fn address(&self) -> &BdAddr {
        &self.address
    }

    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// Transports at snapshot time, in no particular order
    pub fn transports(&self) -> &[Transport] {
        &self.transports
    }
}

/// Snapshot of an adapter and everything below it
#[derive(Debug, Clone)]
pub struct Adapter {
    index: u16,
    path: ObjectPath,
    devices: Vec<Device>,
}

impl Adapter {
    pub fn index(&self) -> u16 {
        self.index
    }

    /// BlueZ name, e.g. `hci0`
    pub fn name(&self) -> String {
        adapter_name(self.index)
    }

    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// Devices at snapshot time, in no particular order
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }
}

struct TransportNode {
    path: ObjectPath,
    export: Option<RegistrationId>,
}

struct DeviceNode {
    path: ObjectPath,
    transports: HashMap<TransportProfile, TransportNode>,
}

struct AdapterNode {
    path: ObjectPath,
    devices: HashMap<BdAddr, DeviceNode>,
}

impl AdapterNode {
    fn snapshot(&self, index: u16) -> Adapter {
        Adapter {
            index,
            path: self.path.clone(),
            devices: self
                .devices
                .iter()
                .map(|(address, device)| device.snapshot(index, *address))
                .collect(),
        }
    }

    fn drain_transports(self, index: u16) -> Vec<Transport> {
        self.devices
            .into_iter()
            .flat_map(|(address, device)| device.drain_transports(index, address))
            .collect()
    }
}

impl DeviceNode {
    fn snapshot(&self, adapter: u16, address: BdAddr) -> Device {
        Device {
            adapter,
            address,
            path: self.path.clone(),
            transports: self
                .transports
                .iter()
                .map(|(profile, node)| {
                    node.snapshot(TransportKey::new(adapter, address, *profile))
                })
                .collect(),
        }
    }

    fn drain_transports(self, adapter: u16, address: BdAddr) -> Vec<Transport> {
        self.transports
            .into_iter()
            .map(|(profile, node)| node.snapshot(TransportKey::new(adapter, address, profile)))
            .collect()
    }
}

impl TransportNode {
    fn snapshot(&self, key: TransportKey) -> Transport {
        Transport {
            key,
            path: self.path.clone(),
            export: self.export,
        }
    }
}

/// Registry of adapters, devices and transports
pub struct Registry {
    /// One slot per HCI index
    adapters: RwLock<Vec<Option<AdapterNode>>>,
    /// Accepted adapter names (empty = accept all)
    hci_filter: Vec<String>,
}

impl Registry {
    /// Create an empty registry accepting every adapter
    pub fn new() -> Self {
        Self::with_filter(Vec::new())
    }

    /// Create an empty registry accepting only the named adapters (e.g. `hci1`)
    pub fn with_filter(hci_filter: Vec<String>) -> Self {
        Self {
            adapters: RwLock::new((0..HCI_MAX_DEV).map(|_| None).collect()),
            hci_filter,
        }
    }

    /// Check whether the adapter filter lets `index` through
    pub fn accepts_adapter(&self, index: u16) -> bool {
        self.hci_filter.is_empty() || self.hci_filter.iter().any(|name| *name == adapter_name(index))
    }

    /// Look up an adapter by index
    pub fn find_adapter(&self, index: u16) -> Option<Adapter> {
        let adapters = self.adapters.read();
        adapters
            .get(usize::from(index))?
            .as_ref()
            .map(|node| node.snapshot(index))
    }

    /// Snapshot of every present adapter
    pub fn adapters(&self) -> Vec<Adapter> {
        let adapters = self.adapters.read();
        adapters
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|node| node.snapshot(index as u16)))
            .collect()
    }

    /// Return the adapter at `index`, creating it on first reference
    pub fn ensure_adapter(&self, index: u16) -> Result<Adapter> {
        if index >= HCI_MAX_DEV {
            return Err(AppError::InvalidAdapter(index));
        }
        if !self.accepts_adapter(index) {
            return Err(AppError::AdapterFiltered(adapter_name(index)));
        }

        let path = adapter_path(index)?;
        let mut adapters = self.adapters.write();
        let slot = &mut adapters[usize::from(index)];
        let node = slot.get_or_insert_with(|| {
            info!("Adapter added: {}", adapter_name(index));
            AdapterNode {
                path,
                devices: HashMap::new(),
            }
        });
        Ok(node.snapshot(index))
    }

    /// Remove an adapter with all its devices
    ///
    /// Returns the transports that were linked below it, so the caller can
    /// retract the exposed ones.
    pub fn remove_adapter(&self, index: u16) -> Vec<Transport> {
        let removed = {
            let mut adapters = self.adapters.write();
            adapters.get_mut(usize::from(index)).and_then(Option::take)
        };

        match removed {
            Some(node) => {
                info!("Adapter removed: {}", adapter_name(index));
                node.drain_transports(index)
            }
            None => Vec::new(),
        }
    }

    /// Return the device `address` on adapter `index`, creating it if needed
    pub fn ensure_device(&self, index: u16, address: BdAddr) -> Result<Device> {
        let path = device_path(index, &address)?;
        let mut adapters = self.adapters.write();
        let adapter = Self::adapter_node_mut(&mut adapters, index)?;

        let node = adapter.devices.entry(address).or_insert_with(|| {
            debug!("Device added: {} on {}", address, adapter_name(index));
            DeviceNode {
                path,
                transports: HashMap::new(),
            }
        });
        Ok(node.snapshot(index, address))
    }

    /// Remove a device with all its transports
    pub fn remove_device(&self, index: u16, address: &BdAddr) -> Vec<Transport> {
        let removed = {
            let mut adapters = self.adapters.write();
            Self::adapter_node_mut(&mut adapters, index)
                .ok()
                .and_then(|adapter| adapter.devices.remove(address))
        };

        match removed {
            Some(node) => {
                debug!("Device removed: {} on {}", address, adapter_name(index));
                node.drain_transports(index, *address)
            }
            None => Vec::new(),
        }
    }

    /// Link a new transport below an existing device
    ///
    /// The path is derived before the node is linked, so a transport is never
    /// visible without one.
    pub fn insert_transport(
        &self,
        index: u16,
        address: BdAddr,
        profile: TransportProfile,
    ) -> Result<Transport> {
        let key = TransportKey::new(index, address, profile);
        let path = transport_path(index, &address, profile)?;

        let mut adapters = self.adapters.write();
        let device = Self::device_node_mut(&mut adapters, index, &address)?;
        if device.transports.contains_key(&profile) {
            return Err(AppError::TransportExists(path));
        }

        let node = TransportNode { path, export: None };
        let transport = node.snapshot(key);
        device.transports.insert(profile, node);

        debug!(path = %transport.path, "Transport added");
        Ok(transport)
    }

    /// Unlink a transport; returns its last state if it existed
    pub fn remove_transport(&self, key: &TransportKey) -> Option<Transport> {
        let mut adapters = self.adapters.write();
        let device = Self::device_node_mut(&mut adapters, key.adapter, &key.device).ok()?;
        let node = device.transports.remove(&key.profile)?;

        debug!(path = %node.path, "Transport removed");
        Some(node.snapshot(*key))
    }

    /// Look up a transport by key
    pub fn transport(&self, key: &TransportKey) -> Option<Transport> {
        let adapters = self.adapters.read();
        let adapter = adapters.get(usize::from(key.adapter))?.as_ref()?;
        let node = adapter.devices.get(&key.device)?.transports.get(&key.profile)?;
        Some(node.snapshot(*key))
    }

    /// Total number of linked transports
    pub fn transport_count(&self) -> usize {
        let adapters = self.adapters.read();
        adapters
            .iter()
            .flatten()
            .flat_map(|adapter| adapter.devices.values())
            .map(|device| device.transports.len())
            .sum()
    }

    /// Record a fresh bus registration on a transport
    ///
    /// Fails if the transport vanished or got exposed in the meantime.
    pub(crate) fn bind_export(&self, key: &TransportKey, id: RegistrationId) -> Result<()> {
        let mut adapters = self.adapters.write();
        let node = Self::transport_node_mut(&mut adapters, key)?;
        if node.export.is_some() {
            return Err(AppError::AlreadyExposed(node.path.clone()));
        }
        node.export = Some(id);
        Ok(())
    }

    /// Clear the exposure handle, but only if it still is `id`
    pub(crate) fn clear_export(&self, key: &TransportKey, id: RegistrationId) -> bool {
        let mut adapters = self.adapters.write();
        match Self::transport_node_mut(&mut adapters, key) {
            Ok(node) if node.export == Some(id) => {
                node.export = None;
                true
            }
            _ => false,
        }
    }

    fn adapter_node_mut(adapters: &mut [Option<AdapterNode>], index: u16) -> Result<&mut AdapterNode> {
        adapters
            .get_mut(usize::from(index))
            .and_then(Option::as_mut)
            .ok_or(AppError::AdapterNotFound(index))
    }

    fn device_node_mut<'a>(
        adapters: &'a mut [Option<AdapterNode>],
        index: u16,
        address: &BdAddr,
    ) -> Result<&'a mut DeviceNode> {
        Self::adapter_node_mut(adapters, index)?
            .devices
            .get_mut(address)
            .ok_or_else(|| AppError::DeviceNotFound {
                adapter: index,
                device: address.to_string(),
            })
    }

    fn transport_node_mut<'a>(
        adapters: &'a mut [Option<AdapterNode>],
        key: &TransportKey,
    ) -> Result<&'a mut TransportNode> {
        let device = Self::device_node_mut(adapters, key.adapter, &key.device)?;
        match device.transports.get_mut(&key.profile) {
            Some(node) => Ok(node),
            None => Err(AppError::TransportNotFound(transport_path(
                key.adapter,
                &key.device,
                key.profile,
            )?)),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
