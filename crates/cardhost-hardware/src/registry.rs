//! Concurrent registry of live card devices.
//!
//! The registry is the single source of truth for "what is currently
//! connected". It is an explicitly constructed, dependency-injected value
//! (no global singleton): it starts empty and [`teardown`] defines its end
//! of life by releasing every remaining connection handle.
//!
//! Each individual call is atomic; composite check-then-act sequences are
//! the attach/detach handlers' responsibility and go through the dedicated
//! atomic paths [`try_insert`] and [`remove_matching`].
//!
//! [`teardown`]: DeviceRegistry::teardown
//! [`try_insert`]: DeviceRegistry::try_insert
//! [`remove_matching`]: DeviceRegistry::remove_matching

use crate::devices::AnyCardDevice;
use crate::traits::CardDevice;
use cardhost_core::{DeviceId, PhysicalDescriptor};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::warn;

/// Concurrent mapping from device identifier to live device instance.
///
/// Devices are stored behind `Arc` so that [`snapshot`](Self::snapshot)
/// can hand out a read-only view that stays valid while the registry keeps
/// mutating. The internal lock is never held across an await point.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    /// Live devices by identifier.
    devices: RwLock<HashMap<DeviceId, Arc<AnyCardDevice>>>,

    /// Source of fresh device identifiers.
    next_id: AtomicU32,
}

impl DeviceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh device identifier.
    ///
    /// Identifiers are unique per registry and never reused.
    #[must_use]
    pub fn allocate_id(&self) -> DeviceId {
        DeviceId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Insert a device under a caller-guaranteed fresh identifier.
    ///
    /// The attach handler's dedup check, not the registry, enforces that
    /// `id` is not already present; violating that is a caller bug, and
    /// debug builds assert on it.
    pub fn insert(&self, id: DeviceId, device: Arc<AnyCardDevice>) {
        let mut devices = self.write_devices();
        let previous = devices.insert(id, device);
        debug_assert!(previous.is_none(), "device id {id} inserted twice");
    }

    /// Atomically insert a device unless an equivalent entry exists.
    ///
    /// "Equivalent" means same physical descriptor and same display name:
    /// under the all-matches-attempted policy one physical device may
    /// legitimately be registered once per matching catalog descriptor,
    /// but concurrent duplicate attach deliveries for the same descriptor
    /// must collapse to a single entry. This is the single atomic
    /// check-and-insert path the attach handler commits through.
    ///
    /// Returns `false` (and drops `device`, releasing its connection via
    /// RAII) if the race was lost.
    pub fn try_insert(&self, id: DeviceId, device: Arc<AnyCardDevice>) -> bool {
        let mut devices = self.write_devices();

        if let Some(physical) = device.physical_descriptor() {
            let duplicate = devices.values().any(|existing| {
                existing.physical_descriptor() == Some(physical)
                    && existing.name() == device.name()
            });
            if duplicate {
                return false;
            }
        }

        let previous = devices.insert(id, device);
        debug_assert!(previous.is_none(), "device id {id} inserted twice");
        true
    }

    /// Remove a device by identifier, returning it if present.
    pub fn remove(&self, id: DeviceId) -> Option<Arc<AnyCardDevice>> {
        self.write_devices().remove(&id)
    }

    /// Atomically remove every device matching a physical descriptor.
    ///
    /// Zero, one, or many entries may match (many under the
    /// all-matches-attempted policy). Connection handles are NOT released
    /// here; that is the detach handler's job.
    pub fn remove_matching(
        &self,
        physical: &PhysicalDescriptor,
    ) -> Vec<(DeviceId, Arc<AnyCardDevice>)> {
        let mut devices = self.write_devices();

        let matching: Vec<DeviceId> = devices
            .iter()
            .filter(|(_, device)| device.physical_descriptor() == Some(physical))
            .map(|(id, _)| *id)
            .collect();

        matching
            .into_iter()
            .filter_map(|id| devices.remove(&id).map(|device| (id, device)))
            .collect()
    }

    /// Whether any registered device has the given physical descriptor.
    ///
    /// This is the attach handler's cheap dedup probe; the authoritative
    /// check happens again inside [`try_insert`](Self::try_insert).
    #[must_use]
    pub fn contains_physical(&self, physical: &PhysicalDescriptor) -> bool {
        self.read_devices()
            .values()
            .any(|device| device.physical_descriptor() == Some(physical))
    }

    /// Read-only snapshot of all live devices.
    ///
    /// Safe to iterate concurrently with ongoing mutation; entries are
    /// only ever inserted fully constructed, so a snapshot never observes
    /// a partial device.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<DeviceId, Arc<AnyCardDevice>> {
        self.read_devices().clone()
    }

    /// Number of live devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_devices().len()
    }

    /// Whether the registry has no live devices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_devices().is_empty()
    }

    /// Drain the registry, releasing every remaining connection handle.
    ///
    /// Called on shutdown. Emits no notifications; the process is going
    /// away, not the devices.
    pub fn teardown(&self) {
        let drained: Vec<_> = self.write_devices().drain().collect();

        for (id, device) in drained {
            if let Err(error) = device.release_connection() {
                warn!(%id, %error, "connection already released during teardown");
            }
        }
    }

    fn read_devices(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<DeviceId, Arc<AnyCardDevice>>> {
        self.devices.read().expect("device registry lock poisoned")
    }

    fn write_devices(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<DeviceId, Arc<AnyCardDevice>>> {
        self.devices.write().expect("device registry lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::BusCardDevice;
    use crate::types::{ConnectionHandle, RawBusDevice};
    use tokio::sync::mpsc;

    fn device(registry: &DeviceRegistry, name: &str, identity: u64) -> (DeviceId, Arc<AnyCardDevice>) {
        let id = registry.allocate_id();
        let raw = RawBusDevice::from_parts(0x1234, 0x5678, identity);
        let device = Arc::new(AnyCardDevice::Bus(BusCardDevice::new(
            id,
            name,
            raw.physical,
            ConnectionHandle::new(id.as_u32().into()),
        )));
        (id, device)
    }

    #[test]
    fn test_allocate_id_is_unique() {
        let registry = DeviceRegistry::new();
        let a = registry.allocate_id();
        let b = registry.allocate_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_insert_and_snapshot() {
        let registry = DeviceRegistry::new();
        assert!(registry.is_empty());

        let (id, dev) = device(&registry, "ReaderA", 0x01);
        registry.insert(id, dev);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[&id].name(), "ReaderA");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_mutation() {
        let registry = DeviceRegistry::new();
        let (id, dev) = device(&registry, "ReaderA", 0x01);
        registry.insert(id, dev);

        let snapshot = registry.snapshot();
        registry.remove(id);

        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_try_insert_rejects_same_physical_and_name() {
        let registry = DeviceRegistry::new();
        let (id_a, dev_a) = device(&registry, "ReaderA", 0x01);
        assert!(registry.try_insert(id_a, dev_a));

        let (id_dup, dev_dup) = device(&registry, "ReaderA", 0x01);
        assert!(!registry.try_insert(id_dup, dev_dup));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_try_insert_allows_same_physical_different_descriptor() {
        // All-matches-attempted: one entry per matching catalog descriptor
        let registry = DeviceRegistry::new();
        let (id_a, dev_a) = device(&registry, "ReaderA", 0x01);
        let (id_b, dev_b) = device(&registry, "ReaderB", 0x01);

        assert!(registry.try_insert(id_a, dev_a));
        assert!(registry.try_insert(id_b, dev_b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_contains_physical() {
        let registry = DeviceRegistry::new();
        let (id, dev) = device(&registry, "ReaderA", 0x01);
        let physical = *dev.physical_descriptor().unwrap();
        registry.insert(id, dev);

        assert!(registry.contains_physical(&physical));

        let other = RawBusDevice::from_parts(0x1234, 0x5678, 0x02).physical;
        assert!(!registry.contains_physical(&other));
    }

    #[test]
    fn test_remove_matching_removes_all_entries() {
        let registry = DeviceRegistry::new();
        let (id_a, dev_a) = device(&registry, "ReaderA", 0x01);
        let (id_b, dev_b) = device(&registry, "ReaderB", 0x01);
        let (id_c, dev_c) = device(&registry, "ReaderA", 0x02);
        let physical = *dev_a.physical_descriptor().unwrap();

        registry.insert(id_a, dev_a);
        registry.insert(id_b, dev_b);
        registry.insert(id_c, dev_c);

        let removed = registry.remove_matching(&physical);
        assert_eq!(removed.len(), 2);
        assert_eq!(registry.len(), 1);

        // Second detach for the same descriptor is a no-op
        assert!(registry.remove_matching(&physical).is_empty());
    }

    #[tokio::test]
    async fn test_teardown_releases_all_handles() {
        let registry = DeviceRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for identity in 1..=3u64 {
            let id = registry.allocate_id();
            let raw = RawBusDevice::from_parts(0x1234, 0x5678, identity);
            let device = Arc::new(AnyCardDevice::Bus(BusCardDevice::new(
                id,
                "ReaderA",
                raw.physical,
                ConnectionHandle::with_release_notify(identity, tx.clone()),
            )));
            registry.insert(id, device);
        }

        registry.teardown();
        assert!(registry.is_empty());

        let mut released = Vec::new();
        while let Ok(id) = rx.try_recv() {
            released.push(id);
        }
        released.sort_unstable();
        assert_eq!(released, [1, 2, 3]);
    }
}
