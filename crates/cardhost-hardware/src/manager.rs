//! Card device lifecycle manager.
//!
//! This module provides the `DeviceManager`, which reacts to hot-plug
//! events from a host bus, resolves physical devices against the device
//! type catalog, and keeps the [`DeviceRegistry`] consistent while
//! broadcasting change notifications to interested listeners.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐  BusEvent   ┌──────────────┐ per-event ┌────────────────┐
//! │ Host Bus │────────────►│  Event Pump  │──────────►│ Attach/Detach  │
//! │ backend  │   (mpsc)    │  (one task)  │  spawn    │ Handler task   │
//! └──────────┘             └──────────────┘           └───────┬────────┘
//!                                                            │
//!                                        ┌───────────────────┼─────────┐
//!                                        ▼                   ▼         │
//!                                 DeviceRegistry      DeviceChange     │
//!                                 (shared state)      (broadcast) ◄────┘
//! ```
//!
//! Each event is dispatched onto its own task so that a connection open or
//! device construction blocking on host I/O never stalls delivery of
//! unrelated attach/detach events. Handlers run to completion; there is no
//! mid-flight cancellation of an in-progress attach.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use cardhost_core::UsbIds;
//! use cardhost_hardware::manager::DeviceManager;
//! use cardhost_hardware::mock::MockHostBus;
//! use cardhost_hardware::{AnyCardDevice, BusCardDevice, DeviceCatalog, DeviceTypeDescriptor};
//!
//! #[tokio::main]
//! async fn main() -> cardhost_hardware::Result<()> {
//!     let catalog = DeviceCatalog::new().with(DeviceTypeDescriptor::new(
//!         "ReaderA",
//!         vec![UsbIds::new(0x1234, 0x5678)],
//!         Arc::new(|id, physical, connection| {
//!             Ok(AnyCardDevice::Bus(BusCardDevice::new(
//!                 id, "ReaderA", physical, connection,
//!             )))
//!         }),
//!     ));
//!
//!     let (bus, mut bus_handle) = MockHostBus::new();
//!     let manager = DeviceManager::new(bus, catalog);
//!     let mut changes = manager.subscribe();
//!
//!     // Catch devices plugged in before we subscribed, then go live
//!     manager.scan_for_devices().await?;
//!     let handle = manager.start(bus_handle.take_events());
//!
//!     while let Ok(change) = changes.recv().await {
//!         println!("Change: {:?}", change);
//!     }
//!
//!     handle.shutdown().await?;
//!     Ok(())
//! }
//! ```

use crate::catalog::DeviceCatalog;
use crate::devices::AnyCardDevice;
use crate::error::Result;
use crate::registry::DeviceRegistry;
use crate::traits::{BusEvent, CardDevice, HostBus};
use crate::types::RawBusDevice;
use cardhost_core::DeviceId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the device change broadcast channel.
///
/// Slow subscribers that lag behind lose old notifications rather than
/// blocking the handlers; a lost UI notification is not a correctness
/// issue for the registry.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Notification of a registry change.
///
/// Broadcast to all subscribers when a device is added to or removed from
/// the registry. Delivery is fire-and-forget, at most once per change.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeviceChange {
    /// A device was constructed and registered.
    Added {
        /// Identifier of the new device.
        id: DeviceId,

        /// Display name from its device type descriptor.
        name: String,
    },

    /// A device was removed and its connection released.
    Removed {
        /// Display name of the removed device.
        name: String,
    },
}

impl DeviceChange {
    /// Whether this change added a device.
    #[must_use]
    pub fn was_added(&self) -> bool {
        matches!(self, Self::Added { .. })
    }

    /// Identifier of the device, present for additions.
    #[must_use]
    pub fn device_id(&self) -> Option<DeviceId> {
        match self {
            Self::Added { id, .. } => Some(*id),
            Self::Removed { .. } => None,
        }
    }

    /// Display name of the device.
    #[must_use]
    pub fn device_name(&self) -> &str {
        match self {
            Self::Added { name, .. } | Self::Removed { name } => name,
        }
    }
}

/// Handle to a started device manager.
///
/// Returned by [`DeviceManager::start`]; owns the event pump task and the
/// shutdown path.
#[derive(Debug)]
pub struct ManagerHandle {
    /// Event pump task.
    pump: JoinHandle<()>,

    /// Registry to tear down on shutdown.
    registry: Arc<DeviceRegistry>,
}

impl ManagerHandle {
    /// Stop processing bus events and tear down the registry.
    ///
    /// Aborts the event pump, waits for it to terminate, then releases
    /// every remaining connection handle. Handler tasks already in flight
    /// run to completion on the runtime.
    pub async fn shutdown(self) -> Result<()> {
        self.pump.abort();
        let _ = self.pump.await;
        self.registry.teardown();
        Ok(())
    }
}

/// Manages the lifecycle of card devices attached over a host bus.
///
/// The manager is cheaply cloneable (all state is shared) so that each
/// bus event can be handled on its own task.
///
/// # Lifecycle
///
/// 1. Build a [`DeviceCatalog`] of the supported device types
/// 2. Create the manager with a bus backend (and optionally a
///    dependency-injected registry)
/// 3. [`subscribe`](Self::subscribe) for change notifications
/// 4. [`scan_for_devices`](Self::scan_for_devices) to catch devices
///    already present, then [`start`](Self::start) the event pump
/// 5. [`ManagerHandle::shutdown`] tears the registry down
pub struct DeviceManager<B> {
    /// Host bus backend.
    bus: Arc<B>,

    /// Registered device types.
    catalog: Arc<DeviceCatalog>,

    /// Live device registry (the only shared mutable state).
    registry: Arc<DeviceRegistry>,

    /// Change notification publisher.
    changes: broadcast::Sender<DeviceChange>,
}

impl<B> Clone for DeviceManager<B> {
    fn clone(&self) -> Self {
        Self {
            bus: Arc::clone(&self.bus),
            catalog: Arc::clone(&self.catalog),
            registry: Arc::clone(&self.registry),
            changes: self.changes.clone(),
        }
    }
}

impl<B: HostBus> DeviceManager<B> {
    /// Create a manager with a fresh, empty registry.
    #[must_use]
    pub fn new(bus: B, catalog: DeviceCatalog) -> Self {
        Self::with_registry(bus, catalog, Arc::new(DeviceRegistry::new()))
    }

    /// Create a manager around an existing registry.
    #[must_use]
    pub fn with_registry(bus: B, catalog: DeviceCatalog, registry: Arc<DeviceRegistry>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            bus: Arc::new(bus),
            catalog: Arc::new(catalog),
            registry,
            changes,
        }
    }

    /// Subscribe to device change notifications.
    ///
    /// Changes published before the subscription are not replayed.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceChange> {
        self.changes.subscribe()
    }

    /// Read-only snapshot of the currently connected devices.
    #[must_use]
    pub fn card_devices(&self) -> HashMap<DeviceId, Arc<AnyCardDevice>> {
        self.registry.snapshot()
    }

    /// The underlying registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Run the attach path for every currently enumerable device.
    ///
    /// Typically called once at startup, before [`start`](Self::start),
    /// to catch devices that were plugged in before the event stream was
    /// subscribed. Already-registered devices are skipped by the dedup
    /// check, so a redundant scan is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error only if bus enumeration itself fails. Per-device
    /// attach failures are silent, as on the hot-plug path.
    pub async fn scan_for_devices(&self) -> Result<()> {
        let present = self.bus.enumerate().await?;
        debug!(count = present.len(), "scanning bus for devices");

        for raw in &present {
            self.handle_attached(raw).await;
        }
        Ok(())
    }

    /// Handle an attach event for a raw bus device.
    ///
    /// Idempotent: re-delivery of an attach event for an
    /// already-registered device is a no-op. Every catalog descriptor
    /// matching the device's ids is attempted independently; each
    /// successful construction registers one device and publishes one
    /// [`DeviceChange::Added`]. Failures to open or construct abandon
    /// that candidate silently.
    pub async fn handle_attached(&self, raw: &RawBusDevice) {
        if self.registry.contains_physical(&raw.physical) {
            debug!(device = %raw.physical, "attach ignored: device already registered");
            return;
        }

        for descriptor in self.catalog.matching(raw.ids()) {
            let connection = match self.bus.open(raw).await {
                Ok(connection) => connection,
                Err(error) => {
                    debug!(
                        device = %raw.physical,
                        device_type = descriptor.name(),
                        %error,
                        "connection open failed, skipping candidate"
                    );
                    continue;
                }
            };

            let id = self.registry.allocate_id();
            let device = match descriptor.construct(id, raw.physical, connection) {
                Ok(device) => device,
                Err(error) => {
                    // The factory consumed the handle; its drop released
                    // the connection
                    warn!(
                        device = %raw.physical,
                        device_type = descriptor.name(),
                        %error,
                        "device construction failed, skipping candidate"
                    );
                    continue;
                }
            };

            let name = device.name().to_string();
            if !self.registry.try_insert(id, Arc::new(device)) {
                debug!(
                    device = %raw.physical,
                    device_type = descriptor.name(),
                    "lost attach race, discarding duplicate"
                );
                continue;
            }

            info!(device = %raw.physical, %id, %name, "card device attached");
            self.publish(DeviceChange::Added { id, name });
        }
    }

    /// Handle a detach event for a raw bus device.
    ///
    /// Removes every registry entry matching the device's physical
    /// descriptor (zero, one, or many under the all-matches-attempted
    /// policy), releases each connection handle exactly once, and
    /// publishes one [`DeviceChange::Removed`] per removed device.
    pub async fn handle_detached(&self, raw: &RawBusDevice) {
        let removed = self.registry.remove_matching(&raw.physical);
        if removed.is_empty() {
            debug!(device = %raw.physical, "detach ignored: no matching device");
            return;
        }

        for (id, device) in removed {
            if let Err(error) = device.release_connection() {
                // Ownership bug guard; the entry itself is already gone
                warn!(%id, %error, "connection already released during detach");
            }

            let name = device.name().to_string();
            info!(device = %raw.physical, %id, %name, "card device detached");
            self.publish(DeviceChange::Removed { name });
        }
    }

    /// Fire-and-forget notification publish.
    fn publish(&self, change: DeviceChange) {
        // No subscribers (or only lagged ones) is not an error
        let _ = self.changes.send(change);
    }
}

impl<B: HostBus + 'static> DeviceManager<B> {
    /// Start processing bus events and return a shutdown handle.
    ///
    /// Spawns the event pump, which dispatches every incoming event onto
    /// its own task running [`handle_attached`](Self::handle_attached) or
    /// [`handle_detached`](Self::handle_detached). The pump terminates
    /// when the event source closes or the handle is shut down.
    #[must_use]
    pub fn start(&self, mut events: mpsc::Receiver<BusEvent>) -> ManagerHandle {
        let manager = self.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let manager = manager.clone();
                tokio::spawn(async move {
                    match event {
                        BusEvent::Attached(raw) => manager.handle_attached(&raw).await,
                        BusEvent::Detached(raw) => manager.handle_detached(&raw).await,
                    }
                });
            }
            debug!("bus event stream closed, stopping event pump");
        });

        ManagerHandle {
            pump,
            registry: Arc::clone(&self.registry),
        }
    }
}
