//! Trait definitions for host buses and card devices.
//!
//! These traits are the seams between the device lifecycle core and its
//! external collaborators: the host bus subsystem (enumeration, connection
//! opening, hot-plug events) and the per-family device implementations
//! consumed through the catalog's factory contract.
//!
//! All bus I/O uses native async trait methods (Rust 1.90 + Edition 2024
//! RPITIT), eliminating the need for the `async_trait` macro. The bus
//! methods are declared in the desugared `impl Future + Send` form so
//! that their futures can be awaited on spawned handler tasks for any
//! implementation; implementors still write plain `async fn`.

use crate::error::Result;
use crate::types::{ConnectionHandle, RawBusDevice};
use cardhost_core::{DeviceId, PhysicalDescriptor};
use std::future::Future;

/// Hot-plug event delivered by a host bus backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum BusEvent {
    /// A device was plugged in.
    Attached(RawBusDevice),

    /// A device was unplugged.
    Detached(RawBusDevice),
}

impl BusEvent {
    /// The raw device this event refers to.
    #[must_use]
    pub fn raw_device(&self) -> &RawBusDevice {
        match self {
            Self::Attached(raw) | Self::Detached(raw) => raw,
        }
    }
}

/// Host bus subsystem abstraction.
///
/// Implemented by bus backends (USB, PC/SC, the in-process mock). The
/// device manager consumes the bus only through this trait, so the
/// lifecycle core is testable without hardware.
///
/// Hot-plug events are delivered out of band through an
/// `mpsc::Receiver<BusEvent>` handed to
/// [`DeviceManager::start`](crate::manager::DeviceManager::start); the
/// trait itself covers the synchronous request/response half of the bus.
///
/// # Object Safety and Dynamic Dispatch
///
/// This trait is NOT object-safe because its methods return `impl Future`
/// (Edition 2024 RPITIT). Use generic type parameters, as
/// [`DeviceManager`](crate::manager::DeviceManager) does. The futures are
/// `Send` so handler tasks can be spawned onto a multi-threaded runtime;
/// implementations may still use plain `async fn` as long as their
/// futures hold no non-`Send` state across await points.
pub trait HostBus: Send + Sync {
    /// Enumerate all currently present devices.
    ///
    /// Used by the manual scan to catch devices that were already plugged
    /// in before the event stream was subscribed.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus cannot be queried at all. Per-device
    /// problems are not reported here; they surface later when a
    /// connection is opened.
    fn enumerate(&self) -> impl Future<Output = Result<Vec<RawBusDevice>>> + Send;

    /// Open an exclusive connection to a device.
    ///
    /// May block on host I/O; callers must not hold locks across it.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is busy, access is denied, or the
    /// device disappeared mid-handshake. The attach path treats any of
    /// these as "abandon this candidate" and stays silent.
    fn open(&self, raw: &RawBusDevice) -> impl Future<Output = Result<ConnectionHandle>> + Send;
}

/// A live card device of any kind.
///
/// The capability set is deliberately open: bus-attached devices expose
/// their physical descriptor through [`physical_descriptor`], while future
/// non-bus variants (e.g. network-attached readers) simply return `None`
/// and are ignored by the attach/detach handlers without those handlers
/// changing.
///
/// [`physical_descriptor`]: CardDevice::physical_descriptor
pub trait CardDevice: Send + Sync {
    /// Identifier assigned to this instance at construction time.
    fn id(&self) -> DeviceId;

    /// Human-readable display name (from the device type descriptor).
    fn name(&self) -> &str;

    /// Physical descriptor, for devices attached over the host bus.
    ///
    /// Returns `None` for device kinds that are not bus-attached.
    fn physical_descriptor(&self) -> Option<&PhysicalDescriptor> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHostBus;
    use std::sync::Arc;
    use tokio::task::JoinHandle;

    // The manager awaits bus futures on spawned handler tasks knowing only
    // `B: HostBus`; these helpers do not compile unless the trait itself
    // promises Send futures.
    fn enumerate_on_task<B: HostBus + 'static>(
        bus: Arc<B>,
    ) -> JoinHandle<Result<Vec<RawBusDevice>>> {
        tokio::spawn(async move { bus.enumerate().await })
    }

    fn open_on_task<B: HostBus + 'static>(
        bus: Arc<B>,
        raw: RawBusDevice,
    ) -> JoinHandle<Result<ConnectionHandle>> {
        tokio::spawn(async move { bus.open(&raw).await })
    }

    #[tokio::test]
    async fn test_bus_futures_run_on_spawned_tasks() {
        let (bus, handle) = MockHostBus::new();
        let raw = RawBusDevice::from_parts(0x1234, 0x5678, 0x01);
        handle.plug_silently(raw);
        let bus = Arc::new(bus);

        let present = enumerate_on_task(Arc::clone(&bus)).await.unwrap().unwrap();
        assert_eq!(present, vec![raw]);

        let connection = open_on_task(bus, raw).await.unwrap().unwrap();
        assert!(!connection.is_released());
    }

    #[test]
    fn test_bus_event_raw_device() {
        let raw = RawBusDevice::from_parts(0x1234, 0x5678, 0x01);
        assert_eq!(BusEvent::Attached(raw).raw_device(), &raw);
        assert_eq!(BusEvent::Detached(raw).raw_device(), &raw);
    }
}
