//! Value types for bus devices and connection handles.

use crate::error::{HardwareError, Result};
use cardhost_core::{BusIdentity, PhysicalDescriptor, UsbIds};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Raw descriptor of a device as reported by the host bus.
///
/// This is what attach/detach events and bus enumeration deliver: enough
/// to resolve the device against the catalog (vendor/product ids) and to
/// tell plugged instances apart (bus identity). It carries no open
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawBusDevice {
    /// Physical identity of the device.
    pub physical: PhysicalDescriptor,
}

impl RawBusDevice {
    /// Create a raw bus device descriptor.
    #[must_use]
    pub const fn new(physical: PhysicalDescriptor) -> Self {
        RawBusDevice { physical }
    }

    /// Convenience constructor from parts.
    ///
    /// # Examples
    ///
    /// ```
    /// use cardhost_hardware::RawBusDevice;
    ///
    /// let raw = RawBusDevice::from_parts(0x1234, 0x5678, 0x0104);
    /// assert_eq!(raw.ids().vendor_id, 0x1234);
    /// ```
    #[must_use]
    pub const fn from_parts(vendor_id: u16, product_id: u16, identity: u64) -> Self {
        RawBusDevice {
            physical: PhysicalDescriptor::new(
                UsbIds::new(vendor_id, product_id),
                BusIdentity::from_raw(identity),
            ),
        }
    }

    /// Vendor/product id pair of this device.
    #[must_use]
    pub const fn ids(&self) -> UsbIds {
        self.physical.ids
    }
}

/// An opened, exclusively-owned communication channel to a physical device.
///
/// A handle is produced by a [`HostBus`](crate::traits::HostBus)
/// implementation when a connection is opened and is owned by exactly one
/// party at a time: the attach handler until construction succeeds, the
/// constructed device afterwards.
///
/// # Release semantics
///
/// [`release`](Self::release) succeeds exactly once. A second call is a
/// programming defect (it indicates a registry or ownership bug): debug
/// builds fail fast with an assertion, release builds return
/// [`HardwareError::DoubleRelease`] so the condition is never silently
/// ignored. Dropping an unreleased handle releases it as an RAII safety
/// net; that does not count as a double release.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Bus-assigned handle id, unique per opened connection.
    id: u64,

    /// When the connection was opened.
    opened_at: DateTime<Utc>,

    /// Whether the underlying connection has been released.
    released: AtomicBool,

    /// Optional observer notified once on release (used by the mock bus
    /// to let tests assert exactly-once release).
    release_notify: Option<mpsc::UnboundedSender<u64>>,
}

impl ConnectionHandle {
    /// Create a new open connection handle.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            opened_at: Utc::now(),
            released: AtomicBool::new(false),
            release_notify: None,
        }
    }

    /// Create a handle whose release is reported to an observer.
    #[must_use]
    pub fn with_release_notify(id: u64, notify: mpsc::UnboundedSender<u64>) -> Self {
        Self {
            id,
            opened_at: Utc::now(),
            released: AtomicBool::new(false),
            release_notify: Some(notify),
        }
    }

    /// Bus-assigned id of this connection.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// When the connection was opened.
    #[must_use]
    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Whether the connection has already been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Release the underlying connection.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::DoubleRelease`] if the handle was already
    /// released. Debug builds assert before returning.
    pub fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            debug_assert!(false, "connection handle {} released twice", self.id);
            return Err(HardwareError::DoubleRelease { handle_id: self.id });
        }

        trace!(handle_id = self.id, "connection handle released");
        self.notify_release();
        Ok(())
    }

    fn notify_release(&self) {
        if let Some(notify) = &self.release_notify {
            // Observer may be gone; release itself already happened
            let _ = notify.send(self.id);
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            debug!(
                handle_id = self.id,
                "connection handle dropped without explicit release"
            );
            self.notify_release();
        }
    }
}
