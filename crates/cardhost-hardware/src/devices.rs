//! Concrete card device types and the enum dispatch wrapper.
//!
//! Native `async fn` traits are not object-safe, and the registry needs a
//! single storable device type anyway, so device kinds are dispatched
//! through the [`AnyCardDevice`] enum wrapper rather than `Box<dyn _>`.
//! Adding a non-bus device kind means adding a variant here; the
//! attach/detach handlers match on capability
//! ([`physical_descriptor`](crate::traits::CardDevice::physical_descriptor))
//! and need no changes.

use crate::error::Result;
use crate::traits::CardDevice;
use crate::types::ConnectionHandle;
use cardhost_core::{DeviceId, PhysicalDescriptor};
use chrono::{DateTime, Utc};

/// A card device attached over the host bus.
///
/// Owns its [`ConnectionHandle`] exclusively; the handle is released
/// exactly once, when the device is detached (or on registry teardown).
#[derive(Debug)]
pub struct BusCardDevice {
    /// Instance identifier, assigned at construction.
    id: DeviceId,

    /// Display name from the device type descriptor.
    name: String,

    /// Physical identity used for dedup and detach matching.
    physical: PhysicalDescriptor,

    /// Exclusively-owned connection to the hardware.
    connection: ConnectionHandle,

    /// When the device was constructed.
    connected_at: DateTime<Utc>,
}

impl BusCardDevice {
    /// Create a new bus-attached card device.
    ///
    /// Ownership of `connection` transfers to the device; from here on the
    /// device (and ultimately the detach handler or registry teardown) is
    /// responsible for releasing it.
    #[must_use]
    pub fn new(
        id: DeviceId,
        name: impl Into<String>,
        physical: PhysicalDescriptor,
        connection: ConnectionHandle,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            physical,
            connection,
            connected_at: Utc::now(),
        }
    }

    /// The device's connection handle.
    #[must_use]
    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    /// When the device was constructed.
    #[must_use]
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// How long the device has been connected.
    #[must_use]
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.connected_at
    }
}

impl CardDevice for BusCardDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn physical_descriptor(&self) -> Option<&PhysicalDescriptor> {
        Some(&self.physical)
    }
}

/// Enum wrapper for card device dispatch.
///
/// # Examples
///
/// ```
/// use cardhost_core::DeviceId;
/// use cardhost_hardware::{AnyCardDevice, BusCardDevice, CardDevice, ConnectionHandle, RawBusDevice};
///
/// let raw = RawBusDevice::from_parts(0x1234, 0x5678, 0x01);
/// let device = AnyCardDevice::Bus(BusCardDevice::new(
///     DeviceId::new(1),
///     "ReaderA",
///     raw.physical,
///     ConnectionHandle::new(1),
/// ));
///
/// assert_eq!(device.name(), "ReaderA");
/// assert_eq!(device.physical_descriptor(), Some(&raw.physical));
/// ```
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyCardDevice {
    /// Device attached over the host bus.
    Bus(BusCardDevice),
}

impl AnyCardDevice {
    /// Release the device's connection, if it owns one.
    ///
    /// Device kinds without a connection return `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::DoubleRelease`](crate::HardwareError::DoubleRelease)
    /// if the connection was already released.
    pub fn release_connection(&self) -> Result<()> {
        match self {
            Self::Bus(device) => device.connection.release(),
        }
    }
}

impl CardDevice for AnyCardDevice {
    fn id(&self) -> DeviceId {
        match self {
            Self::Bus(device) => device.id(),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Bus(device) => device.name(),
        }
    }

    fn physical_descriptor(&self) -> Option<&PhysicalDescriptor> {
        match self {
            Self::Bus(device) => device.physical_descriptor(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawBusDevice;

    fn sample_device(id: u32, name: &str, identity: u64) -> AnyCardDevice {
        let raw = RawBusDevice::from_parts(0x1234, 0x5678, identity);
        AnyCardDevice::Bus(BusCardDevice::new(
            DeviceId::new(id),
            name,
            raw.physical,
            ConnectionHandle::new(u64::from(id)),
        ))
    }

    #[test]
    fn test_dispatch_through_trait() {
        let device = sample_device(3, "ReaderA", 0x0104);
        assert_eq!(device.id(), DeviceId::new(3));
        assert_eq!(device.name(), "ReaderA");
        assert!(device.physical_descriptor().is_some());
    }

    #[test]
    fn test_release_connection_once() {
        let device = sample_device(4, "ReaderA", 0x0104);
        device.release_connection().unwrap();

        let AnyCardDevice::Bus(inner) = &device;
        assert!(inner.connection().is_released());
    }

    #[test]
    fn test_uptime_is_monotonic() {
        let AnyCardDevice::Bus(device) = sample_device(5, "ReaderA", 0x0104);
        assert!(device.uptime() >= chrono::Duration::zero());
        assert!(device.connected_at() <= Utc::now());
    }
}
