//! Static catalog of device type descriptors.
//!
//! Device families are registered ahead of time as [`DeviceTypeDescriptor`]
//! entries: a display name, the vendor/product id pairs the family claims,
//! and a factory that builds a live device from an opened connection. This
//! replaces any form of runtime type discovery with an enumerable,
//! testable table.

use crate::devices::AnyCardDevice;
use crate::error::Result;
use crate::types::ConnectionHandle;
use cardhost_core::{DeviceId, PhysicalDescriptor, UsbIds};
use std::fmt;
use std::sync::Arc;

/// Factory contract for device type plugins.
///
/// Invoked by the attach handler with a freshly allocated identifier, the
/// device's physical descriptor, and the opened connection. Ownership of
/// the connection handle transfers into the call: on success it belongs to
/// the constructed device, on failure it is dropped inside the factory and
/// its RAII drop releases the connection. Factories must not release the
/// handle themselves on failure and must not stash it anywhere on failure
/// paths.
pub type DeviceFactory = Arc<
    dyn Fn(DeviceId, PhysicalDescriptor, ConnectionHandle) -> Result<AnyCardDevice> + Send + Sync,
>;

/// Immutable catalog entry for one device family.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use cardhost_core::UsbIds;
/// use cardhost_hardware::{AnyCardDevice, BusCardDevice, DeviceTypeDescriptor};
///
/// let descriptor = DeviceTypeDescriptor::new(
///     "ReaderA",
///     vec![UsbIds::new(0x1234, 0x5678)],
///     Arc::new(|id, physical, connection| {
///         Ok(AnyCardDevice::Bus(BusCardDevice::new(
///             id, "ReaderA", physical, connection,
///         )))
///     }),
/// );
///
/// assert!(descriptor.matches(UsbIds::new(0x1234, 0x5678)));
/// assert!(!descriptor.matches(UsbIds::new(0x1234, 0x0000)));
/// ```
#[derive(Clone)]
pub struct DeviceTypeDescriptor {
    /// Human-readable display name, carried into notifications.
    name: String,

    /// Vendor/product id pairs this family claims to support.
    ids: Vec<UsbIds>,

    /// Factory building a live device from an opened connection.
    factory: DeviceFactory,
}

impl DeviceTypeDescriptor {
    /// Create a new device type descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, ids: Vec<UsbIds>, factory: DeviceFactory) -> Self {
        Self {
            name: name.into(),
            ids,
            factory,
        }
    }

    /// Display name of this device family.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Vendor/product id pairs this family claims.
    #[must_use]
    pub fn ids(&self) -> &[UsbIds] {
        &self.ids
    }

    /// Whether this family claims the given id pair.
    #[must_use]
    pub fn matches(&self, ids: UsbIds) -> bool {
        self.ids.contains(&ids)
    }

    /// Invoke the factory to construct a device instance.
    ///
    /// # Errors
    ///
    /// Returns whatever the factory returns. On error the connection
    /// handle has already been dropped (and thereby released) inside the
    /// factory call.
    pub fn construct(
        &self,
        id: DeviceId,
        physical: PhysicalDescriptor,
        connection: ConnectionHandle,
    ) -> Result<AnyCardDevice> {
        (self.factory)(id, physical, connection)
    }
}

impl fmt::Debug for DeviceTypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceTypeDescriptor")
            .field("name", &self.name)
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

/// Ordered set of registered device type descriptors.
///
/// Registration order matters: when several descriptors claim the same id
/// pair, the attach handler attempts every match in registration order and
/// registers one device per successful construction (the
/// all-matches-attempted policy). Implementations wanting strict
/// single-ownership semantics should register disjoint id sets instead.
#[derive(Debug, Clone, Default)]
pub struct DeviceCatalog {
    descriptors: Vec<DeviceTypeDescriptor>,
}

impl DeviceCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device type descriptor.
    pub fn register(&mut self, descriptor: DeviceTypeDescriptor) {
        self.descriptors.push(descriptor);
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with(mut self, descriptor: DeviceTypeDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    /// Number of registered descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Iterate over all registered descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceTypeDescriptor> {
        self.descriptors.iter()
    }

    /// Iterate over the descriptors claiming the given id pair, in
    /// registration order.
    pub fn matching(&self, ids: UsbIds) -> impl Iterator<Item = &DeviceTypeDescriptor> {
        self.descriptors.iter().filter(move |d| d.matches(ids))
    }
}
