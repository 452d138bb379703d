use crate::{Result, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a live card device instance.
///
/// Assigned once per constructed device from a process-wide counter and
/// stable for the instance's lifetime. Identifiers are never persisted and
/// never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(u32);

impl DeviceId {
    /// Wrap a raw identifier value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        DeviceId(id)
    }

    /// Get the raw identifier as u32.
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// USB vendor/product id pair claimed by a device type.
///
/// # Examples
///
/// ```
/// use cardhost_core::UsbIds;
///
/// let ids: UsbIds = "9ac4:4b8f".parse().unwrap();
/// assert_eq!(ids, UsbIds::new(0x9ac4, 0x4b8f));
/// assert_eq!(ids.to_string(), "9ac4:4b8f");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsbIds {
    /// USB vendor id.
    pub vendor_id: u16,

    /// USB product id.
    pub product_id: u16,
}

impl UsbIds {
    /// Create a new vendor/product id pair.
    #[must_use]
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        UsbIds {
            vendor_id,
            product_id,
        }
    }
}

impl fmt::Display for UsbIds {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

impl std::str::FromStr for UsbIds {
    type Err = Error;

    /// Parse the conventional `vvvv:pppp` hex form (as printed by `lsusb`).
    fn from_str(s: &str) -> Result<Self> {
        let (vendor, product) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidUsbIds(format!("expected vvvv:pppp, got {s}")))?;
        let vendor_id = u16::from_str_radix(vendor, 16)
            .map_err(|_| Error::InvalidUsbIds(format!("invalid vendor id: {vendor}")))?;
        let product_id = u16::from_str_radix(product, 16)
            .map_err(|_| Error::InvalidUsbIds(format!("invalid product id: {product}")))?;
        Ok(UsbIds::new(vendor_id, product_id))
    }
}

/// Opaque bus-level identity of one plugged device.
///
/// Two devices with identical vendor/product ids still have distinct bus
/// identities (the bus backend typically packs bus number, address, and a
/// generation counter into the value). Only equality is meaningful; the
/// raw value must not be interpreted by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusIdentity(u64);

impl BusIdentity {
    /// Wrap a raw identity value produced by a bus backend.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        BusIdentity(raw)
    }

    /// Get the raw identity value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BusIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl std::str::FromStr for BusIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let raw = u64::from_str_radix(digits, 16)
            .map_err(|_| Error::InvalidBusIdentity(s.to_string()))?;
        Ok(BusIdentity::from_raw(raw))
    }
}

/// Physical identity of one connected card device.
///
/// Combines the vendor/product id pair (used for catalog resolution) with
/// the opaque bus identity (used to tell two otherwise identical devices
/// apart). Equality of physical descriptors is the key for both the attach
/// dedup check and detach matching.
///
/// # Examples
///
/// ```
/// use cardhost_core::{BusIdentity, PhysicalDescriptor, UsbIds};
///
/// let a = PhysicalDescriptor::new(UsbIds::new(0x9ac4, 0x4b8f), BusIdentity::from_raw(0x0104));
/// let b = PhysicalDescriptor::new(UsbIds::new(0x9ac4, 0x4b8f), BusIdentity::from_raw(0x0105));
///
/// // Same product, different plugged instance
/// assert_eq!(a.ids, b.ids);
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalDescriptor {
    /// Vendor/product id pair.
    pub ids: UsbIds,

    /// Bus-level identity of this plugged instance.
    pub identity: BusIdentity,
}

impl PhysicalDescriptor {
    /// Create a new physical descriptor.
    #[must_use]
    pub const fn new(ids: UsbIds, identity: BusIdentity) -> Self {
        PhysicalDescriptor { ids, identity }
    }
}

impl fmt::Display for PhysicalDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.ids, self.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_device_id_display() {
        let id = DeviceId::new(42);
        assert_eq!(id.as_u32(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[rstest]
    #[case("9ac4:4b8f", 0x9ac4, 0x4b8f)]
    #[case("0000:0001", 0x0000, 0x0001)]
    #[case("FFFF:FFFF", 0xffff, 0xffff)]
    fn test_usb_ids_parse_valid(#[case] input: &str, #[case] vendor: u16, #[case] product: u16) {
        let ids: UsbIds = input.parse().unwrap();
        assert_eq!(ids, UsbIds::new(vendor, product));
    }

    #[rstest]
    #[case("9ac44b8f")] // missing separator
    #[case("zzzz:0001")] // non-hex vendor
    #[case("9ac4:")] // empty product
    #[case("12345:0001")] // vendor out of range
    fn test_usb_ids_parse_invalid(#[case] input: &str) {
        let result: Result<UsbIds> = input.parse();
        assert!(result.is_err());
    }

    #[test]
    fn test_usb_ids_display_roundtrip() {
        let ids = UsbIds::new(0x1234, 0x5678);
        let parsed: UsbIds = ids.to_string().parse().unwrap();
        assert_eq!(ids, parsed);
    }

    #[rstest]
    #[case("0x0104", 0x0104)]
    #[case("0104", 0x0104)]
    #[case("0xffffffffffffffff", u64::MAX)]
    fn test_bus_identity_parse(#[case] input: &str, #[case] raw: u64) {
        let identity: BusIdentity = input.parse().unwrap();
        assert_eq!(identity.as_u64(), raw);
    }

    #[test]
    fn test_bus_identity_parse_invalid() {
        let result: Result<BusIdentity> = "not-hex".parse();
        assert!(result.is_err());
    }

    #[test]
    fn test_physical_descriptor_equality() {
        let ids = UsbIds::new(0x1234, 0x5678);
        let a = PhysicalDescriptor::new(ids, BusIdentity::from_raw(1));
        let b = PhysicalDescriptor::new(ids, BusIdentity::from_raw(1));
        let c = PhysicalDescriptor::new(ids, BusIdentity::from_raw(2));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_physical_descriptor_display() {
        let descriptor = PhysicalDescriptor::new(
            UsbIds::new(0x1234, 0x5678),
            BusIdentity::from_raw(0x0104),
        );
        assert_eq!(descriptor.to_string(), "1234:5678@0x00000104");
    }

    #[test]
    fn test_physical_descriptor_serde_roundtrip() {
        let descriptor = PhysicalDescriptor::new(
            UsbIds::new(0x1234, 0x5678),
            BusIdentity::from_raw(0x0104),
        );
        let json = serde_json::to_string(&descriptor).unwrap();
        let back: PhysicalDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(descriptor, back);
    }
}
