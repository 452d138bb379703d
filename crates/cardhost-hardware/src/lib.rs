//! Card device lifecycle management for the cardhost stack.
//!
//! This crate detects attach/detach events for card-reading peripherals
//! connected over a host bus, matches physical devices against a static
//! catalog of device type descriptors, and maintains a concurrently
//! readable registry of the devices that are currently connected.
//!
//! # Design Philosophy
//!
//! - **Async-first**: bus I/O uses native `async fn` in traits
//!   (Rust 1.90 + Edition 2024 RPITIT), and every hot-plug event is
//!   handled on its own task so blocking opens never stall unrelated
//!   events.
//! - **Static catalog**: device families register
//!   [`DeviceTypeDescriptor`] entries ahead of time; there is no runtime
//!   type discovery, which keeps the catalog enumerable and testable.
//! - **Explicit ownership**: every [`ConnectionHandle`] has exactly one
//!   owner at a time and is released exactly once; a double release is a
//!   defect, not a recoverable condition.
//! - **No global state**: the [`DeviceRegistry`] is explicitly
//!   constructed and dependency-injected, starts empty, and defines its
//!   teardown (release all handles) semantics.
//!
//! # Getting Started
//!
//! ```no_run
//! use std::sync::Arc;
//! use cardhost_core::UsbIds;
//! use cardhost_hardware::mock::MockHostBus;
//! use cardhost_hardware::{
//!     AnyCardDevice, BusCardDevice, DeviceCatalog, DeviceManager, DeviceTypeDescriptor,
//! };
//!
//! #[tokio::main]
//! async fn main() -> cardhost_hardware::Result<()> {
//!     // 1. Describe the device families we know how to drive
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
//!     // 2. Wire the manager to a bus backend
//!     let (bus, mut bus_handle) = MockHostBus::new();
//!     let manager = DeviceManager::new(bus, catalog);
//!
//!     // 3. Catch up on already-present devices, then go live
//!     manager.scan_for_devices().await?;
//!     let handle = manager.start(bus_handle.take_events());
//!
//!     // ... use manager.subscribe() / manager.card_devices() ...
//!
//!     handle.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! Operations return [`Result<T>`][error::Result] with the
//! [`HardwareError`] error type. Attach and detach handling deliberately
//! surfaces no per-device errors to callers: a device that cannot be
//! opened or constructed is silently skipped, and the broadcast
//! notification channel is the only user-visible surface.

pub mod catalog;
pub mod devices;
pub mod error;
pub mod manager;
pub mod mock;
pub mod registry;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use catalog::{DeviceCatalog, DeviceFactory, DeviceTypeDescriptor};
pub use devices::{AnyCardDevice, BusCardDevice};
pub use error::{HardwareError, Result};
pub use registry::DeviceRegistry;
pub use traits::{BusEvent, CardDevice, HostBus};
pub use types::{ConnectionHandle, RawBusDevice};

// Re-export manager types
pub use manager::{DeviceChange, DeviceManager, ManagerHandle};
