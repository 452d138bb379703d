//! Integration tests for the device manager event pump.
//!
//! These tests drive the full lifecycle against the mock host bus: live
//! hot-plug events through the pump, startup scan for pre-plugged
//! devices, and shutdown teardown of remaining connections.

use cardhost_core::UsbIds;
use cardhost_hardware::mock::MockHostBus;
use cardhost_hardware::{
    AnyCardDevice, BusCardDevice, DeviceCatalog, DeviceChange, DeviceManager,
    DeviceTypeDescriptor, RawBusDevice,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

const READER_IDS: UsbIds = UsbIds::new(0x1234, 0x5678);
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

fn reader_descriptor(name: &'static str) -> DeviceTypeDescriptor {
    DeviceTypeDescriptor::new(
        name,
        vec![READER_IDS],
        Arc::new(move |id, physical, connection| {
            Ok(AnyCardDevice::Bus(BusCardDevice::new(
                id, name, physical, connection,
            )))
        }),
    )
}

fn raw(identity: u64) -> RawBusDevice {
    RawBusDevice::from_parts(0x1234, 0x5678, identity)
}

async fn next_change(changes: &mut broadcast::Receiver<DeviceChange>) -> DeviceChange {
    timeout(RECV_TIMEOUT, changes.recv())
        .await
        .expect("timed out waiting for device change")
        .expect("change channel closed")
}

#[tokio::test]
async fn test_hotplug_attach_and_detach_roundtrip() {
    let catalog = DeviceCatalog::new().with(reader_descriptor("ReaderA"));
    let (bus, mut bus_handle) = MockHostBus::new();
    let manager = DeviceManager::new(bus, catalog);
    let mut changes = manager.subscribe();

    let handle = manager.start(bus_handle.take_events());

    bus_handle.plug(raw(0x01)).await;
    let added = next_change(&mut changes).await;
    assert!(added.was_added());
    assert_eq!(added.device_name(), "ReaderA");
    assert_eq!(manager.card_devices().len(), 1);

    bus_handle.unplug(raw(0x01)).await;
    let removed = next_change(&mut changes).await;
    assert!(!removed.was_added());
    assert_eq!(removed.device_name(), "ReaderA");
    assert!(manager.card_devices().is_empty());

    // The unplugged device's connection came back exactly once
    assert_eq!(bus_handle.next_release().await, Some(1));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_scan_catches_devices_plugged_before_start() {
    let catalog = DeviceCatalog::new().with(reader_descriptor("ReaderA"));
    let (bus, mut bus_handle) = MockHostBus::new();
    let manager = DeviceManager::new(bus, catalog);
    let mut changes = manager.subscribe();

    // Plugged in before anyone was listening
    bus_handle.plug_silently(raw(0x01));
    bus_handle.plug_silently(raw(0x02));

    manager.scan_for_devices().await.unwrap();
    assert_eq!(manager.card_devices().len(), 2);

    let first = next_change(&mut changes).await;
    let second = next_change(&mut changes).await;
    assert!(first.was_added() && second.was_added());
    assert_ne!(first.device_id(), second.device_id());

    // Going live afterwards must not re-register scanned devices
    let handle = manager.start(bus_handle.take_events());
    bus_handle.plug(raw(0x01)).await;
    bus_handle.plug(raw(0x03)).await;

    let third = next_change(&mut changes).await;
    assert!(third.was_added());
    assert_eq!(manager.card_devices().len(), 3);
    assert!(changes.try_recv().is_err());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_burst_of_distinct_devices_all_register() {
    let catalog = DeviceCatalog::new().with(reader_descriptor("ReaderA"));
    let (bus, mut bus_handle) = MockHostBus::new();
    let manager = DeviceManager::new(bus, catalog);
    let mut changes = manager.subscribe();

    let handle = manager.start(bus_handle.take_events());

    for identity in 1..=5u64 {
        bus_handle.plug(raw(identity)).await;
    }

    let mut ids = Vec::new();
    for _ in 0..5 {
        let change = next_change(&mut changes).await;
        assert!(change.was_added());
        ids.push(change.device_id().unwrap());
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 5);
    assert_eq!(manager.card_devices().len(), 5);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_releases_remaining_connections() {
    let catalog = DeviceCatalog::new().with(reader_descriptor("ReaderA"));
    let (bus, mut bus_handle) = MockHostBus::new();
    let manager = DeviceManager::new(bus, catalog);
    let mut changes = manager.subscribe();

    let handle = manager.start(bus_handle.take_events());

    bus_handle.plug(raw(0x01)).await;
    bus_handle.plug(raw(0x02)).await;
    next_change(&mut changes).await;
    next_change(&mut changes).await;
    assert!(bus_handle.drain_releases().is_empty());

    handle.shutdown().await.unwrap();

    assert!(manager.card_devices().is_empty());
    let mut released = vec![
        bus_handle.next_release().await.unwrap(),
        bus_handle.next_release().await.unwrap(),
    ];
    released.sort_unstable();
    assert_eq!(released, [1, 2]);
}
