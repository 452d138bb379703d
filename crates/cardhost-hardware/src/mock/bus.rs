//! Mock host bus implementation.

use crate::error::{HardwareError, Result};
use crate::traits::{BusEvent, HostBus};
use crate::types::{ConnectionHandle, RawBusDevice};
use cardhost_core::BusIdentity;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

/// Capacity of the simulated hot-plug event channel.
const EVENT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy)]
struct PortState {
    raw: RawBusDevice,
    open_fails: bool,
}

#[derive(Debug)]
struct MockBusInner {
    /// Currently present devices, keyed by bus identity.
    ports: Mutex<HashMap<BusIdentity, PortState>>,

    /// Source of connection handle ids.
    next_handle_id: AtomicU64,

    /// Release probe wired into every handle this bus opens.
    release_tx: mpsc::UnboundedSender<u64>,
}

impl MockBusInner {
    fn ports(&self) -> std::sync::MutexGuard<'_, HashMap<BusIdentity, PortState>> {
        self.ports.lock().expect("mock bus ports lock poisoned")
    }
}

/// Simulated host bus for testing and development.
///
/// Created together with a [`MockBusHandle`] that controls which devices
/// are present and delivers hot-plug events.
///
/// # Examples
///
/// ```
/// use cardhost_hardware::mock::MockHostBus;
/// use cardhost_hardware::{HostBus, RawBusDevice};
///
/// #[tokio::main]
/// async fn main() -> cardhost_hardware::Result<()> {
///     let (bus, handle) = MockHostBus::new();
///
///     let raw = RawBusDevice::from_parts(0x1234, 0x5678, 0x01);
///     handle.plug(raw).await;
///
///     assert_eq!(bus.enumerate().await?, vec![raw]);
///
///     let connection = bus.open(&raw).await?;
///     assert!(!connection.is_released());
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MockHostBus {
    inner: Arc<MockBusInner>,
}

impl MockHostBus {
    /// Create a new mock bus with no devices present.
    ///
    /// Returns a tuple of (MockHostBus, MockBusHandle) where the handle
    /// is used to simulate plugging and unplugging devices.
    #[must_use]
    pub fn new() -> (Self, MockBusHandle) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (release_tx, release_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(MockBusInner {
            ports: Mutex::new(HashMap::new()),
            next_handle_id: AtomicU64::new(1),
            release_tx,
        });

        let bus = Self {
            inner: Arc::clone(&inner),
        };

        let handle = MockBusHandle {
            inner,
            event_tx,
            event_rx: Some(event_rx),
            release_rx,
        };

        (bus, handle)
    }
}

impl HostBus for MockHostBus {
    async fn enumerate(&self) -> Result<Vec<RawBusDevice>> {
        Ok(self.inner.ports().values().map(|port| port.raw).collect())
    }

    async fn open(&self, raw: &RawBusDevice) -> Result<ConnectionHandle> {
        let ports = self.inner.ports();
        let port = ports
            .get(&raw.physical.identity)
            .ok_or_else(|| HardwareError::not_present(raw.physical.to_string()))?;

        if port.open_fails {
            return Err(HardwareError::open_failed(
                raw.physical.to_string(),
                "simulated open failure",
            ));
        }

        let id = self.inner.next_handle_id.fetch_add(1, Ordering::Relaxed);
        debug!(handle_id = id, device = %raw.physical, "mock connection opened");
        Ok(ConnectionHandle::with_release_notify(
            id,
            self.inner.release_tx.clone(),
        ))
    }
}

/// Control handle for a [`MockHostBus`].
///
/// Plugs and unplugs devices (delivering the corresponding hot-plug
/// events), injects open failures, and exposes the release probe through
/// which tests assert that connection handles are released exactly once.
#[derive(Debug)]
pub struct MockBusHandle {
    inner: Arc<MockBusInner>,
    event_tx: mpsc::Sender<BusEvent>,
    event_rx: Option<mpsc::Receiver<BusEvent>>,
    release_rx: mpsc::UnboundedReceiver<u64>,
}

impl MockBusHandle {
    /// Take the hot-plug event stream.
    ///
    /// Hand the receiver to
    /// [`DeviceManager::start`](crate::manager::DeviceManager::start).
    /// Can be taken only once.
    pub fn take_events(&mut self) -> mpsc::Receiver<BusEvent> {
        self.event_rx
            .take()
            .expect("bus event receiver already taken")
    }

    /// Plug a device in: it becomes enumerable and an attach event is
    /// delivered.
    pub async fn plug(&self, raw: RawBusDevice) {
        self.insert_port(raw);
        // Nobody listening is fine; the device is still present
        let _ = self.event_tx.send(BusEvent::Attached(raw)).await;
    }

    /// Make a device present without delivering an attach event.
    ///
    /// Models a device that was already plugged in before the event
    /// stream was subscribed; only a manual scan will find it.
    pub fn plug_silently(&self, raw: RawBusDevice) {
        self.insert_port(raw);
    }

    /// Unplug a device: it stops being enumerable and a detach event is
    /// delivered (even if the device was never present, matching real
    /// buses that replay stale detach events).
    pub async fn unplug(&self, raw: RawBusDevice) {
        self.inner.ports().remove(&raw.physical.identity);
        let _ = self.event_tx.send(BusEvent::Detached(raw)).await;
    }

    /// Make connection opens fail (or succeed again) for a device.
    pub fn set_open_fails(&self, identity: BusIdentity, fails: bool) {
        if let Some(port) = self.inner.ports().get_mut(&identity) {
            port.open_fails = fails;
        }
    }

    /// Drain all release notifications received so far.
    ///
    /// Returns the handle ids released since the last drain, in release
    /// order. Each opened connection appears at most once over the life of
    /// the bus.
    pub fn drain_releases(&mut self) -> Vec<u64> {
        let mut released = Vec::new();
        while let Ok(id) = self.release_rx.try_recv() {
            released.push(id);
        }
        released
    }

    /// Wait for the next release notification.
    pub async fn next_release(&mut self) -> Option<u64> {
        self.release_rx.recv().await
    }

    fn insert_port(&self, raw: RawBusDevice) {
        self.inner.ports().insert(
            raw.physical.identity,
            PortState {
                raw,
                open_fails: false,
            },
        );
    }
}
