//! Mock implementations for testing and development.
//!
//! The mock host bus simulates device hot-plug without physical hardware:
//! tests plug and unplug devices programmatically, make connection opens
//! fail on demand, and observe connection handle releases through a probe.

mod bus;

pub use bus::{MockBusHandle, MockHostBus};
