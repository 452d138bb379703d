//! Error types for card device lifecycle operations.
//!
//! Most failures in this crate are recovered locally: a connection that
//! cannot be opened or a device type factory that fails only abandons the
//! current attach candidate and is never surfaced to the caller of the
//! attach path. The variants here exist so that those local recoveries,
//! the mock bus, and factory implementations all speak the same language.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during card device lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The bus refused or failed to open a connection to a device.
    #[error("Failed to open connection to {device}: {reason}")]
    OpenFailed { device: String, reason: String },

    /// A device type factory could not build an instance from an opened
    /// connection.
    #[error("Construction of {device_type} failed: {reason}")]
    ConstructionFailed { device_type: String, reason: String },

    /// The device is not present on the bus.
    #[error("Device not present: {device}")]
    NotPresent { device: String },

    /// A connection handle was released more than once.
    ///
    /// This is a programming defect, not an operational condition: it
    /// indicates a registry or ownership bug. Debug builds assert before
    /// this variant is ever constructed.
    #[error("Connection handle {handle_id} released twice")]
    DoubleRelease { handle_id: u64 },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl HardwareError {
    /// Create a new connection-open failure.
    pub fn open_failed(device: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OpenFailed {
            device: device.into(),
            reason: reason.into(),
        }
    }

    /// Create a new construction failure.
    pub fn construction_failed(
        device_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ConstructionFailed {
            device_type: device_type.into(),
            reason: reason.into(),
        }
    }

    /// Create a new not-present error.
    pub fn not_present(device: impl Into<String>) -> Self {
        Self::NotPresent {
            device: device.into(),
        }
    }

    /// Create a generic error with custom message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}
