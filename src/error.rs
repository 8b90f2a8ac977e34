//! Error types for the camera sync engine.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        SyncError categories                      │
//! │                                                                  │
//! │  Compatibility (never retried)   Transport (retried while syncing)│
//! │  - ConfigurationMissing          - Timeout                        │
//! │  - NotFoundOnDevice              - WriteFailure / ReadFailure     │
//! │  - InvalidPayload                - SubscribeFailure               │
//! │  - UnsupportedDevice                                              │
//! │                                                                  │
//! │  Lifecycle                       Outcome                          │
//! │  - Cancelled                     - SyncExhausted { last cause }   │
//! │  - NotConnected                                                   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::infrastructure::bluetooth::gatt::GattFeature;

/// Result type alias for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type alias for pure codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Failures raised by the vendor codecs. No I/O is involved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Payload shorter than the fixed layout requires.
    #[error("{packet} payload too short: expected at least {expected} bytes, got {actual}")]
    LengthMismatch {
        packet: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Payload length matches no known packet family.
    #[error("invalid payload of {length} bytes: {reason}")]
    InvalidPayload { length: usize, reason: String },

    /// The vendor protocol has no encoding for this feature.
    #[error("{0} is not supported by this protocol")]
    Unsupported(&'static str),

    /// A field decoded to a value outside its domain (e.g. month 13).
    #[error("field {field} out of range: {value}")]
    FieldOutOfRange { field: &'static str, value: i64 },
}

/// Primitive failures reported by the BLE transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("GATT operation failed: {0}")]
    Failed(String),

    #[error("device disconnected")]
    Disconnected,

    #[error("operation cancelled")]
    Cancelled,
}

/// Engine error taxonomy.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The vendor's GattSpec has no entry for the invoked feature.
    #[error("{vendor} does not define a characteristic for {feature}")]
    ConfigurationMissing {
        vendor: &'static str,
        feature: GattFeature,
    },

    /// The GattSpec entry exists but the connected device does not expose it.
    #[error("{what} {uuid} not found on device")]
    NotFoundOnDevice { what: &'static str, uuid: Uuid },

    #[error("{operation} on {characteristic} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        characteristic: Uuid,
        after: Duration,
    },

    #[error("write to {characteristic} failed: {source}")]
    WriteFailure {
        characteristic: Uuid,
        #[source]
        source: TransportError,
    },

    #[error("read of {characteristic} failed: {source}")]
    ReadFailure {
        characteristic: Uuid,
        #[source]
        source: TransportError,
    },

    #[error("subscription to {characteristic} failed: {source}")]
    SubscribeFailure {
        characteristic: Uuid,
        #[source]
        source: TransportError,
    },

    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] CodecError),

    /// Retry budget used up; `last` is the final attempt's failure.
    #[error("sync failed after {attempts} attempts: {last}")]
    SyncExhausted {
        attempts: u32,
        #[source]
        last: Box<SyncError>,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("camera {0} is not connected")]
    NotConnected(String),

    #[error("device is not a supported camera")]
    UnsupportedDevice,
}

impl SyncError {
    /// Whether a sync write may be attempted again after this failure.
    ///
    /// Compatibility errors are surfaced immediately; cancellation always
    /// propagates without consuming an attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SyncError::Cancelled
                | SyncError::ConfigurationMissing { .. }
                | SyncError::NotFoundOnDevice { .. }
                | SyncError::InvalidPayload(_)
                | SyncError::NotConnected(_)
                | SyncError::UnsupportedDevice
                | SyncError::SyncExhausted { .. }
        )
    }

    /// Errors that indicate an unsupported device/firmware combination.
    pub fn is_compatibility_error(&self) -> bool {
        matches!(
            self,
            SyncError::ConfigurationMissing { .. }
                | SyncError::NotFoundOnDevice { .. }
                | SyncError::UnsupportedDevice
        )
    }
}
