//! Device-level error types
//!
//! Every device failure is fatal for the operation that triggered it: the
//! frame loop propagates it and stops rather than attempting partial recovery.

use thiserror::Error;

/// Backend-neutral device failures
#[derive(Error, Debug)]
pub enum DeviceError {
    /// A device call failed
    #[error("{operation} failed: {reason}")]
    OperationFailed {
        /// What was being done (allocation, structure build, query, ...)
        operation: &'static str,
        /// Backend-specific failure description
        reason: String,
    },

    /// Memory allocation failed
    #[error("Out of device memory allocating {requested} bytes for {label}")]
    OutOfMemory {
        /// Label of the resource being allocated
        label: String,
        /// Number of bytes that were requested
        requested: u64,
    },

    /// A handle did not refer to a live resource
    #[error("Unknown {kind} handle {id}")]
    UnknownHandle {
        /// Resource kind (buffer, structure, signal, ...)
        kind: &'static str,
        /// Raw handle value
        id: u64,
    },

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// Device initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// A wait on the device did not complete in time
    #[error("Timed out waiting for {0}")]
    Timeout(String),
}

impl DeviceError {
    /// Shorthand for an operation failure
    pub fn operation(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::OperationFailed { operation, reason: reason.into() }
    }
}

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;
