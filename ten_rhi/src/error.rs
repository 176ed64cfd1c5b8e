//! Error types for the TenEngine RHI
//!
//! This module defines the error type returned by every fallible RHI call:
//! device creation, resource creation, swap chain operations and queue waits.
//! Recording calls on a command list never fail; they are skipped instead.

use std::fmt;

/// Result type for RHI operations
pub type Result<T> = std::result::Result<T, Error>;

/// RHI errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Backend-specific error (Vulkan, software queue worker, etc.)
    BackendError(String),

    /// Out of GPU (or host) memory
    OutOfMemory,

    /// Invalid or stale resource handle, or a resource used in a way its
    /// residency does not allow
    InvalidResource(String),

    /// Initialization failed (instance, device, swap chain surface)
    InitializationFailed(String),

    /// Invalid descriptor or argument (zero size, out-of-range index, ...)
    InvalidArgument(String),

    /// The backend or capability is not available in this build or on this hardware
    Unsupported(String),
}

impl Error {
    /// True for errors caused by the caller's input rather than the backend
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
