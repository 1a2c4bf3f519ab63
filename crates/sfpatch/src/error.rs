use thiserror::Error;

use crate::lifecycle::Phase;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Address range {address:#x}..+{len} is not writable")]
    AddressNotWritable { address: usize, len: usize },

    #[error("Failed to write process memory at address {address:#x}: {message}")]
    WriteRejected { address: usize, message: String },

    #[error("Partial write at address {address:#x}: expected {expected} bytes, wrote {written}")]
    PartialWrite {
        address: usize,
        expected: usize,
        written: usize,
    },

    #[error("Failed to read process memory at address {address:#x}: {message}")]
    ReadFailed { address: usize, message: String },

    #[error("Lifecycle is already attached")]
    AlreadyAttached,

    #[error("Messaging interface unavailable")]
    MessagingUnavailable,

    #[error("Listener registration rejected for sender {sender:?}")]
    RegistrationRejected { sender: String },

    #[error("{phase} handler panicked")]
    HandlerPanicked { phase: Phase },

    #[error("Failed to spawn delay-load worker: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Operation not supported on this platform: {0}")]
    Unsupported(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error came from a rejected or incomplete memory write
    pub fn is_write_failure(&self) -> bool {
        matches!(
            self,
            Error::AddressNotWritable { .. } | Error::WriteRejected { .. } | Error::PartialWrite { .. }
        )
    }

    /// Check if this error means the postload listener never got registered
    pub fn is_registration_failure(&self) -> bool {
        matches!(
            self,
            Error::MessagingUnavailable | Error::RegistrationRejected { .. }
        )
    }
}
