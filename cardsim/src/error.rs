//! Error types for the I/O boundaries of the simulator
//!
//! Card protocol outcomes are never errors; they are reported through
//! [`crate::psc::CommandResult`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Errors from the on-disk snapshot store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No snapshot for session {0}")]
    NotFound(Uuid),

    #[error("Snapshot is inconsistent: {0}")]
    Invalid(String),
}

/// Errors loading or saving the simulator configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the multi-session manager
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("A card named '{0}' is already open")]
    DuplicateName(String),

    #[error("Unknown session {0}")]
    UnknownSession(Uuid),

    #[error("Card file could not be loaded: {0}")]
    InvalidDump(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors talking to a card reader
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Reader not connected")]
    NotConnected,

    #[error("Response too short: {0} bytes")]
    ShortResponse(usize),

    #[error("Card answered {0:04X}")]
    Status(u16),

    #[error("Address 0x{0:03X} cannot be sent to this card")]
    AddressOutOfRange(u16),

    #[error("Reader error: {0}")]
    Reader(String),
}
