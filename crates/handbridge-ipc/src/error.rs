//! IPC-specific error types

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::ReplyStatus;

/// IPC error type
#[derive(Debug, Error)]
pub enum IpcError {
    /// Transport unavailable, reply timeout, version mismatch or send failure
    #[error("Connection failed: {reason}")]
    Connection {
        /// What went wrong
        reason: String,
    },

    /// The driver does not know the device id
    #[error("Invalid device id (driver status {status})")]
    InvalidId {
        /// Raw driver status code
        status: i16,
    },

    /// A property value had the wrong type for its key
    #[error("Invalid property type (driver status {status})")]
    InvalidType {
        /// Raw driver status code
        status: i16,
    },

    /// The requested entry does not exist
    #[error("Not found (driver status {status})")]
    NotFound {
        /// Raw driver status code
        status: i16,
    },

    /// The serial or resource is already taken
    #[error("Already in use (driver status {status})")]
    AlreadyInUse {
        /// Raw driver status code
        status: i16,
    },

    /// The driver cannot host another virtual device
    #[error("Too many devices (driver status {status})")]
    TooManyDevices {
        /// Raw driver status code
        status: i16,
    },

    /// Any other non-OK driver status
    #[error("Driver error (status {status})")]
    Driver {
        /// Raw driver status code
        status: i16,
    },

    /// Message encoding failed
    #[error("Message encoding failed: {0}")]
    Encoding(String),

    /// Message decoding failed
    #[error("Message decoding failed: {0}")]
    Decoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl IpcError {
    /// Create a connection error
    pub fn connection(reason: impl Into<String>) -> Self {
        IpcError::Connection {
            reason: reason.into(),
        }
    }

    /// Create the error reported when a modal call gets no reply in time
    pub fn timeout(after: Duration) -> Self {
        IpcError::Connection {
            reason: format!("no reply within {}ms", after.as_millis()),
        }
    }

    /// Map a non-OK driver status to its typed error. Returns `None` for
    /// [`ReplyStatus::Ok`].
    pub fn from_status(code: i16) -> Option<Self> {
        let status = code;
        match ReplyStatus::from_code(code) {
            Some(ReplyStatus::Ok) => None,
            Some(ReplyStatus::InvalidId) => Some(IpcError::InvalidId { status }),
            Some(ReplyStatus::InvalidType) => Some(IpcError::InvalidType { status }),
            Some(ReplyStatus::NotFound) => Some(IpcError::NotFound { status }),
            Some(ReplyStatus::AlreadyInUse) => Some(IpcError::AlreadyInUse { status }),
            Some(ReplyStatus::TooManyDevices) => Some(IpcError::TooManyDevices { status }),
            Some(ReplyStatus::InvalidVersion) => Some(IpcError::connection(format!(
                "driver rejected protocol version (status {status})"
            ))),
            Some(ReplyStatus::UnknownError) | None => Some(IpcError::Driver { status }),
        }
    }

    /// Raw driver status code, if this error came from a reply
    pub fn status_code(&self) -> Option<i16> {
        match self {
            IpcError::InvalidId { status }
            | IpcError::InvalidType { status }
            | IpcError::NotFound { status }
            | IpcError::AlreadyInUse { status }
            | IpcError::TooManyDevices { status }
            | IpcError::Driver { status } => Some(*status),
            _ => None,
        }
    }

    /// Check if this is a connection-level failure
    pub fn is_connection(&self) -> bool {
        matches!(self, IpcError::Connection { .. })
    }

    /// Check if retrying the same operation later might succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, IpcError::Connection { .. } | IpcError::Io(_))
    }
}

/// Specialized Result type for IPC operations
pub type IpcResult<T> = std::result::Result<T, IpcError>;
