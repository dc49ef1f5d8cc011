//! Pipeline error types

use std::io;

use handbridge_ipc::IpcError;
use thiserror::Error;

use crate::types::Hand;

/// Pipeline error type
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Registering a hand's virtual device failed; retried on a later frame
    #[error("Registration of {hand} device failed: {source}")]
    Registration {
        /// Hand whose device was being registered
        hand: Hand,
        /// Underlying IPC failure
        #[source]
        source: IpcError,
    },

    /// A per-frame pose or state update failed
    #[error("Update of {hand} device failed: {source}")]
    Update {
        /// Hand whose update failed
        hand: Hand,
        /// Underlying IPC failure
        #[source]
        source: IpcError,
    },

    /// Configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be parsed
    #[error("Configuration parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// IO error while reading configuration
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl PipelineError {
    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        PipelineError::InvalidConfig(reason.into())
    }

    /// The IPC failure behind this error, if any
    pub fn ipc_error(&self) -> Option<&IpcError> {
        match self {
            PipelineError::Registration { source, .. } | PipelineError::Update { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Check if the failure happened during one-shot registration
    pub fn is_registration(&self) -> bool {
        matches!(self, PipelineError::Registration { .. })
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
