//! Display Manager Error Types
//!
//! Every fallible operation of the screen core returns [`DmError`]. The
//! variants mirror the result codes the surrounding IPC layer reports to
//! its callers, so [`DmError::code`] is stable and must not be renumbered.

use thiserror::Error;

use crate::client::ClientError;
use crate::screen::ScreenId;

/// Result type for screen core operations
pub type Result<T> = std::result::Result<T, DmError>;

/// Screen core error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DmError {
    /// A required session or listener argument was absent
    #[error("Required argument is null")]
    NullPointer,

    /// Malformed or out-of-range request shape
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    /// Semantically invalid request (non-main source mode, overflow)
    #[error("Illegal parameter: {0}")]
    IllegalParam(String),

    /// Operation not legal in the current topology, or a required
    /// collaborator is unavailable
    #[error("Invalid calling: {0}")]
    InvalidCalling(String),

    /// Collaborator call failed at the transport level
    #[error("IPC failed: {0}")]
    IpcFailed(String),

    /// Composition/render service rejected a request
    #[error("Render service failed: {0}")]
    RenderServiceFailed(String),

    /// Screen session does not exist
    #[error("Screen not found: {0}")]
    NotFound(ScreenId),
}

impl DmError {
    /// Stable numeric result code (0 is reserved for success)
    pub fn code(&self) -> i32 {
        match self {
            DmError::NullPointer => 1,
            DmError::InvalidParam(_) => 2,
            DmError::IllegalParam(_) => 3,
            DmError::InvalidCalling(_) => 4,
            DmError::IpcFailed(_) => 5,
            DmError::RenderServiceFailed(_) => 6,
            DmError::NotFound(_) => 7,
        }
    }
}

impl From<ClientError> for DmError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Transport(msg) => DmError::IpcFailed(msg),
            ClientError::Rejected(msg) => DmError::IpcFailed(msg),
            ClientError::Render(msg) => DmError::RenderServiceFailed(msg),
        }
    }
}
