use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RemoteWriteFailure,
    RemoteReadFailure,
    AuthFailure,
    StorageFailure,
}

/// Failure of a single action invocation. Cloneable so it can sit in the
/// snapshot's `error` field and still be handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct ActionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ActionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn remote_write(err: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::RemoteWriteFailure, format!("{err:#}"))
    }

    pub fn remote_read(err: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::RemoteReadFailure, format!("{err:#}"))
    }

    pub fn auth(err: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::AuthFailure, format!("{err:#}"))
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::StorageFailure, format!("{err:#}"))
    }
}
