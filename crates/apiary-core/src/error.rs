//! Error taxonomy shared by the codec, the store, and the orchestrator.

use std::path::PathBuf;

use crate::models::{Kind, RequestId};
use crate::openapi::SpecError;

/// Every failure a store, codec, or orchestrator operation can report.
///
/// Variants carry the request id and kind where one is known, so callers
/// can render a message without inspecting internals.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("request {0} not found")]
    NotFound(RequestId),

    #[error("unknown request kind '{0}'")]
    UnknownKind(Kind),

    #[error("unsupported document version {0}")]
    UnsupportedVersion(i64),

    #[error("inconsistent document: {0}")]
    Inconsistent(String),

    #[error("request {id} of kind {kind} cannot be performed")]
    NotExecutable { id: RequestId, kind: Kind },

    #[error("request {id} has kind {expected}, got payload of kind {actual}")]
    KindMismatch {
        id: RequestId,
        expected: Kind,
        actual: Kind,
    },

    #[error("invalid response for request {id}: {reason}")]
    InvalidResponse { id: RequestId, reason: String },

    /// The executor failed; its error is passed through untouched.
    #[error("perform {kind} request {id}")]
    Perform {
        id: RequestId,
        kind: Kind,
        #[source]
        source: anyhow::Error,
    },

    #[error("API description of source {id} is unusable")]
    Spec {
        id: RequestId,
        #[source]
        source: SpecError,
    },

    #[error("source {id} describes no {method} {path} endpoint")]
    UnknownEndpoint {
        id: RequestId,
        method: String,
        path: String,
    },

    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("failed to {action} {}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::Inconsistent(message.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
