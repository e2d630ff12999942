//! Error taxonomy shared across the whole process.
//!
//! Every failure that can cross a node boundary is reduced to an
//! [`ErrorMessage`] with a stable numeric code. Layers wrap it in their own
//! error types but never rewrite it: the message a store produced on one node
//! is the message the boundary layer sees on the originating node.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error codes, shared by every node in the ensemble.
///
/// The values ride the wire, so they must never change meaning between
/// releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    /// Malformed input: unknown operator name, invalid JSON, bad predicate.
    BadRequest = 400,
    /// Key or bucket absent (or a guarded read whose condition failed).
    NotFound = 404,
    /// An update function exceeded its deadline.
    Timeout = 408,
    /// A conditional put's guard was not satisfied.
    Conflict = 409,
    /// Wrapped unexpected failure.
    Internal = 500,
    /// No reachable node or cluster.
    Unavailable = 503,
}

impl ErrorCode {
    /// Decodes a wire code. Unknown codes collapse to `Internal` rather than
    /// failing the whole reply.
    pub fn from_wire(code: u16) -> Self {
        match code {
            400 => ErrorCode::BadRequest,
            404 => ErrorCode::NotFound,
            408 => ErrorCode::Timeout,
            409 => ErrorCode::Conflict,
            503 => ErrorCode::Unavailable,
            _ => ErrorCode::Internal,
        }
    }

    pub fn as_wire(self) -> u16 {
        self as u16
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::BadRequest => "bad request",
            ErrorCode::NotFound => "not found",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Conflict => "conflict",
            ErrorCode::Internal => "internal",
            ErrorCode::Unavailable => "unavailable",
        };
        write!(f, "{name}")
    }
}

/// The one error structure that crosses node boundaries unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorMessage {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl std::fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.code.as_wire(), self.message)
    }
}

/// Failure raised by store-side execution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("store operation failed: {0}")]
pub struct StoreError(pub ErrorMessage);

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        self.0.code
    }

    pub fn into_message(self) -> ErrorMessage {
        self.0
    }
}

impl From<ErrorMessage> for StoreError {
    fn from(message: ErrorMessage) -> Self {
        StoreError(message)
    }
}
