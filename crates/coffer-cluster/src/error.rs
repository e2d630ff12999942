//! Failures of the distributed plane.

use thiserror::Error;

use coffer_core::{ErrorMessage, StoreError};

/// Routing failed: no live node for the computed destination.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no route to cluster: {cluster}")]
pub struct RouteError {
    pub cluster: String,
}

impl RouteError {
    pub fn missing(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
        }
    }

    pub fn into_message(self) -> ErrorMessage {
        ErrorMessage::unavailable(format!("no route to cluster: {}", self.cluster))
    }
}

/// A command send failed, either in transport or on the remote store.
/// Carries the structured error unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("processing failed: {0}")]
pub struct ProcessingError(pub ErrorMessage);

impl ProcessingError {
    pub fn into_message(self) -> ErrorMessage {
        self.0
    }

    pub fn message(&self) -> &ErrorMessage {
        &self.0
    }
}

impl From<StoreError> for ProcessingError {
    fn from(error: StoreError) -> Self {
        ProcessingError(error.into_message())
    }
}

impl From<std::io::Error> for ProcessingError {
    fn from(error: std::io::Error) -> Self {
        ProcessingError(ErrorMessage::unavailable(format!("transport failure: {error}")))
    }
}

/// Either of the two ways the distributed plane can fail a caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    #[error(transparent)]
    MissingRoute(#[from] RouteError),
    #[error(transparent)]
    Processing(#[from] ProcessingError),
}

impl ClusterError {
    pub fn into_message(self) -> ErrorMessage {
        match self {
            ClusterError::MissingRoute(e) => e.into_message(),
            ClusterError::Processing(e) => e.into_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coffer_core::ErrorCode;

    #[test]
    fn missing_route_maps_to_unavailable() {
        let message = RouteError::missing("c1").into_message();
        assert_eq!(message.code, ErrorCode::Unavailable);
        assert!(message.message.contains("c1"));
    }

    #[test]
    fn store_errors_pass_through_unchanged() {
        let original = ErrorMessage::conflict("guard failed");
        let processing: ProcessingError = StoreError::from(original.clone()).into();
        assert_eq!(processing.into_message(), original);
    }
}
