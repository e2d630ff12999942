//! The service layer: user operations over router + commands.
//!
//! Services validate operator names early (a bad request should fail before
//! any network hop), construct commands, fan them out, and merge partial
//! results. Whatever error a node produced crosses back unchanged.

mod query;
mod update;

pub use query::QueryService;
pub use update::UpdateService;

use thiserror::Error;

use coffer_cluster::{ClusterError, ProcessingError, RouteError};
use coffer_core::{ErrorMessage, StoreError};

/// Boundary-facing failure. Wraps the structured error unchanged so the
/// boundary layer can map its code to a status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ServiceError(pub ErrorMessage);

impl ServiceError {
    pub fn message(&self) -> &ErrorMessage {
        &self.0
    }
}

impl From<ClusterError> for ServiceError {
    fn from(error: ClusterError) -> Self {
        ServiceError(error.into_message())
    }
}

impl From<RouteError> for ServiceError {
    fn from(error: RouteError) -> Self {
        ServiceError(error.into_message())
    }
}

impl From<ProcessingError> for ServiceError {
    fn from(error: ProcessingError) -> Self {
        ServiceError(error.into_message())
    }
}

impl From<StoreError> for ServiceError {
    fn from(error: StoreError) -> Self {
        ServiceError(error.into_message())
    }
}
