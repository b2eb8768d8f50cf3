use crate::{model::ModelError, processor::ProcessingError};

/// Errors returned by [`RequestManager`](super::RequestManager).
///
/// `Clone` because one failure is delivered to every caller joined to the same computation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    /// The group is absent from the current model. Not retried.
    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Preserves the concrete `ModelError`, including cold-start failures.
    #[error("Model load failed: {0}")]
    LoadFailed(#[from] ModelError),

    #[error("Processing failed: {0}")]
    ProcessingFailed(#[from] ProcessingError),

    /// Writing to the output sink failed.
    #[error("Output failed: {0}")]
    Output(String),
}

impl ManagerError {
    /// Errors caused by the request itself rather than by the service.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::UnknownGroup(_) | Self::InvalidRequest(_))
    }

    #[must_use]
    pub fn is_cold_start(&self) -> bool {
        matches!(self, Self::LoadFailed(ModelError::ColdStart(_)))
    }
}
