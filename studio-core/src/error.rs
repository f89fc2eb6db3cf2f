use thiserror::Error;

use crate::gateway::GatewayError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum StudioError {
    /// Missing or invalid user input. Raised before any network call.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} is already in progress")]
    Busy(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl StudioError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StudioError::Validation(_) | StudioError::Gateway(GatewayError::Validation(_))
        )
    }
}
