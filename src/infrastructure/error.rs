//! Infrastructure-level errors (wraps application errors)

use thiserror::Error;

use crate::application::ApplicationError;

/// Infrastructure errors wrap application errors and are the boundary the CLI reports from.
#[derive(Error, Debug)]
pub enum InfraError {
    #[error("{0}")]
    Application(#[from] ApplicationError),
}

/// Result type for infrastructure layer operations.
pub type InfraResult<T> = Result<T, InfraError>;
