//! Service error types

use thiserror::Error;

/// Errors returned by [`crate::service::CatService`]
#[derive(Error, Debug)]
pub enum CatServiceError {
    /// A filtered lookup matched nothing. The message is shown to users as-is.
    #[error("{0}")]
    NotFound(String),

    #[error("mapper error: {0}")]
    Mapper(#[from] anyhow::Error),
}

impl CatServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CatServiceError::NotFound(_))
    }
}

pub type ServiceResult<T> = std::result::Result<T, CatServiceError>;
