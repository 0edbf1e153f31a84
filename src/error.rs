//! Error taxonomy shared by the query, counting and mutation paths.

/// Failures surfaced to API callers. None of them are retried internally.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{0}")]
    Validation(String),

    #[error("Title is mandatory and cannot be empty.")]
    MissingTitle,

    #[error("No valid fields to update")]
    NoValidFields,

    #[error("Video not found")]
    NotFound,

    #[error("Invalid video ID: {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid last_id format: {0:?}")]
    InvalidCursor(String),

    #[error("aggregation failed: {0:#}")]
    AggregationFailure(anyhow::Error),

    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl CatalogError {
    pub fn validation(message: impl Into<String>) -> Self {
        CatalogError::Validation(message.into())
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
