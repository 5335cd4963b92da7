//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::DocumentRecord;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Read access to documents plus the single metadata field the PDF pipeline owns.
#[async_trait]
pub trait DocumentsRepo: Send + Sync {
    async fn find_document(&self, id: Uuid) -> Result<Option<DocumentRecord>, RepoError>;

    async fn find_document_by_slug(&self, slug: &str)
    -> Result<Option<DocumentRecord>, RepoError>;

    /// Store the artifact name unless one is already present.
    ///
    /// Returns `true` when this call set the value.
    async fn store_cached_artifact_name(&self, id: Uuid, name: &str) -> Result<bool, RepoError>;

    /// Forget the memoized artifact name so the next render derives it again.
    async fn clear_cached_artifact_name(&self, id: Uuid) -> Result<(), RepoError>;

    async fn health_check(&self) -> Result<(), RepoError>;
}
