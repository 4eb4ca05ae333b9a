/// Result type alias for curation operations.
pub type Result<T> = std::result::Result<T, ResourceError>;

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("All discovery backends failed: {0}")]
    DiscoveryFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Stored payload is malformed: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
