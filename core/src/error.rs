use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error taxonomy shared by the stores, the pipeline and the HTTP layer.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing input.
    #[error("{0}")]
    Validation(String),

    /// Bad credentials, or no valid session.
    #[error("{0}")]
    Auth(String),

    /// Resource absent, or not owned by the caller.
    #[error("{0}")]
    NotFound(String),

    /// External API unreachable, timed out, or returned something unusable.
    #[error("upstream service error: {0}")]
    Upstream(String),

    /// Duplicate signup email.
    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short machine-readable name, used in log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Auth(_) => "auth",
            Self::NotFound(_) => "not_found",
            Self::Upstream(_) => "upstream",
            Self::Conflict(_) => "conflict",
            Self::Database(_) => "database",
            Self::PasswordHash(_) => "password_hash",
            Self::Internal(_) => "internal",
        }
    }

    /// True for failures whose details should stay in the server log.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::PasswordHash(_) | Self::Internal(_)
        )
    }
}
