use thiserror::Error;

#[derive(Error, Debug)]
pub enum TargetError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Permission denied: {actor} may not manage {scope}")]
    PermissionDenied { actor: String, scope: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TargetError {
    pub fn validation(msg: impl Into<String>) -> Self {
        TargetError::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        TargetError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// True for errors caused by the request itself rather than by storage.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TargetError::Validation(_)
                | TargetError::NotFound { .. }
                | TargetError::PermissionDenied { .. }
        )
    }

    /// Stable short name used by callers that map errors onto a wire protocol.
    pub fn kind(&self) -> &'static str {
        match self {
            TargetError::Validation(_) => "validation",
            TargetError::NotFound { .. } => "not_found",
            TargetError::PermissionDenied { .. } => "permission_denied",
            TargetError::Database(_) | TargetError::Serialization(_) | TargetError::Other(_) => {
                "internal"
            }
        }
    }
}

pub type TargetResult<T> = Result<T, TargetError>;
