use crate::process::ProcessError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Project '{0}' not found")]
    WorkspaceNotFound(String),

    #[error("Tool '{0}' not found")]
    ToolNotFound(String),
}

impl AppError {
    /// Parameter problems are reported to the caller as protocol errors
    /// instead of being folded into a tool result.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, AppError::BadRequest(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
