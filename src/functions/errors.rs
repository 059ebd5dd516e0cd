//! # Function Errors

use thiserror::Error;

/// Result type for function operations
pub type FunctionResult<T> = Result<T, FunctionError>;

/// Function errors
///
/// Build failures are stored on the descriptor and handed to every caller
/// that joined the same build, so the type must stay `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FunctionError {
    #[error("Function not found: {0}")]
    NotFound(String),

    #[error("Function already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid function name: {0}")]
    InvalidName(String),

    #[error("Build error: {0}")]
    Build(String),

    #[error(
        "Function requires runtime version {required} or above, but {installed} is installed"
    )]
    UnsupportedRuntime { required: String, installed: String },

    #[error("Build produced no result for function {0}")]
    MissingBuildResult(String),

    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    #[error("Invalid route expression {expression}: {reason}")]
    InvalidRoute { expression: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FunctionError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            FunctionError::NotFound(_) => 404,
            FunctionError::AlreadyExists(_) => 409,
            FunctionError::InvalidName(_) => 400,
            FunctionError::Build(_) => 500,
            FunctionError::UnsupportedRuntime { .. } => 500,
            FunctionError::MissingBuildResult(_) => 500,
            FunctionError::InvalidCron(_) => 400,
            FunctionError::InvalidRoute { .. } => 400,
            FunctionError::Config(_) => 500,
            FunctionError::Internal(_) => 500,
        }
    }
}
