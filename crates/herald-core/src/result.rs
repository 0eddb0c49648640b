//! Convenience result type alias for Herald.

use crate::error::AppError;

/// A specialized `Result` type for Herald operations.
pub type AppResult<T> = Result<T, AppError>;
