//! Application error type and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("not found")]
    NotFound,

    /// The student already holds a lesson at that slot in that week.
    #[error("duplicate_slot")]
    DuplicateSlot,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound,
            other => AppError::Internal(anyhow::anyhow!(other)),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl AppError {
    /// Translate a failed lesson write, turning a hit on the slot unique
    /// index into `DuplicateSlot`.
    pub fn from_lesson_write(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AppError::DuplicateSlot,
            _ => AppError::from(err),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_)  => StatusCode::BAD_REQUEST,
            AppError::NotFound       => StatusCode::NOT_FOUND,
            AppError::DuplicateSlot  => StatusCode::CONFLICT,
            AppError::Internal(_)    => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(err) => {
                tracing::error!(error = ?err, "Request failed");
                "server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_slot_maps_to_conflict_status() {
        let err = AppError::DuplicateSlot;
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "duplicate_slot");
    }

    #[test]
    fn missing_row_becomes_not_found() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::NotFound));
        assert_eq!(err.to_string(), "not found");
    }
}
