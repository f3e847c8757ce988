use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::anthropometry::repo_types::Method;

/// Failures reported by repository adapters (postgres or in-memory).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("record not found")]
    NotFound,
    #[error("unique constraint violated: {0}")]
    Duplicate(String),
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepoError::Duplicate(db.constraint().unwrap_or("unique").to_string())
            }
            _ => RepoError::Database(e),
        }
    }
}

/// Every failure the service can surface to a caller.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid number: {0}")]
    InvalidNumber(String),
    #[error("{field} out of range: {reason}")]
    OutOfRange { field: &'static str, reason: String },
    #[error("missing required fields: {}", .0.join(", "))]
    MissingRequiredField(Vec<&'static str>),
    #[error("{method} is missing measurements: {}", .missing.join(", "))]
    MissingInput {
        method: Method,
        missing: Vec<&'static str>,
    },
    #[error("{0}")]
    InvalidSex(String),
    #[error("field 'sex' is required for the calculation")]
    MissingSex,
    #[error("could not determine an anthropometric method for this evaluation")]
    UnresolvedMethod,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("access denied")]
    Forbidden,
    #[error("conflict: {0}")]
    Duplicate(String),
    #[error("insufficient data to calculate {calculation}: {}", .missing.join(", "))]
    InsufficientData {
        calculation: &'static str,
        missing: Vec<&'static str>,
    },
    #[error("no growth reference available for {0}")]
    GrowthReferenceUnavailable(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl AppError {
    pub fn out_of_range(field: &'static str, reason: impl Into<String>) -> Self {
        AppError::OutOfRange {
            field,
            reason: reason.into(),
        }
    }

    /// Failures caused by the submitted measurements rather than by storage,
    /// configuration or access.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            AppError::InvalidNumber(_)
                | AppError::OutOfRange { .. }
                | AppError::MissingRequiredField(_)
                | AppError::MissingInput { .. }
                | AppError::InvalidSex(_)
                | AppError::MissingSex
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidNumber(_)
            | AppError::OutOfRange { .. }
            | AppError::MissingRequiredField(_)
            | AppError::MissingInput { .. }
            | AppError::InvalidSex(_)
            | AppError::MissingSex
            | AppError::UnresolvedMethod
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Duplicate(_) => StatusCode::CONFLICT,
            AppError::InsufficientData { .. } | AppError::GrowthReferenceUnavailable(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => AppError::NotFound("record"),
            RepoError::Duplicate(constraint) => AppError::Duplicate(constraint),
            other => AppError::Persistence(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_are_listed_in_message() {
        let err = AppError::MissingRequiredField(vec!["height", "age"]);
        assert_eq!(err.to_string(), "missing required fields: height, age");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn only_measurement_problems_count_as_input_errors() {
        assert!(AppError::MissingSex.is_input_error());
        assert!(AppError::out_of_range("body_fat_pct", "x").is_input_error());
        assert!(!AppError::Persistence("timeout".into()).is_input_error());
        assert!(!AppError::NotFound("record").is_input_error());
        assert!(!AppError::GrowthReferenceUnavailable("BAZ".into()).is_input_error());
    }

    #[test]
    fn missing_input_names_method_and_sites() {
        let err = AppError::MissingInput {
            method: Method::Faulkner,
            missing: vec!["triceps", "abdominal"],
        };
        assert_eq!(
            err.to_string(),
            "FAULKNER is missing measurements: triceps, abdominal"
        );
    }

    #[test]
    fn repo_errors_map_to_http_semantics() {
        let dup: AppError = RepoError::Duplicate("uq_result".into()).into();
        assert_eq!(dup.status(), StatusCode::CONFLICT);
        let gone: AppError = RepoError::NotFound.into();
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);
        let down: AppError = RepoError::Unavailable("pool closed".into()).into();
        assert_eq!(down.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
