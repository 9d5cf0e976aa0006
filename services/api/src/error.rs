//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it is
//! rendered as an HTTP response.

use crate::config::ConfigError;
use attendance_core::{AttendanceError, ErrorKind, PortError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A rejected or failed attendance operation.
    #[error(transparent)]
    Attendance(#[from] AttendanceError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller did not identify itself.
    #[error("The x-user-id header is required")]
    Unauthenticated,

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// The JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Stable machine-readable identifier, e.g. `duplicate_check_in`.
    pub code: String,
    pub message: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Attendance(e) => (status_for(e), e.code()),
            ApiError::Port(e) => {
                let status = match e {
                    PortError::NotFound(_) => StatusCode::NOT_FOUND,
                    PortError::Conflict(_) => StatusCode::CONFLICT,
                    PortError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                    PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, "store_error")
            }
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Config(_)
            | ApiError::Database(_)
            | ApiError::Io(_)
            | ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

fn status_for(error: &AttendanceError) -> StatusCode {
    match error.kind() {
        ErrorKind::Validation => match error {
            AttendanceError::MalformedToken(_) | AttendanceError::NotExcusable(_) => {
                StatusCode::BAD_REQUEST
            }
            AttendanceError::NotCourseOwner { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        },
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Expired => StatusCode::GONE,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        // Internal details stay in the logs.
        let message = if status.is_server_error() {
            error!(error = %self, code, "Request failed");
            match status {
                StatusCode::SERVICE_UNAVAILABLE => {
                    "The attendance store is temporarily unavailable, please retry".to_string()
                }
                _ => "An internal error occurred".to_string(),
            }
        } else {
            self.to_string()
        };
        let body = ErrorBody {
            code: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn status(error: AttendanceError) -> StatusCode {
        ApiError::from(error).into_response().status()
    }

    #[test]
    fn core_error_kinds_map_to_http_statuses() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        assert_eq!(status(AttendanceError::MalformedToken("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(AttendanceError::IncompleteCourseData {
                course_id: "c".into(),
                missing: "name"
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(AttendanceError::DuplicateCheckIn {
                student_id: "s1".into(),
                course_id: "c".into(),
                day
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(status(AttendanceError::SessionExpired(Uuid::nil())), StatusCode::GONE);
        assert_eq!(status(AttendanceError::SessionNotFound(Uuid::nil())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(AttendanceError::Store(PortError::Unavailable("down".into()))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(AttendanceError::FatalCoordination("lost".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn body_carries_the_stable_code() {
        let response = ApiError::from(AttendanceError::SessionExpired(Uuid::nil())).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "session_expired");
        assert!(body["message"].as_str().unwrap().contains("no longer accepting"));
    }

    #[tokio::test]
    async fn server_errors_hide_internal_details() {
        let response = ApiError::Internal("pool exploded at 0xdeadbeef".into()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "internal");
        assert!(!body["message"].as_str().unwrap().contains("deadbeef"));
    }
}
