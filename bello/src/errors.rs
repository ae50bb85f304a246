use crate::api::models::responses::ApiResponse;
use crate::db::errors::DbError;
use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided, or the token was rejected
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Caller is authenticated but lacks admin privileges
    #[error("Forbidden: {}", .message.as_deref().unwrap_or("admin privileges required"))]
    Forbidden { message: Option<String> },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// An operation reported failure without raising an error, e.g. a delete that removed nothing
    #[error("{operation} had no effect")]
    OperationFailed { operation: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::OperationFailed { .. } | Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } | DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::Forbidden { message } => message.clone().unwrap_or_else(|| "Admin privileges required".to_string()),
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, .. } => format!("{resource} not found"),
            Error::OperationFailed { operation } => format!("Failed to {operation}"),
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { .. } => "Resource already exists".to_string(),
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Internal server error".to_string(),
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Every failure is logged here, so handlers never log-and-return themselves
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) | Error::OperationFailed { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Unauthenticated { .. } | Error::Forbidden { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        (status, Json(ApiResponse::<()>::error(self.user_message()))).into_response()
    }
}

/// Rejection for malformed path parameters such as a non-numeric user id
impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        tracing::trace!("Path rejection: {}", rejection.body_text());
        Error::BadRequest {
            message: "Invalid user id".to_string(),
        }
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        tracing::trace!("Query rejection: {}", rejection.body_text());
        Error::BadRequest {
            message: "Invalid query parameters".to_string(),
        }
    }
}

/// Rejection for request bodies that are not valid JSON or miss required fields
impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        tracing::trace!("JSON rejection: {}", rejection.body_text());
        Error::BadRequest {
            message: "Invalid request body".to_string(),
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_hides_id() {
        let err = Error::NotFound {
            resource: "User".to_string(),
            id: "99".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.user_message(), "User not found");
        // Logs keep the id
        assert_eq!(err.to_string(), "User with ID 99 not found");
    }

    #[test]
    fn test_internal_details_stay_out_of_user_message() {
        let err = Error::Other(anyhow::anyhow!("connection refused (os error 111)"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.user_message(), "Internal server error");

        let err = Error::Database(DbError::Other(anyhow::anyhow!("relation \"users\" does not exist")));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.user_message().contains("relation"));
    }

    #[test]
    fn test_operation_failed_is_a_server_error() {
        let err = Error::OperationFailed {
            operation: "delete user".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.user_message(), "Failed to delete user");
    }

    #[test]
    fn test_unique_violation_message_is_generic() {
        for constraint in ["users_email_unique", "users_username_unique", "user_profiles_pkey"] {
            let err = Error::Database(DbError::UniqueViolation {
                constraint: Some(constraint.to_string()),
                table: Some("users".to_string()),
                message: "duplicate key value".to_string(),
            });
            assert_eq!(err.status_code(), StatusCode::CONFLICT);
            assert_eq!(err.user_message(), "Resource already exists");
        }
    }

    #[tokio::test]
    async fn test_malformed_json_body_uses_error_envelope() {
        use axum::extract::FromRequest;

        let request = axum::http::Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap();
        let rejection = Json::<serde_json::Value>::from_request(request, &()).await.unwrap_err();

        let response = Error::from(rejection).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({"status": "error", "message": "Invalid request body"}));
    }

    #[tokio::test]
    async fn test_response_uses_error_envelope() {
        let response = Error::Forbidden { message: None }.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({"status": "error", "message": "Admin privileges required"}));
    }
}
