use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::services::cache::CacheError;
use crate::services::queue::QueueError;
use crate::services::storage::StorageError;
use crate::services::token::TokenError;

/// Crate-level error. Each variant maps to one class of the error
/// taxonomy: validation 400, auth 401, forbidden 403, not-found 404,
/// quota 429, infrastructure 503, everything else a generic 500.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Monthly upload limit exceeded.")]
    QuotaExceeded { current_usage: i64, limit: i64, subscription_tier: String },

    #[error("Processing queue is full. Please try again later.")]
    QueueFull,

    #[error("{0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::QueueFull | AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the caller. Internal detail never leaks.
    fn client_message(&self) -> String {
        match self {
            AppError::Internal(_) => "Something went wrong.".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            AppError::Auth(msg) | AppError::Forbidden(msg) => {
                tracing::warn!(security = true, error = %msg, "auth failure");
            }
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "unhandled internal error");
            }
            AppError::Unavailable(detail) => {
                tracing::error!(error = %detail, "downstream unavailable");
            }
            other => {
                tracing::warn!(status = %status, error = %other, "request rejected");
            }
        }

        let mut body = json!({
            "status": "error",
            "message": self.client_message(),
        });

        if let AppError::QuotaExceeded { current_usage, limit, subscription_tier } = &self {
            body["data"] = json!({
                "currentUsage": current_usage,
                "limit": limit,
                "subscriptionStatus": subscription_tier,
            });
        }

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".into()),
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                AppError::Validation("Duplicate field value. Please use another value.".into())
            }
            other => AppError::Unavailable(format!("database error: {other}")),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::Unavailable(format!("cache error: {e}"))
    }
}

impl From<QueueError> for AppError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Full { .. } => AppError::QueueFull,
            other => AppError::Unavailable(format!("queue error: {other}")),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        AppError::Unavailable(format!("storage error: {e}"))
    }
}

impl From<CacheError> for AppError {
    fn from(e: CacheError) -> Self {
        AppError::Unavailable(format!("cache error: {e}"))
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Encode(inner) => AppError::Internal(format!("token signing failed: {inner}")),
            other => AppError::Auth(other.to_string()),
        }
    }
}

impl From<garde::Report> for AppError {
    fn from(report: garde::Report) -> Self {
        let detail = report
            .iter()
            .map(|(path, err)| format!("{path}: {err}"))
            .collect::<Vec<_>>()
            .join(", ");
        AppError::Validation(format!("Validation error: {detail}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        assert_eq!(AppError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Auth("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::QuotaExceeded { current_usage: 10, limit: 10, subscription_tier: "free".into() }
                .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(AppError::QueueFull.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn internal_detail_never_reaches_client() {
        let err = AppError::Internal("secret connection string".into());
        assert_eq!(err.client_message(), "Something went wrong.");
    }

    #[test]
    fn row_not_found_becomes_404() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
