use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bookhound_core::error::CoreError;
use bookhound_pipeline::PipelineError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`PipelineError`] for domain errors and adds
/// HTTP-specific variants. Implements [`IntoResponse`] to produce
/// consistent `{"error", "code"}` JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An orchestrator error.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

type ErrorParts = (StatusCode, &'static str, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Pipeline(err) => classify_pipeline_error(err),
            AppError::Database(err) => classify_sqlx_error(err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> ErrorParts {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_core_error(err: &CoreError) -> ErrorParts {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

/// Map an orchestrator error onto the documented status codes.
///
/// A request that cannot be cancelled answers 404, the same as an unknown
/// one; a request that cannot be retried answers 400.
fn classify_pipeline_error(err: &PipelineError) -> ErrorParts {
    match err {
        PipelineError::NotFound(_) | PipelineError::NoSeedingRecord(_) => {
            (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
        }
        PipelineError::NotCancellable { .. } => {
            (StatusCode::NOT_FOUND, "NOT_CANCELLABLE", err.to_string())
        }
        PipelineError::NotRetryable { .. } => {
            (StatusCode::BAD_REQUEST, "NOT_RETRYABLE", err.to_string())
        }
        PipelineError::SeedingIncomplete(_) => {
            (StatusCode::CONFLICT, "SEEDING_INCOMPLETE", err.to_string())
        }
        PipelineError::AlreadyRemoved(_) => (StatusCode::CONFLICT, "CONFLICT", err.to_string()),
        PipelineError::Daemon(msg) => {
            tracing::warn!(error = %msg, "Download client error");
            (StatusCode::BAD_GATEWAY, "DOWNLOAD_CLIENT_ERROR", err.to_string())
        }
        PipelineError::ShuttingDown => (
            StatusCode::SERVICE_UNAVAILABLE,
            "SHUTTING_DOWN",
            err.to_string(),
        ),
        PipelineError::Core(core) => classify_core_error(core),
        PipelineError::Database(db) => classify_sqlx_error(db),
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`) map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> ErrorParts {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            internal()
        }
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookhound_db::models::status::DownloadStatus;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn pipeline_errors_map_to_documented_codes() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(status_of(PipelineError::NotFound(id).into()), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(
                PipelineError::NotCancellable {
                    request_id: id,
                    status: DownloadStatus::Completed
                }
                .into()
            ),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(
                PipelineError::NotRetryable {
                    request_id: id,
                    status: DownloadStatus::Downloading
                }
                .into()
            ),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(PipelineError::SeedingIncomplete(id).into()), StatusCode::CONFLICT);
        assert_eq!(status_of(PipelineError::AlreadyRemoved(id).into()), StatusCode::CONFLICT);
        assert_eq!(status_of(PipelineError::ShuttingDown.into()), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn wrapped_validation_is_bad_request() {
        let err = PipelineError::Core(CoreError::Validation("title is required".into()));
        assert_eq!(status_of(err.into()), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn internal_errors_are_sanitized() {
        assert_eq!(
            status_of(AppError::InternalError("secret detail".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_of(sqlx::Error::PoolTimedOut.into()), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
