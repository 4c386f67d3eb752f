// Error taxonomy shared by the domain modules and the HTTP layer
//
// Unauthenticated → 401, Forbidden → 403, NotFound → 404, Validation → 400,
// everything else → 500 with the raw message.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Missing, malformed or forged credentials
    #[error("{0}")]
    Unauthenticated(String),

    /// Role or ownership mismatch
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Bad payload, duplicate unique key, business-rule violation
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        AppError::Unauthenticated(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    /// HTTP status code this error maps to
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Unauthenticated(_) => 401,
            AppError::Forbidden(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::Validation(_) => 400,
            AppError::Database(_) | AppError::Internal(_) => 500,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}

/// True when a statement failed on a UNIQUE or PRIMARY KEY constraint
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}

#[cfg(feature = "server")]
mod http {
    use super::AppError;
    use axum::extract::rejection::{JsonRejection, PathRejection};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::Json;

    impl IntoResponse for AppError {
        fn into_response(self) -> Response {
            let status = StatusCode::from_u16(self.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let msg = self.to_string();

            if self.is_server_error() {
                tracing::error!(error = %msg, "request failed");
            } else {
                tracing::debug!(status = status.as_u16(), error = %msg, "request rejected");
            }

            (status, Json(serde_json::json!({ "error": msg }))).into_response()
        }
    }

    impl From<JsonRejection> for AppError {
        fn from(rejection: JsonRejection) -> Self {
            AppError::Validation(rejection.body_text())
        }
    }

    impl From<PathRejection> for AppError {
        fn from(rejection: PathRejection) -> Self {
            AppError::Validation(rejection.body_text())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::unauthenticated("x").status_code(), 401);
        assert_eq!(AppError::forbidden("x").status_code(), 403);
        assert_eq!(AppError::not_found("x").status_code(), 404);
        assert_eq!(AppError::validation("x").status_code(), 400);
        assert_eq!(AppError::Internal("x".into()).status_code(), 500);
        assert!(AppError::Internal("x".into()).is_server_error());
    }

    #[test]
    fn test_unique_violation_detected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (k TEXT UNIQUE)", []).unwrap();
        conn.execute("INSERT INTO t (k) VALUES ('a')", []).unwrap();

        let err = conn
            .execute("INSERT INTO t (k) VALUES ('a')", [])
            .unwrap_err();
        assert!(is_unique_violation(&err));

        let err = conn.execute("INSERT INTO missing (k) VALUES (1)", []).unwrap_err();
        assert!(!is_unique_violation(&err));
    }
}
