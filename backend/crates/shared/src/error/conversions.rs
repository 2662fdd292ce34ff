//! Error conversions - store errors and the HTTP rendering

use super::app_error::AppError;
use super::kind::ErrorKind;

/// Kind and client-facing message for a store error.
///
/// Messages stay generic: row contents and SQL never reach the client.
#[cfg(feature = "sqlx")]
pub fn classify_sqlx(err: &sqlx::Error) -> (ErrorKind, &'static str) {
    match err {
        sqlx::Error::RowNotFound => (ErrorKind::NotFound, "Record not found"),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            (ErrorKind::ServiceUnavailable, "Store unavailable")
        }
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            // unique_violation
            Some("23505") => (ErrorKind::Conflict, "Duplicate key value"),
            // insufficient_resources / operator_intervention
            Some("53000" | "53100" | "53200" | "53300" | "57P01" | "57P02" | "57P03") => {
                (ErrorKind::ServiceUnavailable, "Store unavailable")
            }
            _ => (ErrorKind::InternalServerError, "Internal error"),
        },
        _ => (ErrorKind::InternalServerError, "Internal error"),
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let (kind, message) = classify_sqlx(&err);
        AppError::new(kind, message).with_source(err)
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::Json;
        use axum::http::StatusCode;

        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // RFC 7807 problem details
        let body = serde_json::json!({
            "type": "about:blank",
            "title": self.kind().as_str(),
            "status": self.status_code(),
            "detail": self.message(),
            "action": self.action(),
        });

        (status, Json(body)).into_response()
    }
}
