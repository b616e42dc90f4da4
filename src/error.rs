//! Crate-wide error taxonomy.
//!
//! Every variant here corresponds to one row of the error taxonomy: callers
//! never match on a string, they match on the variant. HTTP status mapping
//! lives in the `IntoResponse` impl below so the web layer never needs its
//! own parallel error type.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The crate's error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller-supplied input failed validation (400).
    #[error("{0}")]
    Validation(String),

    /// The requested resource does not exist (404).
    #[error("{0}")]
    NotFound(String),

    /// `schedule_type` + `schedule_config` do not describe a valid
    /// recurrence rule (400).
    #[error("invalid schedule configuration: {0}")]
    ScheduleConfigInvalid(String),

    /// The remote scraping service responded with a non-2xx status that
    /// isn't covered by a more specific variant below.
    #[error("remote service error: {0}")]
    RemoteError(String),

    /// The remote service responded 408.
    #[error("remote service timed out: {0}")]
    RemoteTimeout(String),

    /// The remote service responded 429.
    #[error("remote service rate limited the request: {0}")]
    RemoteRateLimited(String),

    /// The remote service responded 5xx.
    #[error("remote service unavailable: {0}")]
    RemoteUnavailable(String),

    /// The Runner's own hard timeout elapsed before the remote responded.
    #[error("local timeout waiting for remote service: {0}")]
    LocalTimeout(String),

    /// The crawl/batch poll budget (120 attempts) was exhausted.
    #[error("polling exceeded the allotted budget: {0}")]
    PollTimeout(String),

    /// A Store operation failed (I/O, constraint violation, pool exhaustion).
    #[error("store error: {0}")]
    StoreError(String),

    /// Synthesized for orphan `running` rows found at startup.
    #[error("interrupted by restart")]
    InterruptedByRestart,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::ScheduleConfigInvalid(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::RemoteError(_)
            | Error::RemoteTimeout(_)
            | Error::RemoteRateLimited(_)
            | Error::RemoteUnavailable(_)
            | Error::LocalTimeout(_)
            | Error::PollTimeout(_)
            | Error::StoreError(_)
            | Error::InterruptedByRestart => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorEnvelope {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::StoreError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(format!("invalid JSON: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_400() {
        assert_eq!(
            Error::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(Error::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn remote_errors_map_to_500() {
        assert_eq!(
            Error::RemoteTimeout("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
