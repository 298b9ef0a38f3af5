//! Error-handling utilities, plus the error taxonomy used at the
//! service/RPC boundary.
//!
//! Internal plumbing uses `anyhow::Result` (see [`crate::Result`]) the way
//! the rest of this crate does. [`ServiceError`] is the narrower, typed
//! vocabulary the front end needs, since it has to pick an HTTP status and a
//! JSON-RPC error shape for each category.

use anyhow::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error as ThisError;

/// The shape a bare (non-JSON-RPC) error response carries.
#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

/// Display an error, plus all the underlying "causes" (ie, wrapped errors), plus a
/// backtrace.
pub(crate) fn display_causes_and_backtrace(err: &Error) {
    eprintln!("Error: {}", err);
    for cause in err.chain().skip(1) {
        eprintln!("  caused by: {}", cause);
    }
    eprintln!("{}", err.backtrace());
}

/// The six error categories a service call can terminate with.
#[derive(Debug, ThisError)]
pub enum ServiceError {
    /// Invalid, missing, or expired credentials.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Malformed JSON, a missing required field, or a malformed value.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Well-formed JSON that violates a semantic invariant (cross-region
    /// waypoint, excessive waypoint count, unsupported location, empty
    /// required field).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested method has no registered handler.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// The HTTP verb used is not supported on this endpoint.
    #[error("method not allowed")]
    BadMethod,

    /// Any downstream (result store, queue, routing engine) failure.
    #[error("server error: {0}")]
    ServerError(String),
}

impl ServiceError {
    /// Map this error to the HTTP status the front end should respond with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotAuthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ServiceError::BadMethod => StatusCode::METHOD_NOT_ALLOWED,
            ServiceError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn not_implemented(method: impl Into<String>) -> Self {
        ServiceError::NotImplemented(method.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        ServiceError::InvalidArgument(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ServiceError::BadRequest(message.into())
    }

    pub fn not_authorized(message: impl Into<String>) -> Self {
        ServiceError::NotAuthorized(message.into())
    }
}

/// Bare status-code responses for routes that never reach a JSON-RPC
/// dispatch (e.g. an unsupported HTTP verb on `/`), per §7's
/// `bad_method -> 405` mapping.
impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(ErrorBody { message: "unspecified error".to_owned() })).into_response()
    }
}

/// Any `anyhow::Error` that escapes a service handler is an unclassified
/// downstream failure: log it in full, but never surface more than "server
/// error" to the client.
impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("unclassified service error: {:?}", err);
        ServiceError::ServerError(err.to_string())
    }
}

/// `unsupported_location` is the one geocoder failure the taxonomy calls
/// out by name (§4.4, §7): it violates a semantic invariant, not a downstream
/// I/O failure, so it maps to `invalid_argument` rather than `server_error`.
impl From<crate::geocoder::GeocoderError> for ServiceError {
    fn from(err: crate::geocoder::GeocoderError) -> Self {
        match err {
            crate::geocoder::GeocoderError::UnsupportedLocation => {
                ServiceError::invalid_argument("unsupported location")
            }
            crate::geocoder::GeocoderError::Backend(err) => ServiceError::from(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            ServiceError::NotAuthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::invalid_argument("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::not_implemented("x").status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            ServiceError::BadMethod.status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            ServiceError::ServerError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
