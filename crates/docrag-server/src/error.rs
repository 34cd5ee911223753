use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use docrag_core::Error;

/// HTTP-facing wrapper that maps the core error taxonomy onto status
/// codes. Transient failures surface as 503 only after the core has
/// exhausted its retry budget.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "Validation"),
            Error::NotFound { .. } => (StatusCode::NOT_FOUND, "NotFound"),
            Error::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
            Error::UnsupportedMedia(_) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UnsupportedMedia"),
            Error::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "PayloadTooLarge"),
            Error::Transient(_) => (StatusCode::SERVICE_UNAVAILABLE, "Unavailable"),
            Error::Permanent(_) | Error::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal")
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::warn!(error = %self.0, "request rejected");
        }

        let body = Json(ErrorResponse {
            error: kind,
            message: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: Error) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn taxonomy_maps_to_expected_status_codes() {
        assert_eq!(status_of(Error::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(Error::not_found("workspace", "w")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(Error::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(Error::UnsupportedMedia("image/png".into())),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            status_of(Error::PayloadTooLarge { size: 10, max: 5 }),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            status_of(Error::Transient("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(Error::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
