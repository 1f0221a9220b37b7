use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use stackres_core::error::StackError;

// ---------------------------------------------------------------------------
// Internal sentinels for statuses StackError does not carry
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP 400 through the `anyhow::Error` chain for
/// request problems found before any core call (unparseable bodies).
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

/// Carries an explicit HTTP 503, used when the signal queue is full.
#[derive(Debug)]
struct UnavailableError(String);

impl std::fmt::Display for UnavailableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UnavailableError {}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self(UnavailableError(msg.into()).into())
    }

    pub fn join(err: tokio::task::JoinError) -> Self {
        Self(anyhow::anyhow!("task join error: {err}"))
    }
}

pub fn status_for(err: &StackError) -> StatusCode {
    match err {
        StackError::NotInitialized => StatusCode::BAD_REQUEST,
        StackError::StackNotFound(_) | StackError::ResourceNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        StackError::StackExists(_) | StackError::InvalidTransition { .. } => StatusCode::CONFLICT,
        StackError::DuplicateResource(_)
        | StackError::InvalidIdentifier { .. }
        | StackError::InvalidTemplate(_)
        | StackError::CircularDependency(_)
        | StackError::InvalidParameter { .. }
        | StackError::SignalNotSupported { .. }
        | StackError::SignalRejected { .. }
        | StackError::InvalidSignal(_)
        | StackError::NestingTooDeep(_)
        | StackError::TooManyResources(_) => StatusCode::BAD_REQUEST,
        StackError::Io(_) | StackError::Yaml(_) | StackError::Json(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.downcast_ref::<BadRequestError>().is_some() {
            StatusCode::BAD_REQUEST
        } else if self.0.downcast_ref::<UnavailableError>().is_some() {
            StatusCode::SERVICE_UNAVAILABLE
        } else if let Some(e) = self.0.downcast_ref::<StackError>() {
            status_for(e)
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(err: StackError) -> StatusCode {
        AppError(err.into()).into_response().status()
    }

    #[test]
    fn not_found_variants_map_to_404() {
        assert_eq!(status(StackError::StackNotFound("s".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(StackError::ResourceNotFound {
                stack: "s".into(),
                resource: "r".into()
            }),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn unsupported_signal_maps_to_400() {
        let err = StackError::SignalNotSupported {
            resource: "web".into(),
            resource_type: "AWS::EC2::Instance".into(),
        };
        assert_eq!(status(err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn bad_identifier_maps_to_400() {
        assert_eq!(
            status(StackError::invalid("stack id", "xyz")),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn stack_exists_maps_to_409() {
        assert_eq!(status(StackError::StackExists("web".into())), StatusCode::CONFLICT);
    }

    #[test]
    fn io_error_maps_to_500() {
        let err = StackError::Io(std::io::Error::other("disk full"));
        assert_eq!(status(err), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn foreign_error_maps_to_500() {
        let resp = AppError(anyhow::anyhow!("something unexpected")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn sentinels_map_to_their_status() {
        assert_eq!(
            AppError::bad_request("bad body").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::unavailable("queue full").into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn body_is_json() {
        let resp = AppError(StackError::StackNotFound("s".into()).into()).into_response();
        let ct = resp
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .expect("should have content-type");
        assert!(ct.to_str().unwrap().contains("application/json"));
    }
}
