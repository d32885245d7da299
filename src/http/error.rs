use axum::{
    http::{header, header::InvalidHeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Missing token")]
    MissingToken,
    #[error("Method Not Allowed")]
    MethodNotAllowed,
    #[error("Internal Server Error")]
    Internal,
}

impl Error {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingToken => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub const fn internal() -> Self {
        Self::Internal
    }
}

impl From<InvalidHeaderValue> for Error {
    fn from(e: InvalidHeaderValue) -> Self {
        error!("invalid header value: {e}");
        Self::Internal
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Self::MethodNotAllowed => (
                self.status_code(),
                [(header::ALLOW, "GET, OPTIONS")],
                self.to_string(),
            )
                .into_response(),
            _ => (self.status_code(), self.to_string()).into_response(),
        }
    }
}
