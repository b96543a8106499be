//! Request error taxonomy and its HTTP rendering.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, error};

use crate::renderer::html_escape;

/// Everything that can go wrong while answering a request.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The request path contains a parent-directory segment. Rejected on
    /// the raw decoded string, before any filesystem access.
    #[error("path contains a parent directory segment")]
    Traversal,

    /// The normalized path left the served root (absolute component, NUL
    /// byte, or a symlink pointing outside the root).
    #[error("path escapes the served root directory")]
    RootEscape,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied")]
    PermissionDenied,

    #[error("i/o error: {0}")]
    Io(std::io::Error),
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Traversal | Self::RootEscape | Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied
        } else {
            Self::Io(err)
        }
    }
}

/// Minimal HTML error page carrying the status code and an escaped message.
fn error_page(status: StatusCode, message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Error {code}</title>
</head>
<body>
<h1>Error {code}</h1>
<p>{message}</p>
<p><a href="/">Back to root</a></p>
</body>
</html>
"#,
        code = status.as_u16(),
        message = html_escape(message),
    )
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if status.is_server_error() {
            error!(status = status.as_u16(), %message, "request failed");
        } else {
            debug!(status = status.as_u16(), %message, "request rejected");
        }

        let mut response = (
            status,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            )],
            error_page(status, &message),
        )
            .into_response();
        response
            .headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
        response
    }
}
