use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::application::feed::FeedError;
use crate::application::repos::ContentError;
use crate::infra::error::InfraError;

/// Diagnostic detail attached to a response for the logging middleware.
/// Never rendered to the client.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut cause = error.source();
        while let Some(err) = cause {
            messages.push(err.to_string());
            cause = err.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// An error ready to leave the HTTP boundary: a safe public message plus the
/// detailed report for the logs.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<FeedError> for HttpError {
    fn from(error: FeedError) -> Self {
        const SOURCE: &str = "infra::http::feed_error_to_http_error";
        match error {
            FeedError::InvalidCursor(detail) => HttpError::new(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Invalid cursor",
                format!("Cursor rejected: {detail}"),
            ),
            // Foreign tokens can only arrive inside a client-supplied cursor,
            // so they are treated as tampering rather than upstream failure.
            FeedError::Content(ContentError::ForeignPageToken { token }) => HttpError::new(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Invalid cursor",
                format!("Cursor token `{token}` points outside the content API"),
            ),
            FeedError::Content(err) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_GATEWAY,
                "Content service unavailable",
                &err,
            ),
        }
    }
}

/// Top-level error for startup and shutdown paths.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
