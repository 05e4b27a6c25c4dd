// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Error types for wiretap
//!
//! Errors raised by the host page surfaces (fetch, XHR, forms) travel back
//! to the page unchanged. Errors raised by the interception engine itself
//! are contained and reported, never handed to the page.

use thiserror::Error;

use crate::network::{CallSurface, MiddlewarePhase};

/// Result type alias for wiretap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for wiretap
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Transport level failure
    #[error("Network error: {0}")]
    Network(String),

    /// Request could not be constructed (bad method, body on GET, ...)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// XHR state machine violation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Response body was read before
    #[error("Body has already been consumed")]
    BodyUsed,

    /// A middleware returned an error or panicked
    #[error("{phase} middleware '{id}' failed: {message}")]
    Middleware {
        id: String,
        phase: MiddlewarePhase,
        message: String,
    },

    /// Middleware id already registered in that phase
    #[error("{phase} middleware id '{id}' is already registered")]
    DuplicateMiddleware { id: String, phase: MiddlewarePhase },

    /// Call surface is already intercepted
    #[error("{0} interception is already installed")]
    AlreadyInstalled(CallSurface),

    /// Form submission error
    #[error("Form submission failed: {reason}")]
    FormSubmission {
        reason: String,
        form_action: Option<String>,
        status: Option<u16>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Error::Network(msg.into())
    }

    /// Create an invalid request error
    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        Error::InvalidRequest(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Create a middleware failure
    pub fn middleware(
        id: impl Into<String>,
        phase: MiddlewarePhase,
        message: impl Into<String>,
    ) -> Self {
        Error::Middleware {
            id: id.into(),
            phase,
            message: message.into(),
        }
    }

    /// Create a form submission error with the resolved action
    pub fn form_submission_to(
        reason: impl Into<String>,
        form_action: impl Into<String>,
        status: Option<u16>,
    ) -> Self {
        Error::FormSubmission {
            reason: reason.into(),
            form_action: Some(form_action.into()),
            status,
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }

    /// Get HTTP status code if available
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::FormSubmission { status, .. } => *status,
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add operation context to error
    fn context(self, msg: &str) -> Result<T>;
}

impl<T, E: Into<Error>> ErrorContext<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            Error::Other(format!("{}: {}", msg, err))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_middleware_error_display() {
        let err = Error::middleware("auth", MiddlewarePhase::Request, "boom");
        assert_eq!(err.to_string(), "request middleware 'auth' failed: boom");
    }

    #[test]
    fn test_already_installed_display() {
        let err = Error::AlreadyInstalled(CallSurface::Xhr);
        assert_eq!(err.to_string(), "xhr interception is already installed");
    }

    #[test]
    fn test_form_submission_status() {
        let err = Error::form_submission_to("server rejected", "https://example.com/login", Some(403));
        assert_eq!(err.status_code(), Some(403));
    }

    #[test]
    fn test_context() {
        let err = url::Url::parse("no scheme").context("parsing options").unwrap_err();
        assert_eq!(
            err.to_string(),
            "parsing options: Invalid URL: relative URL without a base"
        );
    }
}
