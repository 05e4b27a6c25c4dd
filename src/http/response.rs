// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! HTTP response type
//!
//! The body behaves like a stream: reading it consumes it, and a consumed
//! response can no longer be cloned.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{Error, Result};

/// HTTP response representation
#[derive(Debug)]
pub struct Response {
    /// Response status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Final URL (after redirects)
    pub url: Url,
    /// Whether this was a redirect
    pub redirected: bool,
    /// Response time in milliseconds
    pub response_time_ms: u64,
    /// Body bytes, `None` once read
    body: Option<Bytes>,
}

impl Response {
    /// Create a new response
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
        url: Url,
        redirected: bool,
        response_time_ms: u64,
    ) -> Self {
        Self {
            status,
            headers,
            url,
            redirected,
            response_time_ms,
            body: Some(body),
        }
    }

    /// Check if status is success (2xx)
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get status code as u16
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Reason phrase for the status
    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    /// Whether the body has been read
    pub fn body_used(&self) -> bool {
        self.body.is_none()
    }

    /// Read the body bytes
    pub fn bytes(&mut self) -> Result<Bytes> {
        self.body.take().ok_or(Error::BodyUsed)
    }

    /// Read the body as UTF-8 text
    pub fn text(&mut self) -> Result<String> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::Other(e.to_string()))
    }

    /// Read the body as text, replacing invalid UTF-8
    pub fn text_lossy(&mut self) -> Result<String> {
        let bytes = self.bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Parse the body as JSON
    pub fn json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let bytes = self.bytes()?;
        serde_json::from_slice(&bytes).map_err(Error::from)
    }

    /// Independent copy with its own readable body
    ///
    /// Fails once the body has been read.
    pub fn try_clone(&self) -> Result<Response> {
        let body = self.body.clone().ok_or(Error::BodyUsed)?;
        Ok(Self {
            body: Some(body),
            ..self.head_only()
        })
    }

    /// Copy of status, headers and URL with an already consumed body
    pub fn head_only(&self) -> Response {
        Self {
            status: self.status,
            headers: self.headers.clone(),
            url: self.url.clone(),
            redirected: self.redirected,
            response_time_ms: self.response_time_ms,
            body: None,
        }
    }

    /// Get a header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get content type
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &'static str) -> Response {
        Response::new(
            StatusCode::OK,
            HeaderMap::new(),
            Bytes::from(body),
            Url::parse("https://example.com").unwrap(),
            false,
            100,
        )
    }

    #[test]
    fn test_response_status() {
        let resp = response("");
        assert!(resp.is_success());
        assert_eq!(resp.status_code(), 200);
        assert_eq!(resp.status_text(), "OK");
    }

    #[test]
    fn test_body_is_consumed_once() {
        let mut resp = response("Hello, World!");
        assert_eq!(resp.text().unwrap(), "Hello, World!");
        assert!(resp.body_used());
        assert!(matches!(resp.text(), Err(Error::BodyUsed)));
    }

    #[test]
    fn test_clone_is_independent() {
        let mut resp = response("payload");
        let mut copy = resp.try_clone().unwrap();
        assert_eq!(copy.text().unwrap(), "payload");
        assert_eq!(resp.text().unwrap(), "payload");
        assert!(matches!(resp.try_clone(), Err(Error::BodyUsed)));
    }
}
