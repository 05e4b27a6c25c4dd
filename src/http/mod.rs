// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! HTTP layer underneath the page's call surfaces
//!
//! Provides the request/response values the surfaces exchange and the
//! transport that actually puts them on the wire.

mod client;
mod headers;
mod request;
mod response;
#[cfg(test)]
pub(crate) mod stub;

use async_trait::async_trait;

pub use client::{HttpClient, HttpClientConfig};
pub use headers::Headers;
pub use request::Request;
pub use response::Response;

use crate::error::Result;

/// Default user agent string
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Common HTTP headers
pub mod header_names {
    pub const ACCEPT: &str = "accept";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const USER_AGENT: &str = "user-agent";
    pub const AUTHORIZATION: &str = "authorization";
}

/// Puts a request on the wire
///
/// The page's native fetch, XHR and form navigation all end here. The
/// interception engine never talks to a transport directly.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a request and buffer the full response
    async fn execute(&self, request: Request) -> Result<Response>;
}
