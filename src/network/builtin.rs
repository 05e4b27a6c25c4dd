// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Ready-made middlewares
//!
//! # Example
//!
//! ```rust,no_run
//! use wiretap::network::{AuthHeaderInjector, Interceptor, RequestLogger};
//! # fn setup(interceptor: &Interceptor) -> wiretap::Result<()> {
//! interceptor.add_request_middleware(
//!     AuthHeaderInjector::new()
//!         .bearer_token("secret")
//!         .for_domains(vec!["api.example.com".into()]),
//!     Some("auth"),
//! )?;
//! interceptor.add_response_middleware(RequestLogger::default(), Some("log"))?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use url::Url;

use super::middleware::{RequestMiddleware, ResponseMiddleware};
use super::record::{RequestHandle, RequestRecord, ResponseRecord};
use crate::error::Result;

/// Header entry for request modification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

impl HeaderEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Sets credentials on outgoing requests
#[derive(Debug, Clone, Default)]
pub struct AuthHeaderInjector {
    /// Headers to inject into every request
    headers: Vec<HeaderEntry>,
    /// Domains to inject into (empty = all)
    domains: Vec<String>,
}

impl AuthHeaderInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bearer token
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.headers.push(HeaderEntry::new(
            "authorization",
            format!("Bearer {}", token.into()),
        ));
        self
    }

    /// Add basic auth
    pub fn basic_auth(mut self, username: &str, password: &str) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", username, password));
        self.headers
            .push(HeaderEntry::new("authorization", format!("Basic {}", encoded)));
        self
    }

    /// Add custom header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(HeaderEntry::new(name, value));
        self
    }

    /// Restrict to hosts equal to, or subdomains of, `domains`
    pub fn for_domains(mut self, domains: Vec<String>) -> Self {
        self.domains = domains;
        self
    }

    pub fn headers(&self) -> &[HeaderEntry] {
        &self.headers
    }

    /// Whether a request to `url` gets the headers
    pub fn applies_to(&self, url: &str) -> bool {
        if self.domains.is_empty() {
            return true;
        }
        let Ok(url) = Url::parse(url) else {
            return false;
        };
        let Some(host) = url.host_str() else {
            return false;
        };
        self.domains.iter().any(|domain| {
            let domain = domain.trim_start_matches('.');
            host.eq_ignore_ascii_case(domain)
                || host
                    .to_ascii_lowercase()
                    .ends_with(&format!(".{}", domain.to_ascii_lowercase()))
        })
    }
}

#[async_trait]
impl RequestMiddleware for AuthHeaderInjector {
    async fn on_request(&self, request: RequestHandle) -> Result<()> {
        request.update(|record| {
            if !self.applies_to(&record.url) {
                return;
            }
            for header in &self.headers {
                record.headers.insert(header.name.clone(), header.value.clone());
            }
        });
        Ok(())
    }
}

/// Logs every exchange through `tracing`
#[derive(Debug, Clone, Default)]
pub struct RequestLogger {
    /// Log request bodies
    pub log_bodies: bool,
    /// Log response bodies
    pub log_responses: bool,
    /// Only log URLs containing this
    pub url_filter: Option<String>,
}

impl RequestLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bodies(mut self) -> Self {
        self.log_bodies = true;
        self.log_responses = true;
        self
    }

    pub fn url_filter(mut self, filter: impl Into<String>) -> Self {
        self.url_filter = Some(filter.into());
        self
    }

    fn matches(&self, url: &str) -> bool {
        self.url_filter
            .as_deref()
            .map_or(true, |filter| url.contains(filter))
    }
}

#[async_trait]
impl RequestMiddleware for RequestLogger {
    async fn on_request(&self, request: RequestHandle) -> Result<()> {
        let record = request.snapshot();
        if !self.matches(&record.url) {
            return Ok(());
        }
        tracing::info!(
            id = %record.id,
            source = %record.source,
            method = %record.method,
            url = %record.url,
            "Request"
        );
        if self.log_bodies {
            if let Some(body) = record.body_text() {
                tracing::debug!(id = %record.id, body, "Request body");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ResponseMiddleware for RequestLogger {
    async fn on_response(&self, response: ResponseRecord, request: Arc<RequestRecord>) -> Result<()> {
        if !self.matches(&request.url) {
            return Ok(());
        }
        tracing::info!(
            id = ?response.request_id,
            source = %response.source,
            url = %response.url,
            status = response.status,
            "Response"
        );
        if self.log_responses {
            tracing::debug!(id = ?response.request_id, body = %response.body, "Response body");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::record::CallSurface;

    fn handle(url: &str) -> RequestHandle {
        RequestHandle::new(RequestRecord::new(CallSurface::Fetch, url, "GET"))
    }

    #[tokio::test]
    async fn test_auth_injector() {
        let injector = AuthHeaderInjector::new()
            .bearer_token("test_token")
            .header("x-custom", "value");
        assert_eq!(injector.headers().len(), 2);

        let request = handle("https://api.example.com/me");
        injector.on_request(request.clone()).await.unwrap();
        let record = request.snapshot();
        assert_eq!(record.headers.get("Authorization"), Some("Bearer test_token"));
        assert_eq!(record.headers.get("x-custom"), Some("value"));
    }

    #[tokio::test]
    async fn test_basic_auth_replaces_existing() {
        let injector = AuthHeaderInjector::new().basic_auth("user", "pass");
        let request = handle("https://example.com/");
        request.update(|r| r.headers.insert("authorization", "Bearer old"));

        injector.on_request(request.clone()).await.unwrap();
        assert_eq!(
            request.snapshot().headers.get("authorization"),
            Some("Basic dXNlcjpwYXNz")
        );
    }

    #[test]
    fn test_domain_filter() {
        let injector = AuthHeaderInjector::new()
            .bearer_token("t")
            .for_domains(vec!["example.com".to_string()]);

        assert!(injector.applies_to("https://example.com/a"));
        assert!(injector.applies_to("https://API.example.com/a"));
        assert!(!injector.applies_to("https://notexample.com/a"));
        assert!(!injector.applies_to("https://example.com.evil.test/"));
        assert!(!injector.applies_to("/relative"));
    }

    #[tokio::test]
    async fn test_logger_leaves_record_alone() {
        let logger = RequestLogger::new().with_bodies().url_filter("/api/");
        let request = handle("https://example.com/api/items");
        let before = request.snapshot();

        RequestMiddleware::on_request(&logger, request.clone()).await.unwrap();
        assert_eq!(request.snapshot().headers, before.headers);
        assert!(!logger.matches("https://example.com/static/app.js"));
    }
}
