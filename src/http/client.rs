// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! reqwest-backed transport used by a live page

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::{Client, RequestBuilder};

use super::headers::Headers;
use super::request::Request;
use super::response::Response;
use super::{header_names, Transport, DEFAULT_USER_AGENT};
use crate::error::{Error, Result};

/// Settings of the underlying HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub user_agent: String,
    /// Applied to every request without its own timeout
    pub timeout: Duration,
    pub max_redirects: usize,
    /// Accept invalid certificates (dangerous!)
    pub accept_invalid_certs: bool,
    /// Sent with every request unless the request sets them itself
    pub default_headers: Headers,
    pub proxy: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        let mut default_headers = Headers::new();
        default_headers.insert(header_names::ACCEPT, "*/*");
        default_headers.insert("accept-language", "en-US,en;q=0.5");

        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
            accept_invalid_certs: false,
            default_headers,
            proxy: None,
        }
    }
}

impl HttpClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    fn build(&self) -> Result<Client> {
        let mut builder = Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.timeout)
            .redirect(Policy::limited(self.max_redirects))
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .default_headers(self.default_headers.to_header_map());

        if let Some(proxy) = &self.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| Error::Config(format!("Invalid proxy URL: {}", e)))?;
            builder = builder.proxy(proxy);
        }
        Ok(builder.build()?)
    }
}

/// Sends page requests over the network
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        Self::with_config(HttpClientConfig::default())
    }

    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = config.build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// GET `url` outside of any page surface
    pub async fn get(&self, url: impl AsRef<str>) -> Result<Response> {
        self.send(Request::get(url)?).await
    }

    /// Send `request` and buffer the whole response body
    pub async fn send(&self, request: Request) -> Result<Response> {
        let start = Instant::now();
        let url = request.url.clone();
        tracing::trace!(method = %request.method, %url, "sending request");

        let response = self.prepare(request).send().await?;
        let elapsed = start.elapsed().as_millis() as u64;

        let final_url = response.url().clone();
        let redirected = final_url != url;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        tracing::trace!(%url, status = status.as_u16(), elapsed_ms = elapsed, "response received");

        Ok(Response::new(status, headers, body, final_url, redirected, elapsed))
    }

    fn prepare(&self, request: Request) -> RequestBuilder {
        let Request {
            method,
            url,
            headers,
            body,
            timeout,
        } = request;

        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn execute(&self, request: Request) -> Result<Response> {
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = HttpClient::new().unwrap();
        assert_eq!(client.config().user_agent, DEFAULT_USER_AGENT);
        assert_eq!(client.config().default_headers.get("Accept"), Some("*/*"));
    }

    #[test]
    fn test_invalid_proxy_is_a_config_error() {
        let config = HttpClientConfig::new().proxy("::not a proxy::");
        assert!(matches!(HttpClient::with_config(config), Err(Error::Config(_))));
    }
}
