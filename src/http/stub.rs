// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! In-memory transport for unit tests

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;

use super::{Request, Response, Transport};
use crate::error::{Error, Result};

type Handler = Box<dyn Fn(&Request) -> Result<Response> + Send + Sync>;

/// Answers every request with a canned response and records what it saw
pub(crate) struct StubTransport {
    handler: Handler,
    requests: Mutex<Vec<Request>>,
}

impl StubTransport {
    pub(crate) fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&Request) -> Result<Response> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// 200 with the given body and content type for every request
    pub(crate) fn ok(body: &'static str, content_type: &'static str) -> Arc<Self> {
        Self::new(move |req| Ok(response(200, content_type, body.as_bytes(), req)))
    }

    /// Fails every request with a network error
    pub(crate) fn failing(message: &'static str) -> Arc<Self> {
        Self::new(move |_| Err(Error::network(message)))
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn execute(&self, request: Request) -> Result<Response> {
        self.requests.lock().push(request.clone());
        (self.handler)(&request)
    }
}

/// Build a buffered response for `request`
pub(crate) fn response(status: u16, content_type: &str, body: &[u8], request: &Request) -> Response {
    let mut headers = HeaderMap::new();
    if !content_type.is_empty() {
        if let Ok(value) = HeaderValue::from_str(content_type) {
            headers.insert("content-type", value);
        }
    }
    Response::new(
        StatusCode::from_u16(status).unwrap_or(StatusCode::OK),
        headers,
        Bytes::copy_from_slice(body),
        request.url.clone(),
        false,
        1,
    )
}
