// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Middleware traits and the id-keyed registry
//!
//! Request middlewares see a shared [`RequestHandle`] before dispatch and may
//! mutate it. Response middlewares see an independent copy of the completed
//! response together with the final request record.
//!
//! # Example
//!
//! ```rust,no_run
//! use wiretap::network::{RequestHandle, RequestMiddleware};
//! use async_trait::async_trait;
//!
//! struct TraceHeader;
//!
//! #[async_trait]
//! impl RequestMiddleware for TraceHeader {
//!     async fn on_request(&self, request: RequestHandle) -> wiretap::Result<()> {
//!         request.update(|r| r.headers.insert("x-trace", "1"));
//!         Ok(())
//!     }
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;

use super::record::{RequestHandle, RequestRecord, ResponseRecord};
use crate::error::{Error, Result};

/// Which side of the exchange a middleware runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MiddlewarePhase {
    Request,
    Response,
}

impl MiddlewarePhase {
    fn id_prefix(&self) -> &'static str {
        match self {
            MiddlewarePhase::Request => "request",
            MiddlewarePhase::Response => "response",
        }
    }
}

impl fmt::Display for MiddlewarePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id_prefix())
    }
}

/// Runs before a request is dispatched
#[async_trait]
pub trait RequestMiddleware: Send + Sync {
    /// Inspect or mutate the request
    ///
    /// An error is reported and otherwise ignored; the request still goes
    /// out with whatever the record holds at that point.
    async fn on_request(&self, request: RequestHandle) -> Result<()>;
}

/// Runs after a response has arrived, off the caller's path
#[async_trait]
pub trait ResponseMiddleware: Send + Sync {
    async fn on_response(&self, response: ResponseRecord, request: Arc<RequestRecord>) -> Result<()>;
}

/// Request middleware built from a closure
pub struct RequestFn<F>(F);

#[async_trait]
impl<F, Fut> RequestMiddleware for RequestFn<F>
where
    F: Fn(RequestHandle) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn on_request(&self, request: RequestHandle) -> Result<()> {
        (self.0)(request).await
    }
}

/// Wrap an async closure as a request middleware
pub fn request_fn<F, Fut>(f: F) -> RequestFn<F>
where
    F: Fn(RequestHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    RequestFn(f)
}

/// Response middleware built from a closure
pub struct ResponseFn<F>(F);

#[async_trait]
impl<F, Fut> ResponseMiddleware for ResponseFn<F>
where
    F: Fn(ResponseRecord, Arc<RequestRecord>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn on_response(&self, response: ResponseRecord, request: Arc<RequestRecord>) -> Result<()> {
        (self.0)(response, request).await
    }
}

/// Wrap an async closure as a response middleware
pub fn response_fn<F, Fut>(f: F) -> ResponseFn<F>
where
    F: Fn(ResponseRecord, Arc<RequestRecord>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    ResponseFn(f)
}

/// Ordered, id-keyed set of middlewares for one phase
pub struct MiddlewareRegistry<M: ?Sized> {
    phase: MiddlewarePhase,
    entries: IndexMap<String, Arc<M>>,
    generated: u64,
}

impl<M: ?Sized> MiddlewareRegistry<M> {
    pub fn new(phase: MiddlewarePhase) -> Self {
        Self {
            phase,
            entries: IndexMap::new(),
            generated: 0,
        }
    }

    /// Register under `id`, or under a generated `<phase>_<n>` id
    pub fn add(&mut self, middleware: Arc<M>, id: Option<&str>) -> Result<String> {
        let id = match id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) if self.entries.contains_key(id) => {
                return Err(Error::DuplicateMiddleware {
                    id: id.to_string(),
                    phase: self.phase,
                });
            }
            Some(id) => id.to_string(),
            None => self.generate_id(),
        };
        self.entries.insert(id.clone(), middleware);
        Ok(id)
    }

    fn generate_id(&mut self) -> String {
        loop {
            self.generated += 1;
            let id = format!("{}_{}", self.phase.id_prefix(), self.generated);
            if !self.entries.contains_key(&id) {
                return id;
            }
        }
    }

    /// Remove by id; unknown ids are a no-op
    pub fn remove(&mut self, id: &str) -> bool {
        self.entries.shift_remove(id).is_some()
    }

    /// Ids in registration order
    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Current middlewares, detached from later registry changes
    pub fn snapshot(&self) -> Vec<(String, Arc<M>)> {
        self.entries
            .iter()
            .map(|(id, m)| (id.clone(), m.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<M: ?Sized> fmt::Debug for MiddlewareRegistry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("phase", &self.phase)
            .field("ids", &self.ids())
            .finish()
    }
}

/// Registered ids of both phases
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MiddlewareIds {
    pub request: Vec<String>,
    pub response: Vec<String>,
}
