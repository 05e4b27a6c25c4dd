// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Canonical request/response records handed to middlewares

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::http::{header_names, Headers};
use crate::page::RequestBody;

lazy_static! {
    static ref PROCESS_EPOCH: Instant = Instant::now();
}

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Monotonic time since the engine was first used
pub fn monotonic_now() -> Duration {
    PROCESS_EPOCH.elapsed()
}

pub(crate) fn next_request_id() -> String {
    format!("req_{}", NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
}

/// Which call surface produced a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallSurface {
    /// `window.fetch`
    Fetch,
    /// XMLHttpRequest
    Xhr,
    /// Form submission
    Form,
}

impl CallSurface {
    pub const ALL: [CallSurface; 3] = [CallSurface::Fetch, CallSurface::Xhr, CallSurface::Form];

    pub fn as_str(&self) -> &'static str {
        match self {
            CallSurface::Fetch => "fetch",
            CallSurface::Xhr => "xhr",
            CallSurface::Form => "form",
        }
    }
}

impl fmt::Display for CallSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing request as every surface reports it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestRecord {
    /// Process-unique id, `req_<n>`
    pub id: String,
    /// Surface that issued the request
    pub source: CallSurface,
    /// Absolute URL
    pub url: String,
    /// Uppercase HTTP method
    pub method: String,
    pub headers: Headers,
    pub body: Option<RequestBody>,
    /// Monotonic capture time
    pub timestamp: Duration,
    /// Wall-clock capture time
    pub captured_at: DateTime<Utc>,
}

impl RequestRecord {
    /// Fresh record with a new id and no headers or body
    pub fn new(source: CallSurface, url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            id: next_request_id(),
            source,
            url: url.into(),
            method: method.into().to_ascii_uppercase(),
            headers: Headers::new(),
            body: None,
            timestamp: monotonic_now(),
            captured_at: Utc::now(),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header_names::CONTENT_TYPE)
    }

    /// Body as text when it is textual
    pub fn body_text(&self) -> Option<&str> {
        self.body.as_ref().and_then(RequestBody::as_text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Shared, mutable request record
///
/// Every request middleware receives a clone of the same handle, so a change
/// one of them makes is visible to the others and to the dispatch that
/// follows.
#[derive(Clone)]
pub struct RequestHandle(Arc<Mutex<RequestRecord>>);

impl RequestHandle {
    pub fn new(record: RequestRecord) -> Self {
        Self(Arc::new(Mutex::new(record)))
    }

    pub fn id(&self) -> String {
        self.0.lock().id.clone()
    }

    /// Direct access; do not hold the guard across an await
    pub fn lock(&self) -> MutexGuard<'_, RequestRecord> {
        self.0.lock()
    }

    /// Mutate the record
    pub fn update<R>(&self, f: impl FnOnce(&mut RequestRecord) -> R) -> R {
        f(&mut self.0.lock())
    }

    /// Inspect the record
    pub fn read<R>(&self, f: impl FnOnce(&RequestRecord) -> R) -> R {
        f(&self.0.lock())
    }

    pub fn snapshot(&self) -> RequestRecord {
        self.0.lock().clone()
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RequestHandle").field(&*self.0.lock()).finish()
    }
}

/// Completed response as every surface reports it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseRecord {
    /// Id of the request record this answers, when it is known
    pub request_id: Option<String>,
    pub source: CallSurface,
    /// Final response URL
    pub url: String,
    /// HTTP status, 0 for network failures
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    /// Textual body or a sentinel describing why there is none
    pub body: String,
    pub timestamp: Duration,
    pub captured_at: DateTime<Utc>,
}

impl ResponseRecord {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header_names::CONTENT_TYPE)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
