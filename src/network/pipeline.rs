// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Middleware execution shared by every interception strategy
//!
//! Request middlewares run concurrently and are awaited before dispatch.
//! Response middlewares run on a spawned task so the caller is never held up
//! by them. Failures and panics of either kind are contained and reported,
//! never surfaced to page code.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;

use super::canonical::{build_response_record, sanitize, RawResponse};
use super::middleware::{
    MiddlewareIds, MiddlewarePhase, MiddlewareRegistry, RequestMiddleware, ResponseMiddleware,
};
use super::record::{CallSurface, RequestHandle, RequestRecord, ResponseRecord};
use crate::error::{Error, Result};

/// What went wrong inside the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A request middleware errored or panicked
    RequestMiddleware,
    /// A response middleware errored or panicked
    ResponseMiddleware,
    /// A middleware left the record in a state that could not be dispatched
    InvalidMutation,
    /// Form replay failed
    Replay,
    /// The native form submission after a replay failed
    NativeSubmit,
    /// Dispatch of an intercepted XHR failed
    Dispatch,
    /// A strategy could not be installed
    Install,
}

/// Report handed to the error reporter
#[derive(Debug, Clone, Serialize)]
pub struct InterceptFailure {
    pub kind: FailureKind,
    pub surface: Option<CallSurface>,
    pub request_id: Option<String>,
    pub middleware_id: Option<String>,
    pub message: String,
}

impl InterceptFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            surface: None,
            request_id: None,
            middleware_id: None,
            message: message.into(),
        }
    }

    pub fn surface(mut self, surface: CallSurface) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn middleware(mut self, id: impl Into<String>) -> Self {
        self.middleware_id = Some(id.into());
        self
    }
}

impl fmt::Display for InterceptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(surface) = self.surface {
            write!(f, "[{}] ", surface)?;
        }
        if let Some(ref id) = self.middleware_id {
            write!(f, "middleware '{}': ", id)?;
        }
        f.write_str(&self.message)
    }
}

/// Callback receiving engine failures
pub type ErrorReporter = Arc<dyn Fn(&InterceptFailure) + Send + Sync>;

/// Registries plus the error reporter
pub struct Pipeline {
    request: RwLock<MiddlewareRegistry<dyn RequestMiddleware>>,
    response: RwLock<MiddlewareRegistry<dyn ResponseMiddleware>>,
    reporter: RwLock<Option<ErrorReporter>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            request: RwLock::new(MiddlewareRegistry::new(MiddlewarePhase::Request)),
            response: RwLock::new(MiddlewareRegistry::new(MiddlewarePhase::Response)),
            reporter: RwLock::new(None),
        }
    }

    pub fn set_reporter(&self, reporter: Option<ErrorReporter>) {
        *self.reporter.write() = reporter;
    }

    pub fn add_request(
        &self,
        middleware: Arc<dyn RequestMiddleware>,
        id: Option<&str>,
    ) -> Result<String> {
        self.request.write().add(middleware, id)
    }

    pub fn add_response(
        &self,
        middleware: Arc<dyn ResponseMiddleware>,
        id: Option<&str>,
    ) -> Result<String> {
        self.response.write().add(middleware, id)
    }

    pub fn remove_request(&self, id: &str) -> bool {
        self.request.write().remove(id)
    }

    pub fn remove_response(&self, id: &str) -> bool {
        self.response.write().remove(id)
    }

    pub fn ids(&self) -> MiddlewareIds {
        MiddlewareIds {
            request: self.request.read().ids(),
            response: self.response.read().ids(),
        }
    }

    /// Log a failure and hand it to the reporter, if any
    pub fn report(&self, failure: InterceptFailure) {
        tracing::warn!(
            kind = ?failure.kind,
            surface = ?failure.surface,
            request_id = ?failure.request_id,
            middleware = ?failure.middleware_id,
            "{}",
            failure.message
        );
        let reporter = self.reporter.read().clone();
        if let Some(reporter) = reporter {
            if std::panic::catch_unwind(AssertUnwindSafe(|| reporter(&failure))).is_err() {
                tracing::error!("error reporter panicked");
            }
        }
    }

    /// Run every request middleware against `request` and wait for all of them
    pub async fn run_request(&self, surface: CallSurface, request: &RequestHandle) {
        let middlewares = self.request.read().snapshot();
        if middlewares.is_empty() {
            return;
        }

        let runs = middlewares.into_iter().map(|(id, middleware)| {
            let handle = request.clone();
            async move {
                let outcome = AssertUnwindSafe(middleware.on_request(handle))
                    .catch_unwind()
                    .await;
                (id, outcome)
            }
        });

        let request_id = request.id();
        for (id, outcome) in join_all(runs).await {
            if let Some(message) = failure_message(outcome) {
                let error = Error::middleware(&id, MiddlewarePhase::Request, message);
                self.report(
                    InterceptFailure::new(FailureKind::RequestMiddleware, error.to_string())
                        .surface(surface)
                        .request(&request_id)
                        .middleware(id),
                );
            }
        }
    }

    /// Freeze the record after the request middlewares, repairing what they broke
    pub fn seal(&self, handle: RequestHandle, original: &RequestRecord) -> Arc<RequestRecord> {
        let mut record = handle.snapshot();
        for problem in sanitize(&mut record, original) {
            self.report(
                InterceptFailure::new(FailureKind::InvalidMutation, problem)
                    .surface(record.source)
                    .request(&record.id),
            );
        }
        Arc::new(record)
    }

    /// Run the response middlewares in the background
    ///
    /// Nothing is spawned when no response middleware is registered or no
    /// async runtime is running.
    pub fn spawn_response(
        self: &Arc<Self>,
        surface: CallSurface,
        raw: RawResponse,
        request: Arc<RequestRecord>,
        request_id: Option<String>,
    ) {
        if self.response.read().is_empty() {
            return;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::debug!(%surface, "no async runtime, skipping response middlewares");
                return;
            }
        };
        let pipeline = self.clone();
        runtime.spawn(async move {
            let record = build_response_record(raw, request_id);
            pipeline.run_response(surface, record, request).await;
        });
    }

    /// Run every response middleware against its own copy of `response`
    pub async fn run_response(
        &self,
        surface: CallSurface,
        response: ResponseRecord,
        request: Arc<RequestRecord>,
    ) {
        let middlewares = self.response.read().snapshot();
        let runs = middlewares.into_iter().map(|(id, middleware)| {
            let response = response.clone();
            let request = request.clone();
            async move {
                let outcome = AssertUnwindSafe(middleware.on_response(response, request))
                    .catch_unwind()
                    .await;
                (id, outcome)
            }
        });

        for (id, outcome) in join_all(runs).await {
            if let Some(message) = failure_message(outcome) {
                let error = Error::middleware(&id, MiddlewarePhase::Response, message);
                let mut failure =
                    InterceptFailure::new(FailureKind::ResponseMiddleware, error.to_string())
                        .surface(surface)
                        .middleware(id);
                failure.request_id = response.request_id.clone();
                self.report(failure);
            }
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("request", &*self.request.read())
            .field("response", &*self.response.read())
            .finish()
    }
}

fn failure_message(
    outcome: std::result::Result<Result<()>, Box<dyn Any + Send>>,
) -> Option<String> {
    match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(panic) => Some(format!("panicked: {}", panic_message(&*panic))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::middleware::{request_fn, response_fn};
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn record() -> RequestRecord {
        RequestRecord::new(CallSurface::Fetch, "https://a.test/", "GET")
    }

    fn collecting_pipeline() -> (Arc<Pipeline>, Arc<Mutex<Vec<InterceptFailure>>>) {
        let pipeline = Arc::new(Pipeline::new());
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        pipeline.set_reporter(Some(Arc::new(move |f: &InterceptFailure| {
            sink.lock().push(f.clone())
        })));
        (pipeline, failures)
    }

    #[tokio::test]
    async fn test_request_mutations_are_shared() {
        let pipeline = Pipeline::new();
        pipeline
            .add_request(
                Arc::new(request_fn(|req: RequestHandle| async move {
                    req.update(|r| r.headers.insert("X-One", "1"));
                    Ok(())
                })),
                None,
            )
            .unwrap();
        pipeline
            .add_request(
                Arc::new(request_fn(|req: RequestHandle| async move {
                    req.update(|r| r.headers.insert("X-Two", "2"));
                    Ok(())
                })),
                None,
            )
            .unwrap();

        let handle = RequestHandle::new(record());
        pipeline.run_request(CallSurface::Fetch, &handle).await;

        let sealed = handle.snapshot();
        assert_eq!(sealed.headers.get("x-one"), Some("1"));
        assert_eq!(sealed.headers.get("x-two"), Some("2"));
    }

    #[tokio::test]
    async fn test_failing_and_panicking_middlewares_are_contained() {
        let (pipeline, failures) = collecting_pipeline();
        pipeline
            .add_request(
                Arc::new(request_fn(|_| async { Err(Error::other("boom")) })),
                Some("broken"),
            )
            .unwrap();
        pipeline
            .add_request(
                Arc::new(request_fn(|_| async { panic!("kaboom") })),
                Some("panicky"),
            )
            .unwrap();
        pipeline
            .add_request(
                Arc::new(request_fn(|req: RequestHandle| async move {
                    req.update(|r| r.headers.insert("X-Ok", "yes"));
                    Ok(())
                })),
                Some("fine"),
            )
            .unwrap();

        let handle = RequestHandle::new(record());
        pipeline.run_request(CallSurface::Fetch, &handle).await;

        assert_eq!(handle.snapshot().headers.get("x-ok"), Some("yes"));
        let failures = failures.lock();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].middleware_id.as_deref(), Some("broken"));
        assert!(failures[0].message.contains("boom"));
        assert!(failures[1].message.contains("kaboom"));
        assert_eq!(failures[1].request_id, Some(handle.id()));
    }

    #[tokio::test]
    async fn test_seal_repairs_bad_url() {
        let (pipeline, failures) = collecting_pipeline();
        let original = record();
        let handle = RequestHandle::new(original.clone());
        handle.update(|r| r.url = "not a url".to_string());

        let sealed = pipeline.seal(handle, &original);
        assert_eq!(sealed.url, "https://a.test/");
        assert_eq!(failures.lock()[0].kind, FailureKind::InvalidMutation);
    }

    #[tokio::test]
    async fn test_response_middlewares_run_in_background() {
        let pipeline = Arc::new(Pipeline::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        pipeline
            .add_response(
                Arc::new(response_fn(move |response: ResponseRecord, request: Arc<RequestRecord>| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send((response.body, request.id.clone()));
                        Ok(())
                    }
                })),
                None,
            )
            .unwrap();

        let request = Arc::new(record());
        let http_request = crate::http::Request::get("https://a.test/").unwrap();
        let raw = crate::http::stub::response(200, "text/plain", b"hello", &http_request);
        pipeline.spawn_response(
            CallSurface::Fetch,
            RawResponse::Fetch(raw),
            request.clone(),
            Some(request.id.clone()),
        );

        let (body, id) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body, "hello");
        assert_eq!(id, request.id);
    }

    #[test]
    fn test_failure_display() {
        let failure = InterceptFailure::new(FailureKind::Replay, "offline")
            .surface(CallSurface::Form)
            .middleware("m1");
        assert_eq!(failure.to_string(), "[form] middleware 'm1': offline");
    }
}
