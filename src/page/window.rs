// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! The page's global object

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use reqwest::header::HeaderValue;
use reqwest::Method;
use serde::Serialize;
use url::Url;

use super::document::Document;
use super::fetch::{FetchFn, FetchInit, FetchInput, NativeFetch};
use super::form::{FormElement, FormPrototype, FormState, FormSubmission};
use super::html;
use super::slot::Slot;
use super::xhr::{XhrPrototype, XmlHttpRequest};
use crate::error::{Error, Result};
use crate::http::{header_names, HttpClient, Request, Response, Transport};

/// A top-level navigation caused by a native form submission
#[derive(Debug, Clone, Serialize)]
pub struct Navigation {
    pub method: String,
    pub url: String,
    pub body: Option<String>,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

struct WindowInner {
    location: Arc<RwLock<Url>>,
    transport: Arc<dyn Transport>,
    fetch: Slot<FetchFn>,
    xhr: XhrPrototype,
    forms: FormPrototype,
    document: Document,
    history: RwLock<Vec<Navigation>>,
    markers: Mutex<HashSet<&'static str>>,
}

/// Browser window: location, call surfaces and document
#[derive(Clone)]
pub struct Window {
    inner: Arc<WindowInner>,
}

/// Non-owning reference to a window
#[derive(Clone)]
pub struct WeakWindow(Weak<WindowInner>);

impl WeakWindow {
    pub fn upgrade(&self) -> Option<Window> {
        self.0.upgrade().map(|inner| Window { inner })
    }
}

impl Window {
    /// Window at `url` whose native surfaces go through `transport`
    pub fn new(url: &str, transport: Arc<dyn Transport>) -> Result<Self> {
        let location = Arc::new(RwLock::new(Url::parse(url)?));
        let native: FetchFn = Arc::new(NativeFetch::new(transport.clone(), location.clone()));

        Ok(Self {
            inner: Arc::new(WindowInner {
                location,
                transport,
                fetch: Slot::new("fetch", native),
                xhr: XhrPrototype::native(),
                forms: FormPrototype::native(),
                document: Document::new(),
                history: RwLock::new(Vec::new()),
                markers: Mutex::new(HashSet::new()),
            }),
        })
    }

    /// Window backed by a real HTTP client
    pub fn with_client(url: &str, client: HttpClient) -> Result<Self> {
        Self::new(url, Arc::new(client))
    }

    pub fn downgrade(&self) -> WeakWindow {
        WeakWindow(Arc::downgrade(&self.inner))
    }

    pub fn location(&self) -> Url {
        self.inner.location.read().clone()
    }

    pub fn set_location(&self, url: &str) -> Result<()> {
        let url = self.resolve_url(url)?;
        *self.inner.location.write() = url;
        Ok(())
    }

    /// Shared location cell, read at call time by native and intercepted fetch
    pub(crate) fn location_cell(&self) -> Arc<RwLock<Url>> {
        self.inner.location.clone()
    }

    /// Resolve `raw` against the current location
    pub fn resolve_url(&self, raw: &str) -> Result<Url> {
        Ok(self.inner.location.read().join(raw)?)
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.inner.transport.clone()
    }

    pub fn fetch_slot(&self) -> &Slot<FetchFn> {
        &self.inner.fetch
    }

    /// `window.fetch(input, init)`
    pub async fn fetch(&self, input: impl Into<FetchInput>, init: FetchInit) -> Result<Response> {
        let handler = self.inner.fetch.get();
        handler.call(input.into(), init).await
    }

    /// `window.fetch = handler`
    pub fn set_fetch(&self, handler: FetchFn) {
        self.inner.fetch.set(handler);
    }

    pub fn xhr_prototype(&self) -> &XhrPrototype {
        &self.inner.xhr
    }

    /// `new XMLHttpRequest()`
    pub fn new_xhr(&self) -> XmlHttpRequest {
        XmlHttpRequest::new(self.clone())
    }

    pub fn form_prototype(&self) -> &FormPrototype {
        &self.inner.forms
    }

    pub fn document(&self) -> &Document {
        &self.inner.document
    }

    /// A form created by script
    pub fn create_form(&self, action: &str, method: &str) -> FormElement {
        FormElement::new(
            self.clone(),
            FormState {
                action: Some(action.to_string()),
                method: Some(method.to_string()),
                ..Default::default()
            },
        )
    }

    /// Forms declared in `html`, bound to this window
    pub fn forms_from_html(&self, html: &str) -> Result<Vec<FormElement>> {
        Ok(html::parse_forms(html)?
            .into_iter()
            .map(|state| FormElement::new(self.clone(), state))
            .collect())
    }

    /// Native form navigations so far
    pub fn history(&self) -> Vec<Navigation> {
        self.inner.history.read().clone()
    }

    /// Claim a surface for instrumentation; false if it already is
    pub(crate) fn try_mark(&self, marker: &'static str) -> bool {
        self.inner.markers.lock().insert(marker)
    }

    pub(crate) fn unmark(&self, marker: &'static str) {
        self.inner.markers.lock().remove(marker);
    }

    /// Whether a surface carries an instrumentation marker
    pub fn is_marked(&self, marker: &str) -> bool {
        self.inner.markers.lock().contains(marker)
    }

    /// Perform a native form submission and navigate to the result
    pub(crate) async fn navigate_form(&self, submission: &FormSubmission) -> Result<()> {
        let mut url = Url::parse(&submission.action).map_err(|e| {
            Error::form_submission_to(format!("invalid action: {}", e), &submission.action, None)
        })?;

        let mut body_text = None;
        let request = if submission.is_get() {
            url.set_query(Some(&submission.encoded_fields()));
            Request::from_url(Method::GET, url)
        } else {
            let encoded = submission.body().encode();
            let mut request = Request::from_url(Method::POST, url);
            if let Some(content_type) = encoded.content_type {
                if let Ok(value) = HeaderValue::from_str(&content_type) {
                    request.headers.insert(header_names::CONTENT_TYPE, value);
                }
            }
            body_text = Some(String::from_utf8_lossy(&encoded.bytes).into_owned());
            request.body = Some(encoded.bytes);
            request
        };

        let mut navigation = Navigation {
            method: request.method.to_string(),
            url: request.url.to_string(),
            body: body_text,
            status: None,
            error: None,
            timestamp: Utc::now(),
        };
        tracing::debug!(method = %navigation.method, url = %navigation.url, "form navigation");

        let result = self.inner.transport.execute(request).await;
        let outcome = match result {
            Ok(response) => {
                navigation.status = Some(response.status_code());
                *self.inner.location.write() = response.url.clone();
                Ok(())
            }
            Err(e) => {
                navigation.error = Some(e.to_string());
                Err(Error::form_submission_to(
                    e.to_string(),
                    &submission.action,
                    e.status_code(),
                ))
            }
        };
        self.inner.history.write().push(navigation);
        outcome
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("location", &self.location().as_str())
            .field("fetch", &self.inner.fetch)
            .field("document", &self.inner.document)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::stub::StubTransport;
    use crate::page::fetch::same_handler;

    #[test]
    fn test_resolve_url() {
        let window = Window::new("https://example.com/a/b", StubTransport::ok("", "")).unwrap();
        assert_eq!(
            window.resolve_url("c?x=1").unwrap().as_str(),
            "https://example.com/a/c?x=1"
        );
        window.set_location("/z/").unwrap();
        assert_eq!(window.location().as_str(), "https://example.com/z/");
    }

    #[test]
    fn test_markers() {
        let window = Window::new("https://example.com/", StubTransport::ok("", "")).unwrap();
        assert!(window.try_mark("xhr"));
        assert!(!window.try_mark("xhr"));
        assert!(window.is_marked("xhr"));
        window.unmark("xhr");
        assert!(!window.is_marked("xhr"));
    }

    #[tokio::test]
    async fn test_page_can_replace_fetch() {
        let window = Window::new("https://example.com/", StubTransport::ok("native", "text/plain")).unwrap();
        let native = window.fetch_slot().get();
        let inner = native.clone();
        window.set_fetch(crate::page::handler_fn("logged", move |input, init| {
            let inner = inner.clone();
            async move { inner.call(input, init).await }
        }));

        let mut response = window.fetch("/x", FetchInit::new()).await.unwrap();
        assert_eq!(response.text().unwrap(), "native");
        assert!(!same_handler(&window.fetch_slot().get(), &native));
        assert_eq!(window.fetch_slot().get().name(), "logged");
    }

    #[tokio::test]
    async fn test_failed_navigation_is_recorded() {
        let window = Window::new("https://example.com/", StubTransport::failing("reset")).unwrap();
        let form = window.create_form("/post", "post");

        let err = form.submit().await.unwrap_err();
        assert!(matches!(err, Error::FormSubmission { .. }));
        assert_eq!(window.history()[0].error.as_deref(), Some("Network error: reset"));
        assert_eq!(window.location().as_str(), "https://example.com/");
    }
}
