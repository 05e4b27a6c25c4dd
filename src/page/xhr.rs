// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! The page's XMLHttpRequest surface
//!
//! `open`, `setRequestHeader` and `send` are looked up on the window's XHR
//! prototype at call time, so replacing a prototype slot changes behavior for
//! every instance, including ones created earlier.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use url::Url;

use super::fetch::{normalize_method, parse_method, RequestBody};
use super::slot::Slot;
use super::window::Window;
use crate::error::{Error, Result};
use crate::http::{header_names, Headers, Request, Response};

/// Prototype `open(method, url)`
pub type OpenFn = Arc<dyn Fn(&XmlHttpRequest, &str, &str) -> Result<()> + Send + Sync>;
/// Prototype `setRequestHeader(name, value)`
pub type SetHeaderFn = Arc<dyn Fn(&XmlHttpRequest, &str, &str) -> Result<()> + Send + Sync>;
/// Prototype `send(body)`
pub type SendFn = Arc<dyn Fn(&XmlHttpRequest, Option<RequestBody>) -> Result<()> + Send + Sync>;
/// `onreadystatechange`
pub type ReadyStateHandler = Arc<dyn Fn(&XmlHttpRequest) + Send + Sync>;

pub(crate) const SEND_ALREADY_CALLED: &str = "send() has already been called";
const NOT_OPENED: &str = "The object's state must be OPENED.";

/// Shared methods of every XHR instance
pub struct XhrPrototype {
    pub open: Slot<OpenFn>,
    pub set_request_header: Slot<SetHeaderFn>,
    pub send: Slot<SendFn>,
}

impl XhrPrototype {
    pub(crate) fn native() -> Self {
        Self {
            open: Slot::new("XMLHttpRequest.prototype.open", Arc::new(native_open)),
            set_request_header: Slot::new(
                "XMLHttpRequest.prototype.setRequestHeader",
                Arc::new(native_set_request_header),
            ),
            send: Slot::new("XMLHttpRequest.prototype.send", Arc::new(native_send)),
        }
    }
}

impl fmt::Debug for XhrPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XhrPrototype")
            .field("open", &self.open)
            .field("set_request_header", &self.set_request_header)
            .field("send", &self.send)
            .finish()
    }
}

/// XHR `readyState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ReadyState {
    Unsent = 0,
    Opened = 1,
    HeadersReceived = 2,
    Loading = 3,
    Done = 4,
}

/// XHR `responseType`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XhrResponseType {
    #[default]
    Text,
    Json,
    ArrayBuffer,
    Blob,
    Document,
}

/// XHR `response`, shaped by the response type
#[derive(Debug, Clone, PartialEq)]
pub enum XhrResponse {
    Empty,
    Text(String),
    Json(serde_json::Value),
    Binary(Bytes),
    Document(String),
}

/// Stable identity of an XHR instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct XhrHandle(u64);

static NEXT_XHR: AtomicU64 = AtomicU64::new(1);

/// Completed-response view, independent of the live instance
#[derive(Debug, Clone)]
pub struct XhrSnapshot {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    pub response: XhrResponse,
    pub error: Option<String>,
}

#[derive(Default)]
struct XhrState {
    ready_state: Option<ReadyState>,
    method: Option<String>,
    url: Option<Url>,
    request_headers: Headers,
    send_flag: bool,
    timeout: Option<Duration>,
    response_type: XhrResponseType,
    status: u16,
    status_text: String,
    response_url: Option<Url>,
    response_headers: HeaderMap,
    response_body: Option<Bytes>,
    error: Option<String>,
    handler: Option<ReadyStateHandler>,
    observer: Option<ReadyStateHandler>,
}

struct XhrInner {
    handle: XhrHandle,
    window: Window,
    state: Mutex<XhrState>,
    ready: watch::Sender<ReadyState>,
}

/// An XMLHttpRequest instance
#[derive(Clone)]
pub struct XmlHttpRequest {
    inner: Arc<XhrInner>,
}

/// Non-owning reference to an XHR instance
#[derive(Clone)]
pub struct WeakXhr(Weak<XhrInner>);

impl WeakXhr {
    pub fn upgrade(&self) -> Option<XmlHttpRequest> {
        self.0.upgrade().map(|inner| XmlHttpRequest { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl XmlHttpRequest {
    pub(crate) fn new(window: Window) -> Self {
        let (ready, _) = watch::channel(ReadyState::Unsent);
        Self {
            inner: Arc::new(XhrInner {
                handle: XhrHandle(NEXT_XHR.fetch_add(1, Ordering::Relaxed)),
                window,
                state: Mutex::new(XhrState::default()),
                ready,
            }),
        }
    }

    pub fn handle(&self) -> XhrHandle {
        self.inner.handle
    }

    pub fn downgrade(&self) -> WeakXhr {
        WeakXhr(Arc::downgrade(&self.inner))
    }

    pub fn window(&self) -> &Window {
        &self.inner.window
    }

    /// `xhr.open(method, url)`
    pub fn open(&self, method: &str, url: &str) -> Result<()> {
        let open = self.window().xhr_prototype().open.get();
        open(self, method, url)
    }

    /// `xhr.setRequestHeader(name, value)`
    pub fn set_request_header(&self, name: &str, value: &str) -> Result<()> {
        let set_header = self.window().xhr_prototype().set_request_header.get();
        set_header(self, name, value)
    }

    /// `xhr.send(body)`
    pub fn send(&self, body: Option<RequestBody>) -> Result<()> {
        let send = self.window().xhr_prototype().send.get();
        send(self, body)
    }

    pub fn on_ready_state_change(&self) -> Option<ReadyStateHandler> {
        self.inner.state.lock().handler.clone()
    }

    pub fn set_on_ready_state_change(&self, handler: Option<ReadyStateHandler>) {
        self.inner.state.lock().handler = handler;
    }

    pub fn ready_state(&self) -> ReadyState {
        self.inner
            .state
            .lock()
            .ready_state
            .unwrap_or(ReadyState::Unsent)
    }

    /// Whether `send()` has dispatched and not yet completed
    pub fn is_sent(&self) -> bool {
        self.inner.state.lock().send_flag
    }

    pub fn request_method(&self) -> Option<String> {
        self.inner.state.lock().method.clone()
    }

    pub fn request_url(&self) -> Option<Url> {
        self.inner.state.lock().url.clone()
    }

    pub fn request_headers(&self) -> Headers {
        self.inner.state.lock().request_headers.clone()
    }

    pub fn set_timeout(&self, timeout: Option<Duration>) {
        self.inner.state.lock().timeout = timeout;
    }

    pub fn response_type(&self) -> XhrResponseType {
        self.inner.state.lock().response_type
    }

    pub fn set_response_type(&self, response_type: XhrResponseType) -> Result<()> {
        let mut state = self.inner.state.lock();
        if matches!(
            state.ready_state,
            Some(ReadyState::Loading) | Some(ReadyState::Done)
        ) {
            return Err(Error::invalid_state(
                "responseType cannot be changed once loading has started",
            ));
        }
        state.response_type = response_type;
        Ok(())
    }

    pub fn status(&self) -> u16 {
        self.inner.state.lock().status
    }

    pub fn status_text(&self) -> String {
        self.inner.state.lock().status_text.clone()
    }

    pub fn response_url(&self) -> Option<Url> {
        self.inner.state.lock().response_url.clone()
    }

    /// Network error that ended the request, if any
    pub fn error(&self) -> Option<String> {
        self.inner.state.lock().error.clone()
    }

    pub fn get_response_header(&self, name: &str) -> Option<String> {
        let state = self.inner.state.lock();
        let values: Vec<&str> = state
            .response_headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    /// `name: value\r\n` lines, as `getAllResponseHeaders()` returns them
    pub fn get_all_response_headers(&self) -> String {
        let state = self.inner.state.lock();
        Headers::from_header_map(&state.response_headers)
            .iter()
            .map(|(name, value)| format!("{}: {}\r\n", name, value))
            .collect()
    }

    /// `xhr.response`
    pub fn response(&self) -> XhrResponse {
        let state = self.inner.state.lock();
        shape_response(state.response_type, state.response_body.as_ref())
    }

    /// `xhr.responseText`
    pub fn response_text(&self) -> Result<String> {
        let state = self.inner.state.lock();
        if state.response_type != XhrResponseType::Text {
            return Err(Error::invalid_state(
                "responseText is only available when responseType is text",
            ));
        }
        Ok(state
            .response_body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default())
    }

    /// Copy of the response as it stands now
    pub fn snapshot(&self) -> XhrSnapshot {
        let state = self.inner.state.lock();
        XhrSnapshot {
            url: state
                .response_url
                .as_ref()
                .or(state.url.as_ref())
                .map(|u| u.to_string())
                .unwrap_or_default(),
            status: state.status,
            status_text: state.status_text.clone(),
            headers: Headers::from_header_map(&state.response_headers),
            response: match shape_response(state.response_type, state.response_body.as_ref()) {
                // unparsable JSON is null to the page, but keep what arrived
                XhrResponse::Empty => state
                    .response_body
                    .as_ref()
                    .filter(|body| !body.is_empty())
                    .map(|body| XhrResponse::Text(String::from_utf8_lossy(body).into_owned()))
                    .unwrap_or(XhrResponse::Empty),
                shaped => shaped,
            },
            error: state.error.clone(),
        }
    }

    /// Resolve once the instance reaches `Done`
    pub async fn wait_for_completion(&self) {
        let mut ready = self.inner.ready.subscribe();
        let _ = ready.wait_for(|state| *state == ReadyState::Done).await;
    }

    /// Hook invoked right after the page's own readiness handler
    pub(crate) fn set_ready_state_observer(&self, observer: Option<ReadyStateHandler>) {
        self.inner.state.lock().observer = observer;
    }

    /// Replace request configuration without firing events
    pub(crate) fn reconfigure(&self, method: &str, url: Url, headers: Headers) {
        let mut state = self.inner.state.lock();
        state.method = Some(method.to_string());
        state.url = Some(url);
        state.request_headers = headers;
    }

    /// End the request as a network failure
    pub(crate) fn fail(&self, message: impl Into<String>) {
        {
            let mut state = self.inner.state.lock();
            state.send_flag = false;
            state.status = 0;
            state.status_text.clear();
            state.response_body = None;
            state.error = Some(message.into());
        }
        self.set_ready_state(ReadyState::Done);
    }

    fn set_ready_state(&self, ready_state: ReadyState) {
        let (handler, observer) = {
            let mut state = self.inner.state.lock();
            state.ready_state = Some(ready_state);
            (state.handler.clone(), state.observer.clone())
        };
        if let Some(handler) = handler {
            handler(self);
        }
        if let Some(observer) = observer {
            observer(self);
        }
        self.inner.ready.send_replace(ready_state);
    }

    fn complete(&self, result: Result<Response>) {
        let mut response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(handle = ?self.handle(), error = %e, "xhr network error");
                self.fail(e.to_string());
                return;
            }
        };

        {
            let mut state = self.inner.state.lock();
            state.status = response.status_code();
            state.status_text = response.status_text().to_string();
            state.response_url = Some(response.url.clone());
            state.response_headers = response.headers.clone();
        }
        self.set_ready_state(ReadyState::HeadersReceived);

        let body = response.bytes().ok();
        self.inner.state.lock().response_body = body;
        self.set_ready_state(ReadyState::Loading);

        self.inner.state.lock().send_flag = false;
        self.set_ready_state(ReadyState::Done);
    }
}

impl fmt::Debug for XmlHttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlHttpRequest")
            .field("handle", &self.inner.handle)
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

fn shape_response(response_type: XhrResponseType, body: Option<&Bytes>) -> XhrResponse {
    let Some(body) = body else {
        return XhrResponse::Empty;
    };
    match response_type {
        XhrResponseType::Text => XhrResponse::Text(String::from_utf8_lossy(body).into_owned()),
        XhrResponseType::Json => serde_json::from_slice(body)
            .map(XhrResponse::Json)
            .unwrap_or(XhrResponse::Empty),
        XhrResponseType::ArrayBuffer | XhrResponseType::Blob => XhrResponse::Binary(body.clone()),
        XhrResponseType::Document => {
            XhrResponse::Document(String::from_utf8_lossy(body).into_owned())
        }
    }
}

fn native_open(xhr: &XmlHttpRequest, method: &str, url: &str) -> Result<()> {
    let method = parse_method(method)?;
    let url = xhr.window().resolve_url(url)?;
    {
        let mut state = xhr.inner.state.lock();
        state.method = Some(method.to_string());
        state.url = Some(url);
        state.request_headers = Headers::new();
        state.send_flag = false;
        state.status = 0;
        state.status_text.clear();
        state.response_url = None;
        state.response_headers = HeaderMap::new();
        state.response_body = None;
        state.error = None;
    }
    xhr.set_ready_state(ReadyState::Opened);
    Ok(())
}

fn native_set_request_header(xhr: &XmlHttpRequest, name: &str, value: &str) -> Result<()> {
    let mut state = xhr.inner.state.lock();
    if state.ready_state != Some(ReadyState::Opened) || state.send_flag {
        return Err(Error::invalid_state(NOT_OPENED));
    }
    state.request_headers.append(name, value);
    Ok(())
}

fn native_send(xhr: &XmlHttpRequest, body: Option<RequestBody>) -> Result<()> {
    let request = {
        let mut state = xhr.inner.state.lock();
        if state.ready_state != Some(ReadyState::Opened) {
            return Err(Error::invalid_state(NOT_OPENED));
        }
        if state.send_flag {
            return Err(Error::invalid_state(SEND_ALREADY_CALLED));
        }
        let method = normalize_method(state.method.as_deref().unwrap_or("GET"));
        let url = state
            .url
            .clone()
            .ok_or_else(|| Error::invalid_state(NOT_OPENED))?;

        let mut request = Request::from_url(parse_method(&method)?, url);
        request.headers = state.request_headers.to_header_map();
        if state.timeout.is_some() {
            request.timeout = state.timeout;
        }
        if !matches!(method.as_str(), "GET" | "HEAD") {
            if let Some(body) = body {
                let encoded = body.encode();
                if let Some(content_type) = encoded.content_type {
                    if !request.headers.contains_key(header_names::CONTENT_TYPE) {
                        if let Ok(value) = HeaderValue::from_str(&content_type) {
                            request.headers.insert(header_names::CONTENT_TYPE, value);
                        }
                    }
                }
                request.body = Some(encoded.bytes);
            }
        }
        state.send_flag = true;
        request
    };

    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|_| Error::invalid_state("send() requires a running async runtime"))?;
    let transport = xhr.window().transport();
    let xhr = xhr.clone();
    tracing::trace!(method = %request.method, url = %request.url, "xhr send");
    runtime.spawn(async move {
        let result = transport.execute(request).await;
        xhr.complete(result);
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::stub::StubTransport;

    fn window(transport: Arc<StubTransport>) -> Window {
        Window::new("https://app.example.com/page", transport).unwrap()
    }

    #[tokio::test]
    async fn test_snapshot_keeps_unparsable_json_as_text() {
        let xhr = window(StubTransport::ok("not json", "application/json")).new_xhr();
        xhr.open("GET", "/api").unwrap();
        xhr.set_response_type(XhrResponseType::Json).unwrap();
        xhr.send(None).unwrap();
        xhr.wait_for_completion().await;

        assert_eq!(xhr.response(), XhrResponse::Empty);
        assert_eq!(xhr.snapshot().response, XhrResponse::Text("not json".into()));
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let transport = StubTransport::ok("{\"n\":1}", "application/json");
        let xhr = window(transport.clone()).new_xhr();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        xhr.set_on_ready_state_change(Some(Arc::new(move |x: &XmlHttpRequest| {
            sink.lock().push(x.ready_state());
        })));

        xhr.open("post", "/api/save").unwrap();
        xhr.set_request_header("X-A", "1").unwrap();
        xhr.set_request_header("X-A", "2").unwrap();
        xhr.set_response_type(XhrResponseType::Json).unwrap();
        xhr.send(Some("payload".into())).unwrap();
        xhr.wait_for_completion().await;

        assert_eq!(xhr.status(), 200);
        assert_eq!(xhr.response(), XhrResponse::Json(serde_json::json!({"n": 1})));
        assert_eq!(
            *seen.lock(),
            vec![
                ReadyState::Opened,
                ReadyState::HeadersReceived,
                ReadyState::Loading,
                ReadyState::Done
            ]
        );

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, reqwest::Method::POST);
        assert_eq!(sent.url.as_str(), "https://app.example.com/api/save");
        assert_eq!(sent.headers.get("x-a").unwrap(), "1, 2");
        assert_eq!(sent.body.as_deref(), Some(&b"payload"[..]));
    }

    #[tokio::test]
    async fn test_send_before_open_is_invalid() {
        let xhr = window(StubTransport::ok("", "text/plain")).new_xhr();
        assert!(matches!(xhr.send(None), Err(Error::InvalidState(_))));
        assert!(matches!(
            xhr.set_request_header("a", "b"),
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_double_send_is_invalid() {
        let xhr = window(StubTransport::ok("", "text/plain")).new_xhr();
        xhr.open("GET", "/x").unwrap();
        xhr.send(None).unwrap();
        assert!(matches!(xhr.send(None), Err(Error::InvalidState(_))));
        xhr.wait_for_completion().await;
    }

    #[tokio::test]
    async fn test_network_error_finishes_with_status_zero() {
        let xhr = window(StubTransport::failing("connection refused")).new_xhr();
        xhr.open("GET", "/x").unwrap();
        xhr.send(None).unwrap();
        xhr.wait_for_completion().await;

        assert_eq!(xhr.ready_state(), ReadyState::Done);
        assert_eq!(xhr.status(), 0);
        assert!(xhr.error().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_get_body_is_dropped() {
        let transport = StubTransport::ok("ok", "text/plain");
        let xhr = window(transport.clone()).new_xhr();
        xhr.open("GET", "/x").unwrap();
        xhr.send(Some("ignored".into())).unwrap();
        xhr.wait_for_completion().await;

        assert!(transport.requests()[0].body.is_none());
        assert_eq!(xhr.response_text().unwrap(), "ok");
        assert_eq!(
            xhr.get_response_header("Content-Type").as_deref(),
            Some("text/plain")
        );
    }
}
