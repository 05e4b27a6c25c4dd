// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! The page's fetch surface
//!
//! Page code calls `window.fetch(input, init)`; what actually answers is
//! whatever [`FetchHandler`] currently sits in the window's fetch slot. On a
//! fresh window that is [`NativeFetch`], which resolves the request against
//! the page location and hands it to the transport.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::RwLock;
use reqwest::header::HeaderValue;
use reqwest::Method;
use serde::Serialize;
use url::Url;

use crate::error::{Error, Result};
use crate::http::{header_names, Headers, Request, Response, Transport};

/// Shared handle to a fetch implementation
pub type FetchFn = Arc<dyn FetchHandler>;

/// Something that can stand in the window's fetch slot
#[async_trait]
pub trait FetchHandler: Send + Sync {
    /// Perform the fetch
    async fn call(&self, input: FetchInput, init: FetchInit) -> Result<Response>;

    /// Identity the handler presents to page code
    fn name(&self) -> &str {
        "fetch"
    }

    /// Implementation this handler forwards to when it is an interception
    /// wrapper, `None` for everything else
    fn intercepted_target(&self) -> Option<FetchFn> {
        None
    }
}

/// Whether two handles point at the same handler
pub fn same_handler(a: &FetchFn, b: &FetchFn) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const u8, Arc::as_ptr(b) as *const u8)
}

/// Peel interception wrappers off `handler`
pub fn unwrap_intercepted(handler: FetchFn) -> FetchFn {
    let mut current = handler;
    while let Some(target) = current.intercepted_target() {
        current = target;
    }
    current
}

/// First argument of a fetch call
#[derive(Debug, Clone)]
pub enum FetchInput {
    /// URL string, possibly relative
    Url(String),
    /// Pre-built request object
    Request(Request),
}

impl From<&str> for FetchInput {
    fn from(url: &str) -> Self {
        FetchInput::Url(url.to_string())
    }
}

impl From<String> for FetchInput {
    fn from(url: String) -> Self {
        FetchInput::Url(url)
    }
}

impl From<&String> for FetchInput {
    fn from(url: &String) -> Self {
        FetchInput::Url(url.clone())
    }
}

impl From<Url> for FetchInput {
    fn from(url: Url) -> Self {
        FetchInput::Url(url.into())
    }
}

impl From<Request> for FetchInput {
    fn from(request: Request) -> Self {
        FetchInput::Request(request)
    }
}

/// Second argument of a fetch call
#[derive(Debug, Clone, Default)]
pub struct FetchInit {
    pub method: Option<String>,
    pub headers: Option<Headers>,
    pub body: Option<RequestBody>,
    pub timeout: Option<Duration>,
}

impl FetchInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Add a header, creating the header set on first use
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(Headers::new)
            .insert(name, value);
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Request payload as page code hands it over
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RequestBody {
    Text(String),
    Bytes(Bytes),
    FormData(FormData),
    UrlEncoded(Vec<(String, String)>),
}

/// Wire bytes of a body plus the content type it implies
#[derive(Debug, Clone)]
pub struct EncodedBody {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

impl RequestBody {
    /// Text of the body, if it is plain text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RequestBody::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Serialize for the wire
    pub fn encode(&self) -> EncodedBody {
        match self {
            RequestBody::Text(text) => EncodedBody {
                bytes: Bytes::from(text.clone()),
                content_type: Some("text/plain;charset=UTF-8".to_string()),
            },
            RequestBody::Bytes(bytes) => EncodedBody {
                bytes: bytes.clone(),
                content_type: None,
            },
            RequestBody::FormData(form) => form.encode(),
            RequestBody::UrlEncoded(pairs) => EncodedBody {
                bytes: Bytes::from(encode_urlencoded(pairs)),
                content_type: Some(URLENCODED_CONTENT_TYPE.to_string()),
            },
        }
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        RequestBody::Text(text.to_string())
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(bytes))
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Bytes(bytes)
    }
}

impl From<FormData> for RequestBody {
    fn from(form: FormData) -> Self {
        RequestBody::FormData(form)
    }
}

/// Content type of URL-encoded bodies
pub const URLENCODED_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=UTF-8";

/// `k=v&k2=v2` serialization
pub fn encode_urlencoded<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
        .finish()
}

/// Multipart form payload
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormData {
    entries: Vec<(String, FormValue)>,
}

/// One multipart entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FormValue {
    Text(String),
    File {
        filename: String,
        content_type: String,
        #[serde(skip)]
        data: Bytes,
    },
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text entry
    pub fn append(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries
            .push((name.into(), FormValue::Text(value.into())));
        self
    }

    /// Append a file entry
    pub fn append_file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        self.entries.push((
            name.into(),
            FormValue::File {
                filename: filename.into(),
                content_type: content_type.into(),
                data: data.into(),
            },
        ));
        self
    }

    pub fn entries(&self) -> &[(String, FormValue)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode with a fresh boundary
    pub fn encode(&self) -> EncodedBody {
        let boundary = generate_boundary();
        EncodedBody {
            bytes: self.encode_multipart(&boundary),
            content_type: Some(format!("multipart/form-data; boundary={}", boundary)),
        }
    }

    /// Encode as `multipart/form-data` using `boundary`
    pub fn encode_multipart(&self, boundary: &str) -> Bytes {
        let mut out = BytesMut::new();
        for (name, value) in &self.entries {
            out.put_slice(format!("--{}\r\n", boundary).as_bytes());
            match value {
                FormValue::Text(text) => {
                    out.put_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                            escape_quoted(name)
                        )
                        .as_bytes(),
                    );
                    out.put_slice(text.as_bytes());
                }
                FormValue::File {
                    filename,
                    content_type,
                    data,
                } => {
                    out.put_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                            escape_quoted(name),
                            escape_quoted(filename),
                            content_type
                        )
                        .as_bytes(),
                    );
                    out.put_slice(data);
                }
            }
            out.put_slice(b"\r\n");
        }
        out.put_slice(format!("--{}--\r\n", boundary).as_bytes());
        out.freeze()
    }
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

static BOUNDARY_COUNTER: AtomicU64 = AtomicU64::new(0);

fn generate_boundary() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    let n = BOUNDARY_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("----WiretapFormBoundary{:08x}{:08x}", nanos, n)
}

/// Uppercased method, `GET` when blank
pub fn normalize_method(method: &str) -> String {
    let method = method.trim();
    if method.is_empty() {
        "GET".to_string()
    } else {
        method.to_ascii_uppercase()
    }
}

/// Parse a method token, rejecting anything that is not one
pub fn parse_method(method: &str) -> Result<Method> {
    let method = normalize_method(method);
    Method::from_bytes(method.as_bytes())
        .map_err(|_| Error::invalid_request(format!("'{}' is not a valid HTTP method", method)))
}

/// Turn fetch arguments into a transport request
pub(crate) fn build_request(base: &Url, input: FetchInput, init: FetchInit) -> Result<Request> {
    let mut request = match input {
        FetchInput::Url(url) => Request::from_url(Method::GET, base.join(&url)?),
        FetchInput::Request(request) => request,
    };

    if let Some(method) = init.method {
        request.method = parse_method(&method)?;
    }
    if let Some(headers) = init.headers {
        request.headers = headers.to_header_map();
    }
    if let Some(timeout) = init.timeout {
        request.timeout = Some(timeout);
    }
    if let Some(body) = init.body {
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

    if request.body.is_some() && matches!(request.method, Method::GET | Method::HEAD) {
        return Err(Error::invalid_request(
            "Request with GET/HEAD method cannot have body",
        ));
    }

    Ok(request)
}

/// The browser's own fetch
pub struct NativeFetch {
    transport: Arc<dyn Transport>,
    location: Arc<RwLock<Url>>,
}

impl NativeFetch {
    pub fn new(transport: Arc<dyn Transport>, location: Arc<RwLock<Url>>) -> Self {
        Self {
            transport,
            location,
        }
    }
}

#[async_trait]
impl FetchHandler for NativeFetch {
    async fn call(&self, input: FetchInput, init: FetchInit) -> Result<Response> {
        let base = self.location.read().clone();
        let request = build_request(&base, input, init)?;
        tracing::trace!(method = %request.method, url = %request.url, "native fetch");
        self.transport.execute(request).await
    }
}

impl fmt::Debug for NativeFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFetch").finish_non_exhaustive()
    }
}

struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> FetchHandler for FnHandler<F>
where
    F: Fn(FetchInput, FetchInit) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    async fn call(&self, input: FetchInput, init: FetchInit) -> Result<Response> {
        (self.f)(input, init).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Build a fetch handler from a closure, the way page scripts wrap fetch
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> FetchFn
where
    F: Fn(FetchInput, FetchInit) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}
