// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Normalization of surface-specific calls into canonical records
//!
//! Fetch, XHR and form submission each describe a request differently. The
//! builders here turn all of them into the same [`RequestRecord`] /
//! [`ResponseRecord`] shape, so middlewares never branch on the surface.

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

use super::record::{monotonic_now, CallSurface, RequestRecord, ResponseRecord};
use crate::http::{header_names, Headers, Response};
use crate::page::{
    normalize_method, parse_method, FetchInit, FetchInput, FormSubmission, RequestBody,
    XhrResponse, XhrSnapshot, URLENCODED_CONTENT_TYPE,
};

/// Body placeholder for payloads that are not text
pub const BINARY_BODY: &str = "[binary data]";
/// Body placeholder for document responses
pub const DOCUMENT_BODY: &str = "[document]";

/// Body placeholder when reading the payload failed
pub fn body_unavailable(reason: impl std::fmt::Display) -> String {
    format!("[body unavailable: {}]", reason)
}

lazy_static! {
    static ref BOUNDARY_RE: Regex = Regex::new(r"boundary=([^;]+)").unwrap();
}

/// Boundary parameter of a multipart content type
pub fn multipart_boundary(content_type: &str) -> Option<String> {
    BOUNDARY_RE
        .captures(content_type)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().trim_matches('"').to_string())
}

/// Surface-specific description of an outgoing call
#[derive(Debug, Clone, Copy)]
pub enum RawCall<'a> {
    Fetch {
        input: &'a FetchInput,
        init: &'a FetchInit,
    },
    Xhr {
        method: &'a str,
        url: &'a str,
        headers: &'a Headers,
        body: Option<&'a RequestBody>,
    },
    Form(&'a FormSubmission),
}

/// Surface-specific completed response, already detached from the caller's
#[derive(Debug)]
pub enum RawResponse {
    Fetch(Response),
    Xhr(XhrSnapshot),
}

/// Absolute URLs pass through untouched, anything else is joined to `base`
pub fn resolve_url(raw: &str, base: &Url) -> String {
    if Url::parse(raw).is_ok() {
        return raw.to_string();
    }
    match base.join(raw) {
        Ok(url) => url.into(),
        Err(e) => {
            tracing::debug!(url = raw, error = %e, "could not resolve request URL");
            raw.to_string()
        }
    }
}

/// Build the canonical record for an outgoing call
pub fn build_request_record(call: RawCall<'_>, base: &Url) -> RequestRecord {
    let mut record = match call {
        RawCall::Fetch { input, init } => fetch_record(input, init, base),
        RawCall::Xhr {
            method,
            url,
            headers,
            body,
        } => {
            let mut record =
                RequestRecord::new(CallSurface::Xhr, resolve_url(url, base), normalize_method(method));
            record.headers = headers.clone();
            record.body = body.cloned();
            record
        }
        RawCall::Form(submission) => form_record(submission, base),
    };
    materialize_body(&mut record);
    record
}

fn fetch_record(input: &FetchInput, init: &FetchInit, base: &Url) -> RequestRecord {
    let (url, method, headers, body) = match input {
        FetchInput::Url(url) => (resolve_url(url, base), None, Headers::new(), None),
        FetchInput::Request(request) => (
            request.url.to_string(),
            Some(request.method.to_string()),
            Headers::from_header_map(&request.headers),
            request.body.clone().map(RequestBody::Bytes),
        ),
    };

    let method = init
        .method
        .as_deref()
        .map(normalize_method)
        .or(method)
        .unwrap_or_else(|| "GET".to_string());

    let mut record = RequestRecord::new(CallSurface::Fetch, url, method);
    record.headers = init.headers.clone().unwrap_or(headers);
    record.body = init.body.clone().or(body);
    record
}

fn form_record(submission: &FormSubmission, base: &Url) -> RequestRecord {
    let action = resolve_url(&submission.action, base);
    if submission.is_get() {
        return RequestRecord::new(CallSurface::Form, append_query(&action, submission), "GET");
    }

    // replays always go out url-encoded, whatever the form's enctype
    let mut record = RequestRecord::new(CallSurface::Form, action, "POST");
    record.body = Some(RequestBody::UrlEncoded(submission.fields.clone()));
    record
}

/// GET submissions carry their fields in the query, after any existing one
fn append_query(action: &str, submission: &FormSubmission) -> String {
    if submission.fields.is_empty() {
        return action.to_string();
    }
    let encoded = submission.encoded_fields();
    match Url::parse(action) {
        Ok(mut url) => {
            let query = match url.query().filter(|q| !q.is_empty()) {
                Some(existing) => format!("{}&{}", existing, encoded),
                None => encoded,
            };
            url.set_query(Some(&query));
            url.into()
        }
        Err(_) => {
            let separator = if action.contains('?') { '&' } else { '?' };
            format!("{}{}{}", action, separator, encoded)
        }
    }
}

/// Turn structured bodies into the text they will be sent as
///
/// Multipart bodies get their boundary reflected into the content type so
/// middlewares see exactly what goes on the wire.
fn materialize_body(record: &mut RequestRecord) {
    match record.body.take() {
        Some(RequestBody::FormData(form)) => {
            let encoded = form.encode();
            let boundary = encoded
                .content_type
                .as_deref()
                .and_then(multipart_boundary);
            match boundary {
                Some(boundary) => {
                    record.headers.insert(
                        header_names::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={}", boundary),
                    );
                }
                None => tracing::debug!(id = %record.id, "multipart body without boundary"),
            }
            record.body = Some(match String::from_utf8(encoded.bytes.to_vec()) {
                Ok(text) => RequestBody::Text(text),
                Err(_) => RequestBody::Bytes(encoded.bytes),
            });
        }
        Some(body @ RequestBody::UrlEncoded(_)) => {
            let encoded = body.encode();
            if !record.headers.contains(header_names::CONTENT_TYPE) {
                record
                    .headers
                    .insert(header_names::CONTENT_TYPE, URLENCODED_CONTENT_TYPE);
            }
            record.body = Some(RequestBody::Text(
                String::from_utf8_lossy(&encoded.bytes).into_owned(),
            ));
        }
        other => record.body = other,
    }
}

/// Repair fields a middleware left unusable
///
/// A URL changed into something that no longer parses as absolute, or a
/// method changed into an invalid token, falls back to the value from before
/// the middlewares ran. Returns a description of each repair.
pub(crate) fn sanitize(record: &mut RequestRecord, original: &RequestRecord) -> Vec<String> {
    let mut problems = Vec::new();

    if record.id != original.id || record.source != original.source {
        problems.push(format!("request identity cannot change; keeping '{}'", original.id));
        record.id = original.id.clone();
        record.source = original.source;
    }

    if record.url != original.url {
        if let Err(e) = Url::parse(&record.url) {
            problems.push(format!(
                "url '{}' is not absolute ({}); keeping '{}'",
                record.url, e, original.url
            ));
            record.url = original.url.clone();
        }
    }

    if record.method != original.method {
        match parse_method(&record.method) {
            Ok(method) => record.method = method.to_string(),
            Err(_) => {
                problems.push(format!(
                    "method '{}' is invalid; keeping '{}'",
                    record.method, original.method
                ));
                record.method = original.method.clone();
            }
        }
    }

    let illegal_body = |r: &RequestRecord| r.body.is_some() && matches!(r.method.as_str(), "GET" | "HEAD");
    if illegal_body(&*record) && !illegal_body(original) {
        problems.push(format!("{} request cannot carry a body; dropping it", record.method));
        record.body = None;
    }

    materialize_body(record);
    problems
}

/// Build the canonical record for a completed response
pub fn build_response_record(raw: RawResponse, request_id: Option<String>) -> ResponseRecord {
    match raw {
        RawResponse::Fetch(mut response) => {
            let body = read_body(&mut response);
            ResponseRecord {
                request_id,
                source: CallSurface::Fetch,
                url: response.url.to_string(),
                status: response.status_code(),
                status_text: response.status_text().to_string(),
                headers: Headers::from_header_map(&response.headers),
                body,
                timestamp: monotonic_now(),
                captured_at: Utc::now(),
            }
        }
        RawResponse::Xhr(snapshot) => {
            let body = match (&snapshot.error, snapshot.response) {
                (Some(error), _) => body_unavailable(error),
                (None, XhrResponse::Empty) => String::new(),
                (None, XhrResponse::Text(text)) => text,
                (None, XhrResponse::Json(value)) => value.to_string(),
                (None, XhrResponse::Binary(_)) => BINARY_BODY.to_string(),
                (None, XhrResponse::Document(_)) => DOCUMENT_BODY.to_string(),
            };
            ResponseRecord {
                request_id,
                source: CallSurface::Xhr,
                url: snapshot.url,
                status: snapshot.status,
                status_text: snapshot.status_text,
                headers: snapshot.headers,
                body,
                timestamp: monotonic_now(),
                captured_at: Utc::now(),
            }
        }
    }
}

fn read_body(response: &mut Response) -> String {
    let textual = response
        .content_type()
        .map(is_textual_content_type)
        .unwrap_or(false);
    match response.bytes() {
        Ok(bytes) => classify_body(&bytes, textual),
        Err(e) => body_unavailable(e),
    }
}

/// Text for textual payloads, the binary sentinel for everything else
pub fn classify_body(bytes: &[u8], textual: bool) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if textual || !text.is_empty() => text.to_string(),
        Ok(_) => BINARY_BODY.to_string(),
        Err(_) if textual => String::from_utf8_lossy(bytes).into_owned(),
        Err(_) => BINARY_BODY.to_string(),
    }
}

/// Content types whose bodies are read as text
pub fn is_textual_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("text/")
        || essence == "application/json"
        || essence == "application/javascript"
        || essence == "application/ecmascript"
        || essence == "application/x-www-form-urlencoded"
        || essence == "application/xml"
        || essence == "image/svg+xml"
        || essence.ends_with("+json")
        || essence.ends_with("+xml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::stub::response;
    use crate::http::Request;
    use crate::page::FormData;

    fn base() -> Url {
        Url::parse("https://app.example.com/section/page").unwrap()
    }

    #[test]
    fn test_absolute_url_passes_through_unchanged() {
        assert_eq!(
            resolve_url("https://Other.example.com/x?y=1", &base()),
            "https://Other.example.com/x?y=1"
        );
        assert_eq!(
            resolve_url("../api", &base()),
            "https://app.example.com/api"
        );
    }

    #[test]
    fn test_root_relative_url() {
        let page = Url::parse("https://example.com/app/").unwrap();
        assert_eq!(resolve_url("/api/x", &page), "https://example.com/api/x");
    }

    #[test]
    fn test_fetch_string_input() {
        let input = FetchInput::from("items?page=2");
        let init = FetchInit::new().method("put").header("X-Token", "t").body("{}");
        let record = build_request_record(RawCall::Fetch { input: &input, init: &init }, &base());

        assert_eq!(record.source, CallSurface::Fetch);
        assert_eq!(record.url, "https://app.example.com/section/items?page=2");
        assert_eq!(record.method, "PUT");
        assert_eq!(record.headers.get("x-token"), Some("t"));
        assert_eq!(record.body_text(), Some("{}"));
    }

    #[test]
    fn test_fetch_request_input_uses_request_fields() {
        let request = Request::post("https://api.example.com/v1")
            .unwrap()
            .header("Accept", "application/json")
            .body("data");
        let input = FetchInput::from(request);
        let init = FetchInit::new();
        let record = build_request_record(RawCall::Fetch { input: &input, init: &init }, &base());

        assert_eq!(record.url, "https://api.example.com/v1");
        assert_eq!(record.method, "POST");
        assert_eq!(record.headers.get("accept"), Some("application/json"));
        assert!(matches!(record.body, Some(RequestBody::Bytes(_))));
    }

    #[test]
    fn test_multipart_boundary_is_reflected() {
        let input = FetchInput::from("/upload");
        let init = FetchInit::new()
            .method("POST")
            .header("Content-Type", "text/plain")
            .body(FormData::new().append("field", "value"));
        let record = build_request_record(RawCall::Fetch { input: &input, init: &init }, &base());

        let content_type = record.content_type().unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        let boundary = multipart_boundary(content_type).unwrap();
        let body = record.body_text().unwrap();
        assert!(body.starts_with(&format!("--{}\r\n", boundary)));
        assert!(body.contains("name=\"field\"\r\n\r\nvalue"));
    }

    #[test]
    fn test_xhr_record() {
        let mut headers = Headers::new();
        headers.insert("X-Requested-With", "XMLHttpRequest");
        let body = RequestBody::UrlEncoded(vec![("a".into(), "1".into())]);
        let record = build_request_record(
            RawCall::Xhr {
                method: "post",
                url: "/save",
                headers: &headers,
                body: Some(&body),
            },
            &base(),
        );

        assert_eq!(record.source, CallSurface::Xhr);
        assert_eq!(record.url, "https://app.example.com/save");
        assert_eq!(record.body_text(), Some("a=1"));
        assert_eq!(record.content_type(), Some(URLENCODED_CONTENT_TYPE));
        assert_eq!(record.headers.get("x-requested-with"), Some("XMLHttpRequest"));
    }

    fn submission(method: &str, action: &str) -> FormSubmission {
        FormSubmission {
            method: method.to_string(),
            action: action.to_string(),
            enctype: crate::page::ENCTYPE_URLENCODED.to_string(),
            fields: vec![
                ("q".to_string(), "a b".to_string()),
                ("n".to_string(), "1".to_string()),
            ],
        }
    }

    #[test]
    fn test_get_form_appends_to_existing_query() {
        let plain = build_request_record(RawCall::Form(&submission("GET", "/search")), &base());
        assert_eq!(plain.url, "https://app.example.com/search?q=a+b&n=1");
        assert!(plain.body.is_none());

        let with_query =
            build_request_record(RawCall::Form(&submission("GET", "/search?lang=fi")), &base());
        assert_eq!(with_query.url, "https://app.example.com/search?lang=fi&q=a+b&n=1");
    }

    #[test]
    fn test_post_form_sends_urlencoded_body() {
        let record = build_request_record(RawCall::Form(&submission("POST", "/login")), &base());
        assert_eq!(record.method, "POST");
        assert_eq!(record.url, "https://app.example.com/login");
        assert_eq!(record.body_text(), Some("q=a+b&n=1"));
        assert_eq!(record.content_type(), Some(URLENCODED_CONTENT_TYPE));
    }

    #[test]
    fn test_post_form_replays_urlencoded_for_any_enctype() {
        for enctype in [crate::page::ENCTYPE_MULTIPART, crate::page::ENCTYPE_TEXT_PLAIN] {
            let mut form = submission("POST", "/upload");
            form.enctype = enctype.to_string();
            let record = build_request_record(RawCall::Form(&form), &base());
            assert_eq!(record.body_text(), Some("q=a+b&n=1"), "{}", enctype);
            assert_eq!(record.content_type(), Some(URLENCODED_CONTENT_TYPE), "{}", enctype);
        }
    }

    #[test]
    fn test_sanitize_keeps_identity() {
        let original = RequestRecord::new(CallSurface::Xhr, "https://a.test/x", "GET");
        let mut mutated = original.clone();
        mutated.id = "hijacked".to_string();
        mutated.source = CallSurface::Form;

        assert_eq!(sanitize(&mut mutated, &original).len(), 1);
        assert_eq!(mutated.id, original.id);
        assert_eq!(mutated.source, CallSurface::Xhr);
    }

    #[test]
    fn test_sanitize_reverts_unusable_fields() {
        let original = RequestRecord::new(CallSurface::Fetch, "https://a.test/x", "POST");
        let mut mutated = original.clone();
        mutated.url = "relative/path".to_string();
        mutated.method = "BAD METHOD".to_string();

        let problems = sanitize(&mut mutated, &original);
        assert_eq!(problems.len(), 2);
        assert_eq!(mutated.url, "https://a.test/x");
        assert_eq!(mutated.method, "POST");

        let mut lowercase = original.clone();
        lowercase.method = "patch".to_string();
        assert!(sanitize(&mut lowercase, &original).is_empty());
        assert_eq!(lowercase.method, "PATCH");
    }

    #[test]
    fn test_body_classification() {
        assert_eq!(classify_body(b"{\"a\":1}", true), "{\"a\":1}");
        assert_eq!(classify_body(b"", true), "");
        assert_eq!(classify_body(b"", false), BINARY_BODY);
        assert_eq!(classify_body(&[0xff, 0xfe, 0x00], false), BINARY_BODY);
        assert_eq!(classify_body(b"plain", false), "plain");
        assert!(is_textual_content_type("application/problem+json; charset=utf-8"));
        assert!(!is_textual_content_type("image/png"));
    }

    #[test]
    fn test_fetch_response_record() {
        let request = Request::get("https://app.example.com/data").unwrap();
        let raw = response(201, "application/json", b"{\"id\":7}", &request);
        let record = build_response_record(RawResponse::Fetch(raw), Some("req_1".into()));

        assert_eq!(record.request_id.as_deref(), Some("req_1"));
        assert_eq!(record.status, 201);
        assert_eq!(record.status_text, "Created");
        assert_eq!(record.body, "{\"id\":7}");
        assert_eq!(record.url, "https://app.example.com/data");
    }

    #[test]
    fn test_consumed_response_gets_sentinel() {
        let request = Request::get("https://app.example.com/data").unwrap();
        let raw = response(200, "text/plain", b"x", &request).head_only();
        let record = build_response_record(RawResponse::Fetch(raw), None);
        assert!(record.body.starts_with("[body unavailable: "));
    }

    #[test]
    fn test_xhr_response_shapes() {
        let snapshot = |response| XhrSnapshot {
            url: "https://a.test/".into(),
            status: 200,
            status_text: "OK".into(),
            headers: Headers::new(),
            response,
            error: None,
        };
        let body = |r| build_response_record(RawResponse::Xhr(snapshot(r)), None).body;

        assert_eq!(body(XhrResponse::Binary(bytes::Bytes::from_static(b"\x00"))), BINARY_BODY);
        assert_eq!(body(XhrResponse::Document("<p/>".into())), DOCUMENT_BODY);
        assert_eq!(body(XhrResponse::Json(serde_json::json!({"k": [1]}))), "{\"k\":[1]}");
        assert_eq!(body(XhrResponse::Text("hi".into())), "hi");
    }
}
