// Copyright (c) 2026 Bountyy Oy. All rights reserved.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use url::Url;
use wiretap::network::canonical::{build_request_record, build_response_record, RawCall, RawResponse};
use wiretap::page::{FetchInit, FetchInput, FormData, FormSubmission, XhrResponse, XhrSnapshot};
use wiretap::Headers;

fn request_record_benchmark(c: &mut Criterion) {
    let base = Url::parse("https://app.example.com/dashboard/").unwrap();
    let input = FetchInput::from("api/items?page=2");
    let init = FetchInit::new()
        .method("post")
        .header("Content-Type", "application/json")
        .body(r#"{"name":"widget","tags":["a","b"]}"#);

    c.bench_function("fetch_request_record", |b| {
        b.iter(|| {
            black_box(build_request_record(
                RawCall::Fetch {
                    input: &input,
                    init: &init,
                },
                &base,
            ))
        })
    });

    let multipart = FetchInit::new().method("POST").body(
        FormData::new()
            .append("title", "report")
            .append_file("upload", "a.txt", "text/plain", "hello world"),
    );
    c.bench_function("multipart_request_record", |b| {
        b.iter(|| {
            black_box(build_request_record(
                RawCall::Fetch {
                    input: &input,
                    init: &multipart,
                },
                &base,
            ))
        })
    });

    let submission = FormSubmission {
        method: "GET".to_string(),
        action: "https://app.example.com/search?lang=en".to_string(),
        enctype: "application/x-www-form-urlencoded".to_string(),
        fields: vec![
            ("q".to_string(), "rust async".to_string()),
            ("page".to_string(), "1".to_string()),
        ],
    };
    c.bench_function("form_request_record", |b| {
        b.iter(|| black_box(build_request_record(RawCall::Form(&submission), &base)))
    });
}

fn response_record_benchmark(c: &mut Criterion) {
    let mut headers = Headers::new();
    headers.insert("Content-Type", "application/json");
    let snapshot = XhrSnapshot {
        url: "https://app.example.com/api/items".to_string(),
        status: 200,
        status_text: "OK".to_string(),
        headers,
        response: XhrResponse::Text(r#"{"items":[1,2,3]}"#.repeat(64)),
        error: None,
    };

    c.bench_function("xhr_response_record", |b| {
        b.iter(|| {
            black_box(build_response_record(
                RawResponse::Xhr(snapshot.clone()),
                Some("req_1".to_string()),
            ))
        })
    });
}

criterion_group!(benches, request_record_benchmark, response_record_benchmark);
criterion_main!(benches);
