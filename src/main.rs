// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Wiretap CLI
//!
//! Drives a page's call surfaces against a live URL with interception
//! installed and prints the captured records as JSON.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::sync::mpsc;
use wiretap::network::canonical::{build_request_record, RawCall};
use wiretap::page::FetchInit;
use wiretap::{
    response_fn, FetchStrategyKind, HttpClient, InterceptOptions, Interceptor, RequestLogger,
    RequestRecord, ResponseRecord, Window,
};

/// How long to wait for response middlewares after the call returned
const CAPTURE_WAIT: Duration = Duration::from_secs(5);

type Captured = mpsc::UnboundedReceiver<(ResponseRecord, Arc<RequestRecord>)>;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("wiretap=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_usage();
        return ExitCode::from(1);
    };

    let result = match command.as_str() {
        "fetch" | "xhr" | "forms" => match parse_target(&args[1..]) {
            Ok((url, strategy)) => match command.as_str() {
                "fetch" => capture_fetch(&url, strategy).await,
                "xhr" => capture_xhr(&url, strategy).await,
                _ => list_forms(&url).await,
            },
            Err(e) => Err(e),
        },
        "--help" | "-h" | "help" => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        "--version" | "-v" | "version" => {
            println!("wiretap {}", wiretap::VERSION);
            return ExitCode::SUCCESS;
        }
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            print_usage();
            return ExitCode::from(1);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn print_usage() {
    println!(
        r#"Wiretap - page network interception

USAGE:
    wiretap <COMMAND> <url> [--strategy <kind>]

COMMANDS:
    fetch <url>     Fetch a URL through intercepted fetch, print the records
    xhr <url>       GET a URL through an intercepted XMLHttpRequest
    forms <url>     List the forms on a page and the requests they would make
    help            Show this help message
    version         Show version information

OPTIONS:
    --strategy <kind>   transparent-wrap | static-replace | accessor-indirection

Set RUST_LOG (e.g. RUST_LOG=wiretap=debug) for more detail.
"#
    );
}

fn parse_target(args: &[String]) -> anyhow::Result<(String, FetchStrategyKind)> {
    let mut url = None;
    let mut strategy = FetchStrategyKind::default();
    let mut args = args.iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--strategy" | "-s" => {
                let value = args.next().context("--strategy needs a value")?;
                strategy = value.parse()?;
            }
            other if url.is_none() => url = Some(other.to_string()),
            other => bail!("unexpected argument '{}'", other),
        }
    }
    let url = url.context("missing <url>")?;
    Ok((url, strategy))
}

fn open_window(url: &str) -> anyhow::Result<Window> {
    let client = HttpClient::new().context("failed to create HTTP client")?;
    Window::with_client(url, client).with_context(|| format!("invalid URL '{}'", url))
}

fn intercept(window: &Window, strategy: FetchStrategyKind) -> anyhow::Result<(Interceptor, Captured)> {
    let interceptor = Interceptor::new(window.clone());
    interceptor.add_request_middleware(RequestLogger::default(), Some("log"))?;

    let (tx, rx) = mpsc::unbounded_channel();
    interceptor.add_response_middleware(
        response_fn(move |response, request| {
            let tx = tx.clone();
            async move {
                let _ = tx.send((response, request));
                Ok(())
            }
        }),
        Some("capture"),
    )?;

    let report = interceptor.install(InterceptOptions::default().fetch_strategy(strategy));
    for skipped in &report.skipped {
        tracing::warn!(surface = %skipped.surface, reason = %skipped.reason, "surface not intercepted");
    }
    Ok((interceptor, rx))
}

async fn print_captured(rx: &mut Captured) -> anyhow::Result<()> {
    let (response, request) = tokio::time::timeout(CAPTURE_WAIT, rx.recv())
        .await
        .context("timed out waiting for the response record")?
        .context("response middleware channel closed")?;
    println!("{}", request.to_json()?);
    println!("{}", response.to_json()?);
    Ok(())
}

async fn capture_fetch(url: &str, strategy: FetchStrategyKind) -> anyhow::Result<()> {
    let window = open_window(url)?;
    let (_interceptor, mut rx) = intercept(&window, strategy)?;

    let response = window.fetch(url, FetchInit::new()).await?;
    tracing::info!(status = response.status_code(), "fetch completed");
    print_captured(&mut rx).await
}

async fn capture_xhr(url: &str, strategy: FetchStrategyKind) -> anyhow::Result<()> {
    let window = open_window(url)?;
    let (_interceptor, mut rx) = intercept(&window, strategy)?;

    let xhr = window.new_xhr();
    xhr.open("GET", url)?;
    xhr.send(None)?;
    xhr.wait_for_completion().await;
    if let Some(error) = xhr.error() {
        bail!("request failed: {}", error);
    }
    tracing::info!(status = xhr.status(), "xhr completed");
    print_captured(&mut rx).await
}

async fn list_forms(url: &str) -> anyhow::Result<()> {
    let window = open_window(url)?;
    let html = window.fetch(url, FetchInit::new()).await?.text()?;
    let forms = window.forms_from_html(&html)?;

    if forms.is_empty() {
        eprintln!("No forms found on page");
        return Ok(());
    }

    let base = window.location();
    for form in &forms {
        let submission = form.submission();
        let record = build_request_record(RawCall::Form(&submission), &base);
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "id": form.id(),
                "name": form.name(),
                "submission": submission,
                "request": record,
            }))?
        );
    }
    Ok(())
}
