// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! # Wiretap - Page Network Interception
//!
//! Observes and rewrites the outbound calls a hosted page makes, whichever
//! way it makes them: `fetch`, XMLHttpRequest or a plain form submission.
//! Each call becomes a canonical [`RequestRecord`] that request middlewares
//! can inspect and mutate before it is dispatched; each completion becomes a
//! [`ResponseRecord`] handed to response middlewares off the caller's path.
//!
//! ## Features
//!
//! - Three fetch patching strategies: transparent wrap, static replacement
//!   and accessor indirection (the default, survives page-level wrappers)
//! - XHR prototype patching with a weak per-instance side table
//! - Form submission replay, immediate or holding back native navigation
//! - Exact restoration of every patched slot on uninstall
//! - Middleware failures contained and reported, never surfaced to the page
//!
//! ## Example
//!
//! ```rust,no_run
//! use wiretap::{request_fn, response_fn, HttpClient, InterceptOptions, Interceptor, Window};
//! use wiretap::page::FetchInit;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let window = Window::with_client("https://example.com/", HttpClient::new()?)?;
//!     let interceptor = Interceptor::new(window.clone());
//!
//!     interceptor.add_request_middleware(
//!         request_fn(|request| async move {
//!             request.update(|r| r.headers.insert("x-scan-id", "42"));
//!             Ok(())
//!         }),
//!         Some("tag"),
//!     )?;
//!     interceptor.add_response_middleware(
//!         response_fn(|response, _request| async move {
//!             println!("{} {}", response.status, response.url);
//!             Ok(())
//!         }),
//!         None,
//!     )?;
//!     interceptor.install(InterceptOptions::default());
//!
//!     window.fetch("/api/items", FetchInit::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod http;
pub mod network;
pub mod page;

// Errors
pub use error::{Error, ErrorContext, Result};

// HTTP
pub use http::{Headers, HttpClient, HttpClientConfig, Request, Response, Transport};

// Interception
pub use network::{
    request_fn, response_fn, CallSurface, FetchStrategyKind, InstallReport, InterceptFailure,
    InterceptOptions, Interceptor, PartialOptions, RequestHandle, RequestMiddleware,
    RequestRecord, ResponseMiddleware, ResponseRecord,
};
pub use network::{AuthHeaderInjector, RequestLogger};

// Page
pub use page::{FormElement, Window, XmlHttpRequest};

/// Wiretap version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
