// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Request interception across fetch, XHR and form submission
//!
//! Every outbound call is turned into a [`RequestRecord`], passed through the
//! registered request middlewares before it leaves, and its completion is
//! handed to the response middlewares as a [`ResponseRecord`].

pub mod canonical;
pub mod strategy;

mod builtin;
mod config;
mod interceptor;
mod lifecycle;
mod middleware;
mod pipeline;
mod record;

pub use builtin::{AuthHeaderInjector, HeaderEntry, RequestLogger};
pub use config::{FetchStrategyKind, InterceptOptions, PartialOptions};
pub use interceptor::{InstallReport, Interceptor, SkippedSurface};
pub use lifecycle::{PatchHandle, PatchSet};
pub use middleware::{
    request_fn, response_fn, MiddlewareIds, MiddlewarePhase, MiddlewareRegistry, RequestFn,
    RequestMiddleware, ResponseFn, ResponseMiddleware,
};
pub use pipeline::{ErrorReporter, FailureKind, InterceptFailure, Pipeline};
pub use record::{monotonic_now, CallSurface, RequestHandle, RequestRecord, ResponseRecord};
