// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Fetch interception
//!
//! All three strategies put the same [`InterceptedFetch`] wrapper in front of
//! the page's fetch; they differ in how the wrapper is installed and what it
//! looks like to page code:
//!
//! - [`TransparentWrap`] swaps the slot value for a wrapper that presents the
//!   original's name.
//! - [`StaticReplace`] swaps the slot value for a wrapper with its own name.
//! - [`AccessorIndirection`] turns the slot into an accessor pair. Reads
//!   always return one stable wrapper, while assignments by page code are
//!   captured and become the wrapper's dispatch target, so page-level fetch
//!   wrappers keep working and are still intercepted.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use url::Url;

use super::InterceptionStrategy;
use crate::error::{Error, Result};
use crate::http::Response;
use crate::network::canonical::{build_request_record, RawCall, RawResponse};
use crate::network::lifecycle::PatchHandle;
use crate::network::pipeline::Pipeline;
use crate::network::record::{CallSurface, RequestHandle, RequestRecord};
use crate::page::{
    same_handler, Accessor, FetchFn, FetchHandler, FetchInit, FetchInput, SlotState, Window,
};

/// Name the static replacement presents
const STATIC_NAME: &str = "wiretapFetch";

static NEXT_WRAPPER: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static ACTIVE_WRAPPERS: Vec<u64>;
}

/// Whether wrapper `token` is already on the current task's call stack
fn is_reentrant(token: u64) -> bool {
    ACTIVE_WRAPPERS
        .try_with(|active| active.contains(&token))
        .unwrap_or(false)
}

enum Target {
    /// Always dispatch to the implementation captured at install time
    Fixed(FetchFn),
    /// Dispatch to whatever page code last assigned
    Cell {
        current: Arc<RwLock<FetchFn>>,
        installed: FetchFn,
    },
}

impl Target {
    fn current(&self) -> FetchFn {
        match self {
            Target::Fixed(f) => f.clone(),
            Target::Cell { current, .. } => current.read().clone(),
        }
    }

    fn installed(&self) -> FetchFn {
        match self {
            Target::Fixed(f) => f.clone(),
            Target::Cell { installed, .. } => installed.clone(),
        }
    }
}

/// Fetch handler that runs the pipeline around its target
pub(crate) struct InterceptedFetch {
    token: u64,
    name: String,
    target: Target,
    pipeline: Arc<Pipeline>,
    location: Arc<RwLock<Url>>,
}

impl InterceptedFetch {
    fn new(name: String, target: Target, pipeline: &Arc<Pipeline>, window: &Window) -> Self {
        Self {
            token: NEXT_WRAPPER.fetch_add(1, Ordering::Relaxed),
            name,
            target,
            pipeline: pipeline.clone(),
            location: window.location_cell(),
        }
    }

    async fn intercept(&self, input: FetchInput, init: FetchInit) -> Result<Response> {
        let target = self.target.current();
        let base = self.location.read().clone();
        let original = build_request_record(
            RawCall::Fetch {
                input: &input,
                init: &init,
            },
            &base,
        );
        let handle = RequestHandle::new(original.clone());
        self.pipeline.run_request(CallSurface::Fetch, &handle).await;
        let record = self.pipeline.seal(handle, &original);

        let (input, init) = dispatch_args(input, init, &record);
        let response = target.call(input, init).await?;

        let copy = response
            .try_clone()
            .unwrap_or_else(|_| response.head_only());
        self.pipeline.spawn_response(
            CallSurface::Fetch,
            RawResponse::Fetch(copy),
            record.clone(),
            Some(record.id.clone()),
        );
        Ok(response)
    }
}

#[async_trait]
impl FetchHandler for InterceptedFetch {
    async fn call(&self, input: FetchInput, init: FetchInit) -> Result<Response> {
        if is_reentrant(self.token) {
            tracing::trace!(name = %self.name, "re-entrant fetch, bypassing interception");
            return self.target.installed().call(input, init).await;
        }
        let mut active = ACTIVE_WRAPPERS
            .try_with(|active| active.clone())
            .unwrap_or_default();
        active.push(self.token);
        ACTIVE_WRAPPERS
            .scope(active, self.intercept(input, init))
            .await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn intercepted_target(&self) -> Option<FetchFn> {
        Some(self.target.current())
    }
}

impl fmt::Debug for InterceptedFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptedFetch")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Rebuild fetch arguments from the final record
fn dispatch_args(
    input: FetchInput,
    init: FetchInit,
    record: &RequestRecord,
) -> (FetchInput, FetchInit) {
    let input = match input {
        FetchInput::Request(mut request) => {
            if let Ok(url) = Url::parse(&record.url) {
                request.url = url;
            }
            request.body = None;
            FetchInput::Request(request)
        }
        FetchInput::Url(_) => FetchInput::Url(record.url.clone()),
    };
    let init = FetchInit {
        method: Some(record.method.clone()),
        headers: Some(record.headers.clone()),
        body: record.body.clone(),
        timeout: init.timeout,
    };
    (input, init)
}

/// Current fetch, refusing to wrap one that is already intercepted
fn unpatched_fetch(window: &Window) -> Result<FetchFn> {
    let current = window.fetch_slot().get();
    if current.intercepted_target().is_some() {
        return Err(Error::AlreadyInstalled(CallSurface::Fetch));
    }
    Ok(current)
}

fn swap_in(window: &Window, wrapper: FetchFn, strategy: &'static str) -> PatchHandle {
    let prior = window.fetch_slot().replace(SlotState::Value(wrapper));
    let window = window.clone();
    PatchHandle::new(CallSurface::Fetch, strategy, move || {
        window.fetch_slot().replace(prior);
    })
}

/// Wrapper that keeps the original's identity
#[derive(Debug, Default, Clone, Copy)]
pub struct TransparentWrap;

impl InterceptionStrategy for TransparentWrap {
    fn surface(&self) -> CallSurface {
        CallSurface::Fetch
    }

    fn name(&self) -> &'static str {
        "transparent-wrap"
    }

    fn install(&self, window: &Window, pipeline: &Arc<Pipeline>) -> Result<PatchHandle> {
        let original = unpatched_fetch(window)?;
        let wrapper: FetchFn = Arc::new(InterceptedFetch::new(
            original.name().to_string(),
            Target::Fixed(original),
            pipeline,
            window,
        ));
        Ok(swap_in(window, wrapper, self.name()))
    }
}

/// Plain reassignment of the fetch slot
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticReplace;

impl InterceptionStrategy for StaticReplace {
    fn surface(&self) -> CallSurface {
        CallSurface::Fetch
    }

    fn name(&self) -> &'static str {
        "static-replace"
    }

    fn install(&self, window: &Window, pipeline: &Arc<Pipeline>) -> Result<PatchHandle> {
        let original = unpatched_fetch(window)?;
        let wrapper: FetchFn = Arc::new(InterceptedFetch::new(
            STATIC_NAME.to_string(),
            Target::Fixed(original),
            pipeline,
            window,
        ));
        Ok(swap_in(window, wrapper, self.name()))
    }
}

struct FetchAccessor {
    cell: Arc<RwLock<FetchFn>>,
    wrapper: FetchFn,
}

impl Accessor<FetchFn> for FetchAccessor {
    fn get(&self) -> FetchFn {
        self.wrapper.clone()
    }

    fn set(&self, value: FetchFn) {
        // writing the wrapper back must not make it its own target
        if same_handler(&value, &self.wrapper) {
            return;
        }
        tracing::debug!(name = value.name(), "page replaced fetch");
        *self.cell.write() = value;
    }
}

/// Accessor pair that survives page code reassigning fetch
#[derive(Debug, Default, Clone, Copy)]
pub struct AccessorIndirection;

impl InterceptionStrategy for AccessorIndirection {
    fn surface(&self) -> CallSurface {
        CallSurface::Fetch
    }

    fn name(&self) -> &'static str {
        "accessor-indirection"
    }

    fn install(&self, window: &Window, pipeline: &Arc<Pipeline>) -> Result<PatchHandle> {
        let original = unpatched_fetch(window)?;
        let cell = Arc::new(RwLock::new(original.clone()));
        let wrapper: FetchFn = Arc::new(InterceptedFetch::new(
            original.name().to_string(),
            Target::Cell {
                current: cell.clone(),
                installed: original,
            },
            pipeline,
            window,
        ));

        let prior = window
            .fetch_slot()
            .replace(SlotState::Accessor(Arc::new(FetchAccessor { cell, wrapper })));
        let window = window.clone();
        Ok(PatchHandle::new(CallSurface::Fetch, self.name(), move || {
            window.fetch_slot().replace(prior);
        }))
    }
}
