// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Interceptor: one window, one pipeline, the patches currently applied

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use super::config::{InterceptOptions, PartialOptions};
use super::lifecycle::PatchSet;
use super::middleware::{MiddlewareIds, RequestMiddleware, ResponseMiddleware};
use super::pipeline::{ErrorReporter, FailureKind, InterceptFailure, Pipeline};
use super::record::CallSurface;
use crate::error::Result;
use crate::page::Window;

/// A surface that was not patched, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSurface {
    pub surface: CallSurface,
    pub reason: String,
}

/// Outcome of an install
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub installed: Vec<CallSurface>,
    pub skipped: Vec<SkippedSurface>,
}

impl InstallReport {
    pub fn is_installed(&self, surface: CallSurface) -> bool {
        self.installed.contains(&surface)
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Intercepts the outbound calls of one window
///
/// # Example
///
/// ```rust,no_run
/// use wiretap::network::{request_fn, InterceptOptions, Interceptor, RequestHandle};
/// use wiretap::http::HttpClient;
/// use wiretap::page::{FetchInit, Window};
///
/// # async fn run() -> wiretap::Result<()> {
/// let window = Window::with_client("https://app.example.com/", HttpClient::new()?)?;
/// let interceptor = Interceptor::new(window.clone());
/// interceptor.add_request_middleware(
///     request_fn(|request: RequestHandle| async move {
///         request.update(|r| r.headers.insert("x-trace", "1"));
///         Ok(())
///     }),
///     Some("trace"),
/// )?;
/// interceptor.install(InterceptOptions::default());
///
/// let _response = window.fetch("/api/me", FetchInit::new()).await?;
/// # Ok(())
/// # }
/// ```
pub struct Interceptor {
    window: Window,
    pipeline: Arc<Pipeline>,
    options: RwLock<InterceptOptions>,
    patches: Mutex<PatchSet>,
}

impl Interceptor {
    pub fn new(window: Window) -> Self {
        Self {
            window,
            pipeline: Arc::new(Pipeline::new()),
            options: RwLock::new(InterceptOptions::default()),
            patches: Mutex::new(PatchSet::new()),
        }
    }

    /// Route engine failures to `reporter` in addition to the log
    pub fn with_reporter(
        self,
        reporter: impl Fn(&InterceptFailure) + Send + Sync + 'static,
    ) -> Self {
        let reporter: ErrorReporter = Arc::new(reporter);
        self.pipeline.set_reporter(Some(reporter));
        self
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Options of the last install
    pub fn options(&self) -> InterceptOptions {
        self.options.read().clone()
    }

    /// Patch every surface `options` enables
    ///
    /// A surface that is already patched, by this interceptor or another one
    /// on the same window, is skipped and listed in the report.
    pub fn install(&self, options: InterceptOptions) -> InstallReport {
        let mut report = InstallReport::default();
        {
            let mut patches = self.patches.lock();
            for strategy in options.strategies() {
                let surface = strategy.surface();
                match patches.install(strategy.as_ref(), &self.window, &self.pipeline) {
                    Ok(()) => {
                        tracing::debug!(%surface, strategy = strategy.name(), "interception installed");
                        report.installed.push(surface);
                    }
                    Err(e) => report.skipped.push(SkippedSurface {
                        surface,
                        reason: e.to_string(),
                    }),
                }
            }
        }
        *self.options.write() = options;

        // the reporter may call back into this interceptor
        for skipped in &report.skipped {
            self.pipeline.report(
                InterceptFailure::new(FailureKind::Install, skipped.reason.clone())
                    .surface(skipped.surface),
            );
        }
        report
    }

    /// Merge `partial` into the current options and reinstall from scratch
    pub fn update_options(&self, partial: PartialOptions) -> InstallReport {
        let mut options = self.options();
        options.merge(&partial);
        self.uninstall_all();
        self.install(options)
    }

    /// Remove every patch, most recent first; returns how many were live
    pub fn uninstall_all(&self) -> usize {
        let removed = self.patches.lock().uninstall_all();
        if removed > 0 {
            tracing::debug!(removed, "interception uninstalled");
        }
        removed
    }

    pub fn is_installed(&self, surface: CallSurface) -> bool {
        self.patches.lock().is_installed(surface)
    }

    pub fn installed_surfaces(&self) -> Vec<CallSurface> {
        self.patches.lock().surfaces()
    }

    /// Register a request middleware; an id is generated when none is given
    pub fn add_request_middleware<M>(&self, middleware: M, id: Option<&str>) -> Result<String>
    where
        M: RequestMiddleware + 'static,
    {
        self.pipeline.add_request(Arc::new(middleware), id)
    }

    /// Register a response middleware; an id is generated when none is given
    pub fn add_response_middleware<M>(&self, middleware: M, id: Option<&str>) -> Result<String>
    where
        M: ResponseMiddleware + 'static,
    {
        self.pipeline.add_response(Arc::new(middleware), id)
    }

    pub fn remove_request_middleware(&self, id: &str) -> bool {
        self.pipeline.remove_request(id)
    }

    pub fn remove_response_middleware(&self, id: &str) -> bool {
        self.pipeline.remove_response(id)
    }

    pub fn list_middleware_ids(&self) -> MiddlewareIds {
        self.pipeline.ids()
    }
}

impl Drop for Interceptor {
    fn drop(&mut self) {
        self.patches.get_mut().uninstall_all();
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("window", &self.window)
            .field("options", &*self.options.read())
            .field("installed", &self.installed_surfaces())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}
