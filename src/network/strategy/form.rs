// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Form submission interception
//!
//! Forms are observed from two places: a capturing `submit` listener on the
//! document for user-initiated submissions, and an override of the form
//! prototype's `submit` slot for `form.submit()` calls from script. Both hand
//! the resolved submission to a [`Replayer`], which runs the request
//! middlewares and sends the result through the page's unwrapped fetch so
//! the response can be observed. The replay never replaces the native
//! navigation.

use std::sync::Arc;

use futures::FutureExt;

use super::InterceptionStrategy;
use crate::error::{Error, Result};
use crate::network::canonical::{build_request_record, RawCall, RawResponse};
use crate::network::lifecycle::PatchHandle;
use crate::network::pipeline::{FailureKind, InterceptFailure, Pipeline};
use crate::network::record::{CallSurface, RequestHandle};
use crate::page::{
    unwrap_intercepted, FetchInit, FetchInput, FormElement, FormSubmission, SlotState,
    SubmitEvent, SubmitFn, SubmitListener, WeakWindow, Window,
};

const MARKER: &str = "wiretap:form";

/// Capturing listener plus `submit()` override
///
/// With `delay_native` set, the native submission waits until the replay has
/// settled, successfully or not.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormInterception {
    pub delay_native: bool,
}

impl FormInterception {
    pub fn immediate() -> Self {
        Self {
            delay_native: false,
        }
    }

    pub fn delayed() -> Self {
        Self { delay_native: true }
    }
}

impl InterceptionStrategy for FormInterception {
    fn surface(&self) -> CallSurface {
        CallSurface::Form
    }

    fn name(&self) -> &'static str {
        if self.delay_native {
            "delayed-submit"
        } else {
            "submit-listener"
        }
    }

    fn install(&self, window: &Window, pipeline: &Arc<Pipeline>) -> Result<PatchHandle> {
        if !window.try_mark(MARKER) {
            return Err(Error::AlreadyInstalled(CallSurface::Form));
        }

        let replayer = Replayer {
            window: window.downgrade(),
            pipeline: pipeline.clone(),
        };
        let slot = &window.form_prototype().submit;
        let original = slot.get();

        let listener = submit_listener(replayer.clone(), original.clone(), self.delay_native);
        let listener_id = window.document().add_submit_listener(listener, true);
        let prior = slot.replace(SlotState::Value(submit_override(
            replayer,
            original,
            self.delay_native,
        )));

        let window = window.clone();
        Ok(PatchHandle::new(CallSurface::Form, self.name(), move || {
            window.form_prototype().submit.replace(prior);
            window.document().remove_submit_listener(listener_id);
            window.unmark(MARKER);
        }))
    }
}

fn submit_listener(replayer: Replayer, original: SubmitFn, delay_native: bool) -> SubmitListener {
    Arc::new(move |event: &SubmitEvent| {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::debug!("no async runtime, form submission not replayed");
                return;
            }
        };
        let submission = event.form().submission();
        let replayer = replayer.clone();

        if !delay_native {
            runtime.spawn(async move { replayer.replay(submission).await });
            return;
        }

        event.defer_native();
        let event = event.clone();
        let original = original.clone();
        runtime.spawn(async move {
            replayer.replay(submission).await;
            if event.default_prevented() {
                tracing::debug!("submission prevented by page, skipping native submit");
                return;
            }
            if let Err(e) = original(event.form().clone()).await {
                replayer.report_native(e);
            }
        });
    })
}

fn submit_override(replayer: Replayer, original: SubmitFn, delay_native: bool) -> SubmitFn {
    Arc::new(move |form: FormElement| {
        let replayer = replayer.clone();
        let original = original.clone();
        async move {
            let submission = form.submission();
            if delay_native {
                replayer.replay(submission).await;
            } else {
                tokio::spawn(async move { replayer.replay(submission).await });
            }
            original(form).await
        }
        .boxed()
    })
}

/// Re-issues a submission through fetch so its response can be observed
#[derive(Clone)]
struct Replayer {
    window: WeakWindow,
    pipeline: Arc<Pipeline>,
}

impl Replayer {
    async fn replay(&self, submission: FormSubmission) {
        let Some(window) = self.window.upgrade() else {
            return;
        };

        let original = build_request_record(RawCall::Form(&submission), &window.location());
        let handle = RequestHandle::new(original.clone());
        self.pipeline.run_request(CallSurface::Form, &handle).await;
        let record = self.pipeline.seal(handle, &original);

        let mut init = FetchInit::new()
            .method(record.method.clone())
            .headers(record.headers.clone());
        if let Some(body) = record.body.clone() {
            init = init.body(body);
        }

        let fetch = unwrap_intercepted(window.fetch_slot().get());
        tracing::debug!(id = %record.id, method = %record.method, url = %record.url, "replaying form submission");
        match fetch.call(FetchInput::Url(record.url.clone()), init).await {
            Ok(response) => {
                let request_id = record.id.clone();
                self.pipeline.spawn_response(
                    CallSurface::Form,
                    RawResponse::Fetch(response),
                    record,
                    Some(request_id),
                );
            }
            Err(e) => self.pipeline.report(
                InterceptFailure::new(FailureKind::Replay, e.to_string())
                    .surface(CallSurface::Form)
                    .request(&record.id),
            ),
        }
    }

    fn report_native(&self, error: Error) {
        self.pipeline.report(
            InterceptFailure::new(FailureKind::NativeSubmit, error.to_string())
                .surface(CallSurface::Form),
        );
    }
}
