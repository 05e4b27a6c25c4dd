// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! XMLHttpRequest interception
//!
//! `open` and `setRequestHeader` are wrapped to record what the page asked
//! for in a side table keyed by instance. `send` builds the canonical record
//! from that, runs the request middlewares, applies their changes to the
//! instance and only then performs the real send. Completion is observed
//! right after the page's own readiness handler runs.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use url::Url;

use super::InterceptionStrategy;
use crate::error::{Error, Result};
use crate::http::Headers;
use crate::network::canonical::{build_request_record, RawCall, RawResponse};
use crate::network::lifecycle::PatchHandle;
use crate::network::pipeline::{FailureKind, InterceptFailure, Pipeline};
use crate::network::record::{CallSurface, RequestHandle, RequestRecord};
use crate::page::{
    normalize_method, OpenFn, ReadyState, ReadyStateHandler, RequestBody, SendFn, SetHeaderFn,
    SlotState, WeakXhr, Window, XhrHandle, XmlHttpRequest, SEND_ALREADY_CALLED,
};

const MARKER: &str = "wiretap:xhr";

static OPEN_GENERATION: AtomicU64 = AtomicU64::new(1);

struct Entry<T> {
    owner: WeakXhr,
    value: T,
}

/// Per-instance data that does not keep its instance alive
///
/// Entries whose instance has been dropped are pruned on every insert.
pub struct SideTable<T> {
    entries: DashMap<XhrHandle, Entry<T>>,
}

impl<T> SideTable<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn insert(&self, xhr: &XmlHttpRequest, value: T) {
        self.prune();
        self.entries.insert(
            xhr.handle(),
            Entry {
                owner: xhr.downgrade(),
                value,
            },
        );
    }

    /// Mutate the entry for `xhr`, if there is one
    pub fn update<R>(&self, xhr: &XmlHttpRequest, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.entries
            .get_mut(&xhr.handle())
            .map(|mut entry| f(&mut entry.value))
    }

    pub fn remove(&self, xhr: &XmlHttpRequest) -> Option<T> {
        self.entries.remove(&xhr.handle()).map(|(_, entry)| entry.value)
    }

    pub fn contains(&self, xhr: &XmlHttpRequest) -> bool {
        self.entries.contains_key(&xhr.handle())
    }

    /// Drop entries whose instance no longer exists
    pub fn prune(&self) {
        self.entries.retain(|_, entry| entry.owner.is_alive());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Clone> SideTable<T> {
    pub fn get(&self, xhr: &XmlHttpRequest) -> Option<T> {
        self.entries
            .get(&xhr.handle())
            .map(|entry| entry.value.clone())
    }
}

impl<T> Default for SideTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SideTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SideTable")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// What the page configured through open/setRequestHeader
#[derive(Debug, Clone)]
struct SideRecord {
    method: String,
    url: String,
    headers: Headers,
    /// Bumped by every `open`; a deferred send only dispatches while it matches
    generation: u64,
    /// Set while middlewares run and the real send is pending
    dispatching: bool,
    /// Final record once middlewares are done
    request: Option<Arc<RequestRecord>>,
}

impl SideRecord {
    fn opened(method: &str, url: &str) -> Self {
        Self {
            method: normalize_method(method),
            url: url.to_string(),
            headers: Headers::new(),
            generation: OPEN_GENERATION.fetch_add(1, Ordering::Relaxed),
            dispatching: false,
            request: None,
        }
    }
}

/// Patch of the XMLHttpRequest prototype
#[derive(Debug, Default, Clone, Copy)]
pub struct XhrInterception;

impl InterceptionStrategy for XhrInterception {
    fn surface(&self) -> CallSurface {
        CallSurface::Xhr
    }

    fn name(&self) -> &'static str {
        "prototype"
    }

    fn install(&self, window: &Window, pipeline: &Arc<Pipeline>) -> Result<PatchHandle> {
        if !window.try_mark(MARKER) {
            return Err(Error::AlreadyInstalled(CallSurface::Xhr));
        }

        let proto = window.xhr_prototype();
        let side: Arc<SideTable<SideRecord>> = Arc::new(SideTable::new());

        let original_open = proto.open.get();
        let open: OpenFn = {
            let side = side.clone();
            Arc::new(move |xhr: &XmlHttpRequest, method: &str, url: &str| {
                original_open(xhr, method, url)?;
                side.insert(xhr, SideRecord::opened(method, url));
                Ok(())
            })
        };

        let original_set_header = proto.set_request_header.get();
        let set_header: SetHeaderFn = {
            let side = side.clone();
            Arc::new(move |xhr: &XmlHttpRequest, name: &str, value: &str| {
                original_set_header(xhr, name, value)?;
                side.update(xhr, |record| record.headers.append(name, value));
                Ok(())
            })
        };

        let send: SendFn = Arc::new(InterceptedSend {
            original: proto.send.get(),
            side,
            pipeline: pipeline.clone(),
        }
        .into_fn());

        let prior_open = proto.open.replace(SlotState::Value(open));
        let prior_set_header = proto.set_request_header.replace(SlotState::Value(set_header));
        let prior_send = proto.send.replace(SlotState::Value(send));

        let window = window.clone();
        Ok(PatchHandle::new(CallSurface::Xhr, self.name(), move || {
            let proto = window.xhr_prototype();
            proto.open.replace(prior_open);
            proto.set_request_header.replace(prior_set_header);
            proto.send.replace(prior_send);
            window.unmark(MARKER);
        }))
    }
}

#[derive(Clone)]
struct InterceptedSend {
    original: SendFn,
    side: Arc<SideTable<SideRecord>>,
    pipeline: Arc<Pipeline>,
}

impl InterceptedSend {
    fn into_fn(self) -> impl Fn(&XmlHttpRequest, Option<RequestBody>) -> Result<()> + Send + Sync {
        move |xhr: &XmlHttpRequest, body: Option<RequestBody>| self.send(xhr, body)
    }

    fn send(&self, xhr: &XmlHttpRequest, body: Option<RequestBody>) -> Result<()> {
        if xhr.ready_state() != ReadyState::Opened || xhr.is_sent() {
            return (self.original)(xhr, body);
        }

        let claimed = self.side.update(xhr, |record| {
            if record.dispatching {
                None
            } else {
                record.dispatching = true;
                Some(record.clone())
            }
        });
        let side_record = match claimed {
            // not opened through the patched prototype
            None => return (self.original)(xhr, body),
            Some(None) => return Err(Error::invalid_state(SEND_ALREADY_CALLED)),
            Some(Some(record)) => record,
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                self.side.remove(xhr);
                return (self.original)(xhr, body);
            }
        };

        let base = xhr.window().location();
        let original = build_request_record(
            RawCall::Xhr {
                method: &side_record.method,
                url: &side_record.url,
                headers: &side_record.headers,
                body: body.as_ref(),
            },
            &base,
        );
        xhr.set_ready_state_observer(Some(self.completion_observer()));

        let generation = side_record.generation;
        let this = self.clone();
        let xhr = xhr.clone();
        runtime.spawn(async move {
            let handle = RequestHandle::new(original.clone());
            this.pipeline.run_request(CallSurface::Xhr, &handle).await;
            let record = this.pipeline.seal(handle, &original);
            let current = this.side.update(&xhr, |entry| {
                let current = entry.generation == generation;
                if current {
                    entry.request = Some(record.clone());
                }
                current
            });
            if current == Some(true) {
                this.dispatch(&xhr, &original, &record);
            } else {
                tracing::debug!(id = %record.id, "instance re-opened before dispatch; dropping send");
            }
        });
        Ok(())
    }

    /// Apply the final record to the instance and perform the real send
    fn dispatch(&self, xhr: &XmlHttpRequest, original: &RequestRecord, record: &RequestRecord) {
        let url = Url::parse(&record.url).or_else(|_| xhr.window().resolve_url(&record.url));
        match url {
            Ok(url) => xhr.reconfigure(&record.method, url, record.headers.clone()),
            Err(e) => {
                tracing::debug!(url = %record.url, error = %e, "keeping URL from open()");
                if let Some(url) = xhr.request_url() {
                    xhr.reconfigure(&record.method, url, record.headers.clone());
                }
            }
        }

        if record.body != original.body {
            tracing::trace!(id = %record.id, "request body replaced by middleware");
        }

        if let Err(e) = (self.original)(xhr, record.body.clone()) {
            self.pipeline.report(
                InterceptFailure::new(FailureKind::Dispatch, e.to_string())
                    .surface(CallSurface::Xhr)
                    .request(&record.id),
            );
            xhr.fail(e.to_string());
        }
    }

    /// Runs after the page's handler on every readiness change
    fn completion_observer(&self) -> ReadyStateHandler {
        let side = self.side.clone();
        let pipeline = self.pipeline.clone();
        Arc::new(move |xhr: &XmlHttpRequest| {
            if xhr.ready_state() != ReadyState::Done {
                return;
            }
            xhr.set_ready_state_observer(None);
            let snapshot = xhr.snapshot();
            let (request, request_id) = match side.remove(xhr).and_then(|r| r.request) {
                Some(request) => {
                    let id = request.id.clone();
                    (request, Some(id))
                }
                None => {
                    let method = xhr.request_method().unwrap_or_else(|| "GET".to_string());
                    let url = xhr.request_url().map(String::from).unwrap_or_default();
                    (
                        Arc::new(RequestRecord::new(CallSurface::Xhr, url, method)),
                        None,
                    )
                }
            };
            pipeline.spawn_response(
                CallSurface::Xhr,
                RawResponse::Xhr(snapshot),
                request,
                request_id,
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::stub::StubTransport;
    use crate::network::middleware::{request_fn, response_fn};
    use crate::network::record::ResponseRecord;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn window(transport: Arc<StubTransport>) -> Window {
        Window::new("https://app.example.com/", transport).unwrap()
    }

    fn pipeline_with(
        request: impl Fn(&mut RequestRecord) + Send + Sync + 'static,
    ) -> (Arc<Pipeline>, mpsc::UnboundedReceiver<(ResponseRecord, Arc<RequestRecord>)>) {
        let pipeline = Arc::new(Pipeline::new());
        let request = Arc::new(request);
        pipeline
            .add_request(
                Arc::new(request_fn(move |handle: RequestHandle| {
                    let request = request.clone();
                    async move {
                        handle.update(|r| request(r));
                        Ok(())
                    }
                })),
                None,
            )
            .unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        pipeline
            .add_response(
                Arc::new(response_fn(move |response, request| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send((response, request));
                        Ok(())
                    }
                })),
                None,
            )
            .unwrap();
        (pipeline, rx)
    }

    #[tokio::test]
    async fn test_request_mutation_reaches_the_wire() {
        let transport = StubTransport::ok("saved", "text/plain");
        let window = window(transport.clone());
        let (pipeline, mut rx) = pipeline_with(|r| {
            r.headers.insert("Authorization", "Bearer t");
            r.url = format!("{}?traced=1", r.url);
        });
        XhrInterception.install(&window, &pipeline).unwrap();

        let xhr = window.new_xhr();
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        xhr.set_on_ready_state_change(Some(Arc::new(move |x: &XmlHttpRequest| {
            sink.lock().push(x.ready_state())
        })));
        xhr.open("POST", "/save").unwrap();
        xhr.set_request_header("X-Page", "1").unwrap();
        xhr.send(Some("body".into())).unwrap();
        xhr.wait_for_completion().await;

        let sent = &transport.requests()[0];
        assert_eq!(sent.url.as_str(), "https://app.example.com/save?traced=1");
        assert_eq!(sent.headers.get("authorization").unwrap(), "Bearer t");
        assert_eq!(sent.headers.get("x-page").unwrap(), "1");
        assert_eq!(sent.body.as_deref(), Some(&b"body"[..]));
        assert_eq!(xhr.response_text().unwrap(), "saved");
        assert_eq!(fired.lock().last(), Some(&ReadyState::Done));

        let (response, request) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.request_id.as_deref(), Some(request.id.as_str()));
        assert_eq!(response.body, "saved");
        assert_eq!(request.method, "POST");
        assert_eq!(request.headers.get("x-page"), Some("1"));
    }

    #[tokio::test]
    async fn test_second_send_while_dispatching_is_invalid() {
        let window = window(StubTransport::ok("", "text/plain"));
        let (pipeline, _rx) = pipeline_with(|_| {});
        XhrInterception.install(&window, &pipeline).unwrap();

        let xhr = window.new_xhr();
        xhr.open("GET", "/x").unwrap();
        xhr.send(None).unwrap();
        assert!(matches!(xhr.send(None), Err(Error::InvalidState(_))));
        xhr.wait_for_completion().await;
    }

    #[tokio::test]
    async fn test_send_before_open_keeps_native_error() {
        let window = window(StubTransport::ok("", "text/plain"));
        let (pipeline, _rx) = pipeline_with(|_| {});
        XhrInterception.install(&window, &pipeline).unwrap();

        let xhr = window.new_xhr();
        assert!(matches!(xhr.send(None), Err(Error::InvalidState(_))));
        assert!(matches!(
            xhr.set_request_header("a", "b"),
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_instance_opened_before_install_passes_through() {
        let transport = StubTransport::ok("late", "text/plain");
        let window = window(transport.clone());
        let xhr = window.new_xhr();
        xhr.open("GET", "/early").unwrap();

        let (pipeline, mut rx) = pipeline_with(|r| {
            r.headers.insert("X-Seen", "1");
        });
        XhrInterception.install(&window, &pipeline).unwrap();
        xhr.send(None).unwrap();
        xhr.wait_for_completion().await;

        assert!(transport.requests()[0].headers.get("x-seen").is_none());
        let mut completed = 0;
        while let Ok(Some(_)) = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await {
            completed += 1;
        }
        assert_eq!(completed, 0);
    }

    #[tokio::test]
    async fn test_network_failure_is_reported_as_status_zero() {
        let window = window(StubTransport::failing("unreachable"));
        let (pipeline, mut rx) = pipeline_with(|_| {});
        XhrInterception.install(&window, &pipeline).unwrap();

        let xhr = window.new_xhr();
        xhr.open("GET", "/x").unwrap();
        xhr.send(None).unwrap();
        xhr.wait_for_completion().await;

        let (response, _) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.status, 0);
        assert!(response.body.starts_with("[body unavailable: "));
    }

    #[tokio::test]
    async fn test_uninstall_restores_prototype() {
        let window = window(StubTransport::ok("", "text/plain"));
        let before = window.xhr_prototype().send.get();
        let patch = XhrInterception
            .install(&window, &Arc::new(Pipeline::new()))
            .unwrap();
        assert!(matches!(
            XhrInterception.install(&window, &Arc::new(Pipeline::new())),
            Err(Error::AlreadyInstalled(CallSurface::Xhr))
        ));

        patch.uninstall();
        assert!(Arc::ptr_eq(&window.xhr_prototype().send.get(), &before));
        assert!(XhrInterception
            .install(&window, &Arc::new(Pipeline::new()))
            .is_ok());
    }

    #[tokio::test]
    async fn test_reopen_during_pending_send_dispatches_latest_request() {
        let transport = StubTransport::ok("ok", "text/plain");
        let window = window(transport.clone());
        let pipeline = Arc::new(Pipeline::new());
        pipeline
            .add_request(
                Arc::new(request_fn(|_| async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(())
                })),
                Some("slow"),
            )
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        pipeline
            .add_response(
                Arc::new(response_fn(move |_, request: Arc<RequestRecord>| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(request.url.clone());
                        Ok(())
                    }
                })),
                None,
            )
            .unwrap();
        XhrInterception.install(&window, &pipeline).unwrap();

        let xhr = window.new_xhr();
        xhr.open("GET", "/first").unwrap();
        xhr.send(None).unwrap();
        xhr.open("GET", "/second").unwrap();
        xhr.send(None).unwrap();
        xhr.wait_for_completion().await;

        let urls: Vec<String> = transport
            .requests()
            .iter()
            .map(|r| r.url.to_string())
            .collect();
        assert_eq!(urls, vec!["https://app.example.com/second"]);
        assert_eq!(xhr.error(), None);
        assert_eq!(xhr.response_text().unwrap(), "ok");

        let url = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(url, "https://app.example.com/second");
    }

    #[test]
    fn test_side_table_does_not_keep_instances_alive() {
        let window = window(StubTransport::ok("", ""));
        let table: SideTable<u32> = SideTable::new();
        let kept = window.new_xhr();
        {
            let dropped = window.new_xhr();
            table.insert(&dropped, 1);
        }
        table.insert(&kept, 2);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&kept), Some(2));
    }
}
