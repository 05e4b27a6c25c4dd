// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Document-level submit event dispatch

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::form::FormElement;

/// Listener for `submit` events
pub type SubmitListener = Arc<dyn Fn(&SubmitEvent) + Send + Sync>;

/// Returned by [`Document::add_submit_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registered {
    id: ListenerId,
    capture: bool,
    listener: SubmitListener,
}

/// The page document, as far as form submission is concerned
pub struct Document {
    listeners: RwLock<Vec<Registered>>,
    next_id: AtomicU64,
}

impl Document {
    pub(crate) fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a submit listener; capture listeners run before bubble ones
    pub fn add_submit_listener(&self, listener: SubmitListener, capture: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push(Registered {
            id,
            capture,
            listener,
        });
        id
    }

    pub fn remove_submit_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        listeners.len() != before
    }

    pub fn submit_listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub(crate) fn dispatch_submit(&self, form: &FormElement) -> SubmitEvent {
        let event = SubmitEvent::new(form.clone());
        let (capture, bubble): (Vec<_>, Vec<_>) = self
            .listeners
            .read()
            .iter()
            .map(|r| (r.capture, r.listener.clone()))
            .partition(|(capture, _)| *capture);

        for (_, listener) in capture.into_iter().chain(bubble) {
            listener(&event);
        }
        event
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("submit_listeners", &self.submit_listener_count())
            .finish()
    }
}

struct EventState {
    form: FormElement,
    default_prevented: AtomicBool,
    native_deferred: AtomicBool,
}

/// A `submit` event in flight
#[derive(Clone)]
pub struct SubmitEvent {
    inner: Arc<EventState>,
}

impl SubmitEvent {
    fn new(form: FormElement) -> Self {
        Self {
            inner: Arc::new(EventState {
                form,
                default_prevented: AtomicBool::new(false),
                native_deferred: AtomicBool::new(false),
            }),
        }
    }

    pub fn form(&self) -> &FormElement {
        &self.inner.form
    }

    /// Page code cancels the native submission
    pub fn prevent_default(&self) {
        self.inner.default_prevented.store(true, Ordering::SeqCst);
    }

    pub fn default_prevented(&self) -> bool {
        self.inner.default_prevented.load(Ordering::SeqCst)
    }

    /// The engine takes over the native submission and performs it later
    pub(crate) fn defer_native(&self) {
        self.inner.native_deferred.store(true, Ordering::SeqCst);
    }

    pub fn native_deferred(&self) -> bool {
        self.inner.native_deferred.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for SubmitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitEvent")
            .field("default_prevented", &self.default_prevented())
            .field("native_deferred", &self.native_deferred())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::stub::StubTransport;
    use crate::page::Window;
    use parking_lot::Mutex;

    #[test]
    fn test_capture_listeners_run_first() {
        let window = Window::new("https://example.com/", StubTransport::ok("", "")).unwrap();
        let form = window.create_form("/submit", "GET");
        let order = Arc::new(Mutex::new(Vec::new()));

        let bubble = order.clone();
        window.document().add_submit_listener(
            Arc::new(move |_: &SubmitEvent| bubble.lock().push("bubble")),
            false,
        );
        let capture = order.clone();
        let id = window.document().add_submit_listener(
            Arc::new(move |_: &SubmitEvent| capture.lock().push("capture")),
            true,
        );

        let event = window.document().dispatch_submit(&form);
        assert_eq!(*order.lock(), vec!["capture", "bubble"]);
        assert!(!event.default_prevented());

        assert!(window.document().remove_submit_listener(id));
        assert!(!window.document().remove_submit_listener(id));
        assert_eq!(window.document().submit_listener_count(), 1);
    }
}
