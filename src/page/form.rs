// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Form elements and their submission paths
//!
//! A form leaves the page in one of two ways: the user triggers it, which
//! fires a `submit` event on the document first ([`FormElement::request_submit`]),
//! or script calls `form.submit()`, which goes straight through the form
//! prototype's `submit` slot and fires no event.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;

use super::fetch::{encode_urlencoded, FormData, RequestBody};
use super::slot::Slot;
use super::window::Window;
use crate::error::Result;

/// Prototype `submit()`
pub type SubmitFn = Arc<dyn Fn(FormElement) -> BoxFuture<'static, Result<()>> + Send + Sync>;

pub const ENCTYPE_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const ENCTYPE_MULTIPART: &str = "multipart/form-data";
pub const ENCTYPE_TEXT_PLAIN: &str = "text/plain";

/// Shared methods of every form element
pub struct FormPrototype {
    pub submit: Slot<SubmitFn>,
}

impl FormPrototype {
    pub(crate) fn native() -> Self {
        let submit: SubmitFn = Arc::new(|form: FormElement| {
            async move {
                let submission = form.submission();
                form.window().navigate_form(&submission).await
            }
            .boxed()
        });
        Self {
            submit: Slot::new("HTMLFormElement.prototype.submit", submit),
        }
    }
}

impl fmt::Debug for FormPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormPrototype")
            .field("submit", &self.submit)
            .finish()
    }
}

/// Form control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    /// Field name
    pub name: Option<String>,
    /// Field type (text, password, hidden, etc.)
    pub field_type: String,
    /// Current value
    pub value: Option<String>,
    /// Whether field is disabled
    pub disabled: bool,
    /// Checkbox/radio state
    pub checked: bool,
}

impl FormField {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            field_type: field_type.into().to_ascii_lowercase(),
            value: Some(value.into()),
            disabled: false,
            checked: false,
        }
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, "text", value)
    }

    pub fn hidden(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, "hidden", value)
    }

    pub fn checkbox(name: impl Into<String>, value: impl Into<String>, checked: bool) -> Self {
        Self {
            checked,
            ..Self::new(name, "checkbox", value)
        }
    }

    /// Entry this field contributes to the form data set
    fn entry(&self) -> Option<(String, String)> {
        let name = self.name.as_ref().filter(|n| !n.is_empty())?;
        if self.disabled {
            return None;
        }
        match self.field_type.as_str() {
            "submit" | "button" | "reset" | "image" | "file" => None,
            "checkbox" | "radio" => self.checked.then(|| {
                (
                    name.clone(),
                    self.value.clone().unwrap_or_else(|| "on".to_string()),
                )
            }),
            _ => Some((name.clone(), self.value.clone().unwrap_or_default())),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct FormState {
    pub(crate) id: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) action: Option<String>,
    pub(crate) method: Option<String>,
    pub(crate) enctype: Option<String>,
    pub(crate) fields: Vec<FormField>,
}

struct FormInner {
    window: Window,
    state: RwLock<FormState>,
}

/// A `<form>` element
#[derive(Clone)]
pub struct FormElement {
    inner: Arc<FormInner>,
}

impl FormElement {
    pub(crate) fn new(window: Window, state: FormState) -> Self {
        Self {
            inner: Arc::new(FormInner {
                window,
                state: RwLock::new(state),
            }),
        }
    }

    pub fn window(&self) -> &Window {
        &self.inner.window
    }

    pub fn id(&self) -> Option<String> {
        self.inner.state.read().id.clone()
    }

    pub fn name(&self) -> Option<String> {
        self.inner.state.read().name.clone()
    }

    /// Raw `action` attribute
    pub fn action(&self) -> Option<String> {
        self.inner.state.read().action.clone()
    }

    pub fn set_action(&self, action: impl Into<String>) {
        self.inner.state.write().action = Some(action.into());
    }

    /// Submission method, `GET` unless the attribute says `post`
    pub fn method(&self) -> String {
        let state = self.inner.state.read();
        match state.method.as_deref().map(str::to_ascii_uppercase).as_deref() {
            Some("POST") => "POST".to_string(),
            _ => "GET".to_string(),
        }
    }

    pub fn set_method(&self, method: impl Into<String>) {
        self.inner.state.write().method = Some(method.into());
    }

    /// Encoding type, falling back to URL encoding for unknown values
    pub fn enctype(&self) -> String {
        let state = self.inner.state.read();
        match state.enctype.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some(ENCTYPE_MULTIPART) => ENCTYPE_MULTIPART.to_string(),
            Some(ENCTYPE_TEXT_PLAIN) => ENCTYPE_TEXT_PLAIN.to_string(),
            _ => ENCTYPE_URLENCODED.to_string(),
        }
    }

    pub fn set_enctype(&self, enctype: impl Into<String>) {
        self.inner.state.write().enctype = Some(enctype.into());
    }

    pub fn fields(&self) -> Vec<FormField> {
        self.inner.state.read().fields.clone()
    }

    pub fn add_field(&self, field: FormField) {
        self.inner.state.write().fields.push(field);
    }

    /// Builder form of [`add_field`](Self::add_field)
    pub fn with_field(self, field: FormField) -> Self {
        self.add_field(field);
        self
    }

    /// Set the value of every field called `name`; false if there is none
    pub fn set_field(&self, name: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        let mut state = self.inner.state.write();
        let mut found = false;
        for field in state.fields.iter_mut() {
            if field.name.as_deref() == Some(name) {
                field.value = Some(value.clone());
                found = true;
            }
        }
        found
    }

    /// Name/value pairs the form would submit, in document order
    pub fn data(&self) -> Vec<(String, String)> {
        self.inner
            .state
            .read()
            .fields
            .iter()
            .filter_map(FormField::entry)
            .collect()
    }

    /// Everything needed to submit the form, with the action resolved
    pub fn submission(&self) -> FormSubmission {
        let action = self
            .action()
            .filter(|a| !a.trim().is_empty())
            .map(|a| match self.window().resolve_url(a.trim()) {
                Ok(url) => url.to_string(),
                Err(_) => a,
            })
            .unwrap_or_else(|| self.window().location().to_string());

        FormSubmission {
            method: self.method(),
            action,
            enctype: self.enctype(),
            fields: self.data(),
        }
    }

    /// `form.submit()`: no submit event
    pub async fn submit(&self) -> Result<()> {
        let submit = self.window().form_prototype().submit.get();
        submit(self.clone()).await
    }

    /// User-initiated submission
    ///
    /// Fires `submit` on the document. Returns whether the native submission
    /// went ahead right away; it does not when page code prevented it or the
    /// interception engine took it over.
    pub async fn request_submit(&self) -> Result<bool> {
        let event = self.window().document().dispatch_submit(self);
        if event.default_prevented() || event.native_deferred() {
            tracing::debug!(
                prevented = event.default_prevented(),
                deferred = event.native_deferred(),
                "native submission not performed"
            );
            return Ok(false);
        }
        self.window().navigate_form(&self.submission()).await?;
        Ok(true)
    }
}

impl fmt::Debug for FormElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormElement")
            .field("state", &*self.inner.state.read())
            .finish()
    }
}

/// Resolved form submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormSubmission {
    pub method: String,
    pub action: String,
    pub enctype: String,
    pub fields: Vec<(String, String)>,
}

impl FormSubmission {
    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// `k=v&k2=v2` of the fields
    pub fn encoded_fields(&self) -> String {
        encode_urlencoded(&self.fields)
    }

    /// Body a non-GET submission carries, per the encoding type
    pub fn body(&self) -> RequestBody {
        match self.enctype.as_str() {
            ENCTYPE_MULTIPART => RequestBody::FormData(
                self.fields
                    .iter()
                    .fold(FormData::new(), |form, (k, v)| form.append(k, v)),
            ),
            ENCTYPE_TEXT_PLAIN => RequestBody::Text(
                self.fields
                    .iter()
                    .map(|(k, v)| format!("{}={}\r\n", k, v))
                    .collect(),
            ),
            _ => RequestBody::UrlEncoded(self.fields.clone()),
        }
    }
}
