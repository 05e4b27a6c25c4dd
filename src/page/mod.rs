// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Page environment hosting the outbound call surfaces
//!
//! A [`Window`] exposes the three ways page code sends requests: the global
//! fetch slot, the XMLHttpRequest prototype and form submission. Each of them
//! is reached through a replaceable [`Slot`], which is what the interception
//! engine patches.

mod document;
mod fetch;
mod form;
mod html;
mod slot;
mod window;
mod xhr;

pub use document::{Document, ListenerId, SubmitEvent, SubmitListener};
pub use fetch::{
    encode_urlencoded, handler_fn, normalize_method, parse_method, same_handler,
    unwrap_intercepted, EncodedBody, FetchFn, FetchHandler, FetchInit, FetchInput, FormData,
    FormValue, NativeFetch, RequestBody, URLENCODED_CONTENT_TYPE,
};
pub use form::{
    FormElement, FormField, FormPrototype, FormSubmission, SubmitFn, ENCTYPE_MULTIPART,
    ENCTYPE_TEXT_PLAIN, ENCTYPE_URLENCODED,
};
pub use slot::{Accessor, Slot, SlotState};
pub use window::{Navigation, WeakWindow, Window};
pub use xhr::{
    OpenFn, ReadyState, ReadyStateHandler, SendFn, SetHeaderFn, WeakXhr, XhrHandle,
    XhrPrototype, XhrResponse, XhrResponseType, XhrSnapshot, XmlHttpRequest,
};

pub(crate) use xhr::SEND_ALREADY_CALLED;
