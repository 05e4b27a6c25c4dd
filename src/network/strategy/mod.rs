// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Interception strategies, one per way of patching a call surface

mod fetch;
mod form;
mod xhr;

use std::sync::Arc;

pub use fetch::{AccessorIndirection, StaticReplace, TransparentWrap};
pub use form::FormInterception;
pub use xhr::{SideTable, XhrInterception};

use super::lifecycle::PatchHandle;
use super::pipeline::Pipeline;
use super::record::CallSurface;
use crate::error::Result;
use crate::page::Window;

/// A way of routing one call surface through the middleware pipeline
pub trait InterceptionStrategy: Send + Sync {
    /// Surface this strategy patches
    fn surface(&self) -> CallSurface;

    /// Short name used in logs and reports
    fn name(&self) -> &'static str;

    /// Patch `window` and return the handle that undoes it
    ///
    /// Fails with [`Error::AlreadyInstalled`](crate::Error::AlreadyInstalled)
    /// when the surface already carries an interception patch.
    fn install(&self, window: &Window, pipeline: &Arc<Pipeline>) -> Result<PatchHandle>;
}
