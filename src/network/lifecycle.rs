// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Patch bookkeeping: what was installed and how to take it back out

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::pipeline::Pipeline;
use super::record::CallSurface;
use super::strategy::InterceptionStrategy;
use crate::error::{Error, Result};
use crate::page::Window;

type Restore = Box<dyn FnOnce() + Send>;

/// One installed patch and its restoration closure
pub struct PatchHandle {
    surface: CallSurface,
    strategy: &'static str,
    installed: AtomicBool,
    restore: Mutex<Option<Restore>>,
}

impl PatchHandle {
    pub fn new(
        surface: CallSurface,
        strategy: &'static str,
        restore: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            surface,
            strategy,
            installed: AtomicBool::new(true),
            restore: Mutex::new(Some(Box::new(restore))),
        }
    }

    pub fn surface(&self) -> CallSurface {
        self.surface
    }

    pub fn strategy(&self) -> &'static str {
        self.strategy
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    /// Restore what the patch replaced; false when already uninstalled
    pub fn uninstall(&self) -> bool {
        let restore = self.restore.lock().take();
        match restore {
            Some(restore) => {
                restore();
                self.installed.store(false, Ordering::SeqCst);
                tracing::debug!(surface = %self.surface, strategy = self.strategy, "patch removed");
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for PatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchHandle")
            .field("surface", &self.surface)
            .field("strategy", &self.strategy)
            .field("installed", &self.is_installed())
            .finish()
    }
}

/// Patches in installation order
#[derive(Debug, Default)]
pub struct PatchSet {
    patches: Vec<PatchHandle>,
}

impl PatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_installed(&self, surface: CallSurface) -> bool {
        self.patches
            .iter()
            .any(|p| p.surface() == surface && p.is_installed())
    }

    pub fn surfaces(&self) -> Vec<CallSurface> {
        self.patches
            .iter()
            .filter(|p| p.is_installed())
            .map(PatchHandle::surface)
            .collect()
    }

    /// Install `strategy` unless its surface is already patched
    pub fn install(
        &mut self,
        strategy: &dyn InterceptionStrategy,
        window: &Window,
        pipeline: &Arc<Pipeline>,
    ) -> Result<()> {
        if self.is_installed(strategy.surface()) {
            return Err(Error::AlreadyInstalled(strategy.surface()));
        }
        let handle = strategy.install(window, pipeline)?;
        tracing::debug!(surface = %handle.surface(), strategy = handle.strategy(), "patch installed");
        self.patches.push(handle);
        Ok(())
    }

    /// Uninstall everything, last installed first; returns how many were live
    pub fn uninstall_all(&mut self) -> usize {
        let mut removed = 0;
        while let Some(patch) = self.patches.pop() {
            if patch.uninstall() {
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninstall_is_idempotent() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let patch = PatchHandle::new(CallSurface::Xhr, "prototype", move || *counter.lock() += 1);

        assert!(patch.is_installed());
        assert!(patch.uninstall());
        assert!(!patch.uninstall());
        assert!(!patch.is_installed());
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn test_uninstall_all_runs_in_reverse() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut set = PatchSet::new();
        for surface in CallSurface::ALL {
            let order = order.clone();
            set.patches.push(PatchHandle::new(surface, "test", move || {
                order.lock().push(surface)
            }));
        }

        assert!(set.is_installed(CallSurface::Form));
        assert_eq!(set.uninstall_all(), 3);
        assert_eq!(
            *order.lock(),
            vec![CallSurface::Form, CallSurface::Xhr, CallSurface::Fetch]
        );
        assert_eq!(set.uninstall_all(), 0);
        assert!(set.is_empty());
    }
}
