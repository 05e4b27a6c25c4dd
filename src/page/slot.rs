// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Global slots the page's call surfaces are looked up through
//!
//! A slot holds either a plain value or an accessor pair. Page code reads
//! and assigns slots through [`Slot::get`] and [`Slot::set`]; an assignment
//! to a slot that has an accessor goes through the accessor's setter instead
//! of displacing it. The interception engine redefines slots wholesale with
//! [`Slot::replace`].

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Getter/setter pair installed in place of a plain value
pub trait Accessor<T>: Send + Sync {
    /// Value handed to readers of the slot
    fn get(&self) -> T;

    /// Receives assignments made to the slot
    fn set(&self, value: T);
}

/// What a slot currently holds
pub enum SlotState<T> {
    /// Plain value
    Value(T),
    /// Accessor pair
    Accessor(Arc<dyn Accessor<T>>),
}

impl<T: Clone> Clone for SlotState<T> {
    fn clone(&self) -> Self {
        match self {
            SlotState::Value(v) => SlotState::Value(v.clone()),
            SlotState::Accessor(a) => SlotState::Accessor(a.clone()),
        }
    }
}

impl<T> fmt::Debug for SlotState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotState::Value(_) => f.write_str("Value(..)"),
            SlotState::Accessor(_) => f.write_str("Accessor(..)"),
        }
    }
}

/// A named, mutable global
pub struct Slot<T> {
    name: &'static str,
    state: RwLock<SlotState<T>>,
}

impl<T: Clone + Send + Sync> Slot<T> {
    /// Create a slot holding `value`
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            state: RwLock::new(SlotState::Value(value)),
        }
    }

    /// Slot name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Read the slot
    pub fn get(&self) -> T {
        let state = self.state.read().clone();
        match state {
            SlotState::Value(value) => value,
            SlotState::Accessor(accessor) => accessor.get(),
        }
    }

    /// Assign the slot the way page code does
    pub fn set(&self, value: T) {
        let accessor = {
            let mut state = self.state.write();
            match Self::accessor_of(&state) {
                Some(accessor) => accessor,
                None => {
                    *state = SlotState::Value(value);
                    return;
                }
            }
        };
        accessor.set(value);
    }

    /// Current state, for later restoration
    pub fn snapshot(&self) -> SlotState<T> {
        self.state.read().clone()
    }

    /// Redefine the slot, returning what it held before
    pub fn replace(&self, state: SlotState<T>) -> SlotState<T> {
        std::mem::replace(&mut *self.state.write(), state)
    }

    /// Whether the slot is currently an accessor pair
    pub fn is_accessor(&self) -> bool {
        matches!(*self.state.read(), SlotState::Accessor(_))
    }

    fn accessor_of(state: &SlotState<T>) -> Option<Arc<dyn Accessor<T>>> {
        match state {
            SlotState::Accessor(accessor) => Some(accessor.clone()),
            SlotState::Value(_) => None,
        }
    }
}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("name", &self.name)
            .field("state", &*self.state.read())
            .finish()
    }
}
