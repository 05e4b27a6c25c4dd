// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Interception options

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::record::CallSurface;
use super::strategy::{
    AccessorIndirection, FormInterception, InterceptionStrategy, StaticReplace, TransparentWrap,
    XhrInterception,
};
use crate::error::{Error, Result};

/// How fetch is patched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchStrategyKind {
    /// Wrap the slot value, keeping the original's name
    TransparentWrap,
    /// Replace the slot value with a named wrapper
    StaticReplace,
    /// Turn the slot into an accessor that captures page assignments
    #[default]
    AccessorIndirection,
}

impl FetchStrategyKind {
    pub const ALL: [FetchStrategyKind; 3] = [
        FetchStrategyKind::TransparentWrap,
        FetchStrategyKind::StaticReplace,
        FetchStrategyKind::AccessorIndirection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStrategyKind::TransparentWrap => "transparent-wrap",
            FetchStrategyKind::StaticReplace => "static-replace",
            FetchStrategyKind::AccessorIndirection => "accessor-indirection",
        }
    }

    /// The strategy implementing this kind
    pub fn resolve(&self) -> Box<dyn InterceptionStrategy> {
        match self {
            FetchStrategyKind::TransparentWrap => Box::new(TransparentWrap),
            FetchStrategyKind::StaticReplace => Box::new(StaticReplace),
            FetchStrategyKind::AccessorIndirection => Box::new(AccessorIndirection),
        }
    }
}

impl fmt::Display for FetchStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FetchStrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                Error::Config(format!(
                    "unknown fetch strategy '{}' (expected one of: transparent-wrap, static-replace, accessor-indirection)",
                    s
                ))
            })
    }
}

/// Interception options
///
/// Field names follow the option object page-side code passes around, so a
/// JSON object like `{"disableXhrInterception": true}` deserializes directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InterceptOptions {
    pub disable_fetch_interception: bool,
    pub disable_xhr_interception: bool,
    pub disable_form_interception: bool,
    /// Hold native form submission back until the replay has settled
    pub delay_native_form_submit_until_replay_completes: bool,
    pub fetch_strategy: FetchStrategyKind,
}

impl InterceptOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disable_fetch(mut self, disable: bool) -> Self {
        self.disable_fetch_interception = disable;
        self
    }

    pub fn disable_xhr(mut self, disable: bool) -> Self {
        self.disable_xhr_interception = disable;
        self
    }

    pub fn disable_form(mut self, disable: bool) -> Self {
        self.disable_form_interception = disable;
        self
    }

    pub fn delay_native_form_submit(mut self, delay: bool) -> Self {
        self.delay_native_form_submit_until_replay_completes = delay;
        self
    }

    pub fn fetch_strategy(mut self, strategy: FetchStrategyKind) -> Self {
        self.fetch_strategy = strategy;
        self
    }

    /// All surfaces, native form submissions never held back
    pub fn observe_only() -> Self {
        Self::default()
    }

    /// Only fetch is intercepted
    pub fn fetch_only() -> Self {
        Self {
            disable_xhr_interception: true,
            disable_form_interception: true,
            ..Default::default()
        }
    }

    /// All surfaces, with form replays completing before navigation
    pub fn for_form_testing() -> Self {
        Self {
            delay_native_form_submit_until_replay_completes: true,
            ..Default::default()
        }
    }

    /// Parse options from a JSON object; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Apply the fields set in `partial`
    pub fn merge(&mut self, partial: &PartialOptions) {
        if let Some(v) = partial.disable_fetch_interception {
            self.disable_fetch_interception = v;
        }
        if let Some(v) = partial.disable_xhr_interception {
            self.disable_xhr_interception = v;
        }
        if let Some(v) = partial.disable_form_interception {
            self.disable_form_interception = v;
        }
        if let Some(v) = partial.delay_native_form_submit_until_replay_completes {
            self.delay_native_form_submit_until_replay_completes = v;
        }
        if let Some(v) = partial.fetch_strategy {
            self.fetch_strategy = v;
        }
    }

    pub fn is_enabled(&self, surface: CallSurface) -> bool {
        match surface {
            CallSurface::Fetch => !self.disable_fetch_interception,
            CallSurface::Xhr => !self.disable_xhr_interception,
            CallSurface::Form => !self.disable_form_interception,
        }
    }

    /// Strategies to install, in installation order
    pub fn strategies(&self) -> Vec<Box<dyn InterceptionStrategy>> {
        let mut strategies: Vec<Box<dyn InterceptionStrategy>> = Vec::new();
        if self.is_enabled(CallSurface::Fetch) {
            strategies.push(self.fetch_strategy.resolve());
        }
        if self.is_enabled(CallSurface::Xhr) {
            strategies.push(Box::new(XhrInterception));
        }
        if self.is_enabled(CallSurface::Form) {
            strategies.push(Box::new(FormInterception {
                delay_native: self.delay_native_form_submit_until_replay_completes,
            }));
        }
        strategies
    }
}

/// Options update where every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_fetch_interception: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_xhr_interception: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_form_interception: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_native_form_submit_until_replay_completes: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_strategy: Option<FetchStrategyKind>,
}

impl PartialOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn disable_fetch(mut self, disable: bool) -> Self {
        self.disable_fetch_interception = Some(disable);
        self
    }

    pub fn disable_xhr(mut self, disable: bool) -> Self {
        self.disable_xhr_interception = Some(disable);
        self
    }

    pub fn disable_form(mut self, disable: bool) -> Self {
        self.disable_form_interception = Some(disable);
        self
    }

    pub fn delay_native_form_submit(mut self, delay: bool) -> Self {
        self.delay_native_form_submit_until_replay_completes = Some(delay);
        self
    }

    pub fn fetch_strategy(mut self, strategy: FetchStrategyKind) -> Self {
        self.fetch_strategy = Some(strategy);
        self
    }
}

impl From<InterceptOptions> for PartialOptions {
    fn from(options: InterceptOptions) -> Self {
        Self {
            disable_fetch_interception: Some(options.disable_fetch_interception),
            disable_xhr_interception: Some(options.disable_xhr_interception),
            disable_form_interception: Some(options.disable_form_interception),
            delay_native_form_submit_until_replay_completes: Some(
                options.delay_native_form_submit_until_replay_completes,
            ),
            fetch_strategy: Some(options.fetch_strategy),
        }
    }
}
