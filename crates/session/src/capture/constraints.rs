//! Capture constraint sets
//!
//! Constraint names use the camelCase spelling capture devices understand
//! (`frameRate`, `echoCancellation`, ...). A set is built from the configured
//! constraint structs and filtered down to what the device reports as supported.

use crate::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Constraint names understood by a capture device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupportedConstraints(BTreeSet<String>);

impl SupportedConstraints {
    /// Names every mainstream capture backend understands
    pub const STANDARD: &'static [&'static str] = &[
        "width",
        "height",
        "frameRate",
        "aspectRatio",
        "facingMode",
        "deviceId",
        "groupId",
        "echoCancellation",
        "noiseSuppression",
        "autoGainControl",
        "sampleRate",
        "sampleSize",
        "channelCount",
        "latency",
    ];

    pub fn standard() -> Self {
        Self::from_names(Self::STANDARD.iter().copied())
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn supports(&self, name: &str) -> bool {
        self.0.contains(name)
    }
}

/// Named constraint values passed to a capture device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintSet(BTreeMap<String, serde_json::Value>);

impl ConstraintSet {
    /// Build from any constraint struct that serializes to a JSON object
    pub fn from_constraints<T: Serialize>(constraints: &T) -> Result<Self> {
        match serde_json::to_value(constraints)? {
            serde_json::Value::Object(map) => Ok(Self(map.into_iter().collect())),
            other => Err(Error::InvalidConfig(format!(
                "constraints must serialize to an object, got {}",
                other
            ))),
        }
    }

    /// Drop every constraint the device does not support
    pub fn retain_supported(mut self, supported: &SupportedConstraints) -> Self {
        self.0.retain(|name, _| supported.supports(name));
        self
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
