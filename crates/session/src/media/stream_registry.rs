//! Remote stream registry
//!
//! Maps remote stream ids to the category the peer announced for them, so
//! incoming tracks can be labelled as screen or camera.

use crate::channels::StreamKind;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info};

/// Remote stream id to stream category
#[derive(Debug, Default)]
pub struct StreamRegistry {
    entries: Mutex<HashMap<String, StreamKind>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the category of a remote stream. Returns the previous category.
    pub fn register(&self, stream_id: impl Into<String>, kind: StreamKind) -> Option<StreamKind> {
        let stream_id = stream_id.into();
        info!("Registering remote {} stream {}", kind, stream_id);
        self.entries.lock().insert(stream_id, kind)
    }

    pub fn remove(&self, stream_id: &str) -> Option<StreamKind> {
        let removed = self.entries.lock().remove(stream_id);
        if let Some(kind) = removed {
            debug!("Removed remote {} stream {}", kind, stream_id);
        }
        removed
    }

    pub fn kind_of(&self, stream_id: &str) -> Option<StreamKind> {
        self.entries.lock().get(stream_id).copied()
    }

    /// Ids currently registered with `kind`, sorted
    pub fn ids_of(&self, kind: StreamKind) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Remove every entry of `kind`, returning the removed ids sorted
    pub fn retire_kind(&self, kind: StreamKind) -> Vec<String> {
        let mut entries = self.entries.lock();
        let mut retired: Vec<String> = entries
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &retired {
            entries.remove(id);
        }
        retired.sort_unstable();

        if !retired.is_empty() {
            debug!("Retired {} remote {} stream(s)", retired.len(), kind);
        }
        retired
    }

    pub fn snapshot(&self) -> HashMap<String, StreamKind> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
