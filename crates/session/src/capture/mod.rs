//! Media capture capability
//!
//! Acquires local microphone, camera and screen streams. Devices are an
//! external collaborator; the session only sees [`MediaCapture`],
//! [`LocalStream`] and [`LocalTrack`].

mod constraints;
mod synthetic;

pub use constraints::{ConstraintSet, SupportedConstraints};
pub use synthetic::SyntheticCapture;

use crate::engine::MediaKind;
use crate::Result;
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A locally captured track
pub trait LocalTrack: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    fn kind(&self) -> MediaKind;

    /// Identifier of the stream this track belongs to
    fn stream_id(&self) -> &str;

    /// Stop producing media. Idempotent.
    fn stop(&self);

    fn is_stopped(&self) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// A group of local tracks sharing a stream id
#[derive(Debug, Clone)]
pub struct LocalStream {
    id: String,
    tracks: Vec<Arc<dyn LocalTrack>>,
}

impl LocalStream {
    pub fn new(id: impl Into<String>, tracks: Vec<Arc<dyn LocalTrack>>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<dyn LocalTrack>] {
        &self.tracks
    }

    /// Stop every track of the stream
    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Source of local media streams
#[async_trait]
pub trait MediaCapture: Send + Sync {
    /// Constraint names the device understands
    fn supported_constraints(&self) -> SupportedConstraints;

    /// Whether display capture exists at all on this platform
    fn supports_screen_capture(&self) -> bool {
        true
    }

    async fn acquire_audio(&self, constraints: &ConstraintSet) -> Result<LocalStream>;

    async fn acquire_video(&self, constraints: &ConstraintSet) -> Result<LocalStream>;

    async fn acquire_screen(&self, constraints: &ConstraintSet) -> Result<LocalStream>;
}
