//! Device-less capture backed by webrtc-rs sample tracks
//!
//! Produces [`RtcLocalTrack`]s that an application (or the loopback demo)
//! can feed with encoded samples. Useful where no camera, microphone or
//! display is available.

use super::{ConstraintSet, LocalStream, LocalTrack, MediaCapture, SupportedConstraints};
use crate::engine::{MediaKind, RtcLocalTrack};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Capture source that creates sample tracks on demand
#[derive(Debug, Clone)]
pub struct SyntheticCapture {
    supported: SupportedConstraints,
    screen_available: bool,
}

impl SyntheticCapture {
    pub fn new() -> Self {
        Self {
            supported: SupportedConstraints::standard(),
            screen_available: true,
        }
    }

    /// Report display capture as unavailable
    pub fn without_screen(mut self) -> Self {
        self.screen_available = false;
        self
    }

    pub fn with_supported_constraints(mut self, supported: SupportedConstraints) -> Self {
        self.supported = supported;
        self
    }

    fn stream(&self, kind: MediaKind, label: &str, constraints: &ConstraintSet) -> LocalStream {
        let stream_id = uuid::Uuid::new_v4().to_string();
        let track = RtcLocalTrack::new(kind, &stream_id);

        debug!(
            "Synthetic {} stream {} ({} constraints: {:?})",
            label,
            stream_id,
            constraints.len(),
            constraints.names().collect::<Vec<_>>()
        );

        LocalStream::new(stream_id, vec![Arc::new(track) as Arc<dyn LocalTrack>])
    }
}

impl Default for SyntheticCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaCapture for SyntheticCapture {
    fn supported_constraints(&self) -> SupportedConstraints {
        self.supported.clone()
    }

    fn supports_screen_capture(&self) -> bool {
        self.screen_available
    }

    async fn acquire_audio(&self, constraints: &ConstraintSet) -> Result<LocalStream> {
        Ok(self.stream(MediaKind::Audio, "microphone", constraints))
    }

    async fn acquire_video(&self, constraints: &ConstraintSet) -> Result<LocalStream> {
        Ok(self.stream(MediaKind::Video, "camera", constraints))
    }

    async fn acquire_screen(&self, constraints: &ConstraintSet) -> Result<LocalStream> {
        if !self.screen_available {
            return Err(Error::CaptureError(
                "display capture is not available".to_string(),
            ));
        }
        Ok(self.stream(MediaKind::Video, "screen", constraints))
    }
}
