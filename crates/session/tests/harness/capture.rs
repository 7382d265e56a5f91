//! Capture source recording what it was asked for

use async_trait::async_trait;
use parking_lot::Mutex;
use peershare_session::capture::{ConstraintSet, LocalStream, LocalTrack, MediaCapture};
use peershare_session::{Error, MediaKind, Result, SupportedConstraints};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct FakeTrack {
    id: String,
    kind: MediaKind,
    stream_id: String,
    stopped: AtomicBool,
}

impl LocalTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn stream_id(&self) -> &str {
        &self.stream_id
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Which device a request went to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Microphone,
    Camera,
    Screen,
}

pub struct RecordingCapture {
    supported: SupportedConstraints,
    screen_available: bool,
    /// Camera streams carry an audio track as well as video
    camera_with_audio: bool,
    next_id: AtomicUsize,
    requests: Mutex<Vec<(Device, ConstraintSet)>>,
    streams: Mutex<Vec<LocalStream>>,
}

impl RecordingCapture {
    pub fn new() -> Self {
        Self {
            supported: SupportedConstraints::standard(),
            screen_available: true,
            camera_with_audio: false,
            next_id: AtomicUsize::new(1),
            requests: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
        }
    }

    pub fn with_supported(mut self, names: &[&str]) -> Self {
        self.supported = SupportedConstraints::from_names(names.iter().copied());
        self
    }

    pub fn without_screen(mut self) -> Self {
        self.screen_available = false;
        self
    }

    pub fn with_camera_audio(mut self) -> Self {
        self.camera_with_audio = true;
        self
    }

    pub fn requests(&self) -> Vec<(Device, ConstraintSet)> {
        self.requests.lock().clone()
    }

    /// Every stream handed out so far
    pub fn streams(&self) -> Vec<LocalStream> {
        self.streams.lock().clone()
    }

    fn stream(&self, device: Device, constraints: &ConstraintSet, kinds: &[MediaKind]) -> LocalStream {
        self.requests.lock().push((device, constraints.clone()));

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stream_id = format!("{:?}-{}", device, n).to_lowercase();
        let tracks = kinds
            .iter()
            .map(|kind| {
                Arc::new(FakeTrack {
                    id: format!("{}-{}", stream_id, kind),
                    kind: *kind,
                    stream_id: stream_id.clone(),
                    stopped: AtomicBool::new(false),
                }) as Arc<dyn LocalTrack>
            })
            .collect();

        let stream = LocalStream::new(stream_id, tracks);
        self.streams.lock().push(stream.clone());
        stream
    }
}

#[async_trait]
impl MediaCapture for RecordingCapture {
    fn supported_constraints(&self) -> SupportedConstraints {
        self.supported.clone()
    }

    fn supports_screen_capture(&self) -> bool {
        self.screen_available
    }

    async fn acquire_audio(&self, constraints: &ConstraintSet) -> Result<LocalStream> {
        Ok(self.stream(Device::Microphone, constraints, &[MediaKind::Audio]))
    }

    async fn acquire_video(&self, constraints: &ConstraintSet) -> Result<LocalStream> {
        let kinds: &[MediaKind] = if self.camera_with_audio {
            &[MediaKind::Audio, MediaKind::Video]
        } else {
            &[MediaKind::Video]
        };
        Ok(self.stream(Device::Camera, constraints, kinds))
    }

    async fn acquire_screen(&self, constraints: &ConstraintSet) -> Result<LocalStream> {
        if !self.screen_available {
            return Err(Error::CaptureError("no display".to_string()));
        }
        Ok(self.stream(Device::Screen, constraints, &[MediaKind::Video]))
    }
}
