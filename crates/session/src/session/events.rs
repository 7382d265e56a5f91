//! Notifications delivered to the application

use crate::channels::StreamKind;
use crate::engine::RemoteTrack;

/// Session notification
///
/// Delivered in order on the receiver returned by [`crate::Session::new`].
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The peer connection reached the connected state
    Connected,
    /// The peer connection was lost or closed
    Disconnected,
    /// Every control message received, recognized or not, as raw JSON
    DataMessage(serde_json::Value),
    /// Remote audio track; `stream_type` is known if the peer announced the stream
    TrackAudio {
        track: RemoteTrack,
        stream_type: Option<StreamKind>,
    },
    /// Remote video track; `stream_type` is known if the peer announced the stream
    TrackVideo {
        track: RemoteTrack,
        stream_type: Option<StreamKind>,
    },
    /// A remote stream ended
    StreamStopped {
        stream_type: StreamKind,
        stream_id: Option<String>,
    },
}

impl SessionEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Connected => "connected",
            SessionEvent::Disconnected => "disconnected",
            SessionEvent::DataMessage(_) => "data-message",
            SessionEvent::TrackAudio { .. } => "track-audio",
            SessionEvent::TrackVideo { .. } => "track-video",
            SessionEvent::StreamStopped { .. } => "stream-stopped",
        }
    }
}
