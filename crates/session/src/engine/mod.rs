//! Connection capability seam
//!
//! The session never talks to an ICE/DTLS stack directly. Everything it needs
//! from one is expressed by [`ConnectionEngine`], [`RtpSender`] and
//! [`SideChannel`]; [`RtcEngine`] implements them on top of webrtc-rs.

mod rtc;

pub use rtc::{RtcEngine, RtcLocalTrack, RtcSender};

use crate::capture::LocalTrack;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Session description kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Session description as produced and consumed by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate descriptor (the engine's JSON candidate init)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        default,
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }

    /// An empty candidate line marks the end of gathering and carries no address
    pub fn is_end_of_candidates(&self) -> bool {
        self.candidate.trim().is_empty()
    }
}

/// ICE gathering state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceGatheringState {
    New,
    Gathering,
    Complete,
}

/// Peer connection state as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Media kind of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Per-encoding send parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodingParameters {
    /// Maximum bitrate in bits per second
    pub max_bitrate: Option<u64>,
}

/// Outbound parameters of a sender
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendParameters {
    pub encodings: Vec<EncodingParameters>,
}

/// A track received from the remote peer
#[derive(Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: MediaKind,
    /// Identifier of the remote media stream the track belongs to
    pub stream_id: String,
    source: Option<Arc<dyn Any + Send + Sync>>,
}

impl RemoteTrack {
    pub fn new(id: impl Into<String>, kind: MediaKind, stream_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            stream_id: stream_id.into(),
            source: None,
        }
    }

    /// Attach the engine-native track handle
    pub fn with_source(mut self, source: Arc<dyn Any + Send + Sync>) -> Self {
        self.source = Some(source);
        self
    }

    /// Engine-native track handle, e.g. `webrtc::track::track_remote::TrackRemote`
    pub fn source<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.source
            .as_ref()
            .and_then(|s| Arc::clone(s).downcast::<T>().ok())
    }
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("stream_id", &self.stream_id)
            .finish()
    }
}

/// Asynchronous notifications from the engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    ConnectionStateChanged(ConnectionState),
    /// A local candidate was gathered
    IceCandidate(IceCandidate),
    IceGatheringStateChanged(IceGatheringState),
    TrackReceived(RemoteTrack),
    /// A message arrived on a side channel opened by the remote peer
    ChannelMessage { label: String, data: Bytes },
}

/// Where an engine delivers its events, in order
pub type EngineEventSink = mpsc::UnboundedSender<EngineEvent>;

/// Handle to an attached outgoing track
#[async_trait]
pub trait RtpSender: Send + Sync {
    fn track_id(&self) -> &str;

    async fn parameters(&self) -> SendParameters;

    async fn set_parameters(&self, parameters: SendParameters) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

/// Ordered, reliable, message-oriented channel over the connection
#[async_trait]
pub trait SideChannel: Send + Sync {
    fn label(&self) -> &str;

    async fn is_open(&self) -> bool;

    async fn send_text(&self, text: String) -> Result<()>;
}

/// Primitives of a peer connection
///
/// Implementations must deliver events to the registered sink in the order
/// they occur; in particular every local candidate of a gathering round is
/// delivered before the matching `Complete` gathering state.
#[async_trait]
pub trait ConnectionEngine: Send + Sync {
    /// Register the event sink. Replaces any previous sink.
    fn set_event_sink(&self, sink: EngineEventSink);

    async fn create_offer(&self, want_audio: bool, want_video: bool)
        -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    /// Current local description, including anything the engine added after commit
    async fn local_description(&self) -> Option<SessionDescription>;

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<Arc<dyn RtpSender>>;

    async fn remove_track(&self, sender: Arc<dyn RtpSender>) -> Result<()>;

    async fn open_side_channel(&self, label: &str) -> Result<Arc<dyn SideChannel>>;

    async fn close(&self) -> Result<()>;
}
