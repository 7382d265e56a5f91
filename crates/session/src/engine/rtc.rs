//! webrtc-rs implementation of the connection capability

use super::{
    ConnectionEngine, ConnectionState, EngineEvent, EngineEventSink, IceCandidate,
    IceGatheringState, MediaKind, RemoteTrack, RtpSender, SdpKind, SendParameters,
    SessionDescription, SideChannel,
};
use crate::capture::LocalTrack;
use crate::channels::ControlChannel;
use crate::config::{BundlePolicy, IceTransportPolicy, SessionConfig};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

type SinkSlot = Arc<Mutex<Option<EngineEventSink>>>;

fn emit(slot: &SinkSlot, event: EngineEvent) {
    if let Some(sink) = slot.lock().as_ref() {
        if sink.send(event).is_err() {
            debug!("Engine event dropped, session is gone");
        }
    }
}

/// Peer connection engine on webrtc-rs
pub struct RtcEngine {
    peer_connection: Arc<RTCPeerConnection>,
    sink: SinkSlot,
}

impl RtcEngine {
    /// Create a peer connection configured from `config`
    #[instrument(skip(config))]
    pub async fn new(config: &SessionConfig) -> Result<Self> {
        let mut media_engine = MediaEngine::default();

        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::WebRtcError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(config.turn_servers.iter().map(|turn| {
                #[allow(clippy::needless_update)]
                RTCIceServer {
                    urls: vec![turn.url.clone()],
                    username: turn.username.clone(),
                    credential: turn.credential.clone(),
                    ..Default::default()
                }
            }))
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            bundle_policy: match config.bundle_policy {
                BundlePolicy::Balanced => RTCBundlePolicy::Balanced,
                BundlePolicy::MaxCompat => RTCBundlePolicy::MaxCompat,
                BundlePolicy::MaxBundle => RTCBundlePolicy::MaxBundle,
            },
            ice_transport_policy: match config.ice_transport_policy {
                IceTransportPolicy::All => RTCIceTransportPolicy::All,
                IceTransportPolicy::Relay => RTCIceTransportPolicy::Relay,
            },
            ..Default::default()
        };

        let peer_connection =
            Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
                Error::WebRtcError(format!("Failed to create peer connection: {}", e))
            })?);

        let engine = Self {
            peer_connection,
            sink: Arc::new(Mutex::new(None)),
        };
        engine.setup_handlers();

        info!(
            "Peer connection created (ice policy {:?}, {} ICE servers)",
            config.ice_transport_policy,
            config.stun_servers.len() + config.turn_servers.len()
        );

        Ok(engine)
    }

    /// The underlying webrtc-rs peer connection
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }

    fn setup_handlers(&self) {
        let sink = Arc::clone(&self.sink);
        self.peer_connection
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let sink = Arc::clone(&sink);
                Box::pin(async move {
                    let state = match s {
                        RTCPeerConnectionState::New => ConnectionState::New,
                        RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
                        RTCPeerConnectionState::Connected => ConnectionState::Connected,
                        RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
                        RTCPeerConnectionState::Failed => ConnectionState::Failed,
                        RTCPeerConnectionState::Closed => ConnectionState::Closed,
                        _ => return,
                    };
                    emit(&sink, EngineEvent::ConnectionStateChanged(state));
                })
            }));

        let sink = Arc::clone(&self.sink);
        self.peer_connection
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let sink = Arc::clone(&sink);
                Box::pin(async move {
                    let Some(candidate) = candidate else {
                        return;
                    };
                    match candidate.to_json() {
                        Ok(init) => emit(&sink, EngineEvent::IceCandidate(init.into())),
                        Err(e) => warn!("Failed to serialize local ICE candidate: {}", e),
                    }
                })
            }));

        let sink = Arc::clone(&self.sink);
        self.peer_connection
            .on_ice_gathering_state_change(Box::new(move |s: RTCIceGathererState| {
                let sink = Arc::clone(&sink);
                Box::pin(async move {
                    let state = match s {
                        RTCIceGathererState::New => IceGatheringState::New,
                        RTCIceGathererState::Gathering => IceGatheringState::Gathering,
                        RTCIceGathererState::Complete => IceGatheringState::Complete,
                        _ => return,
                    };
                    emit(&sink, EngineEvent::IceGatheringStateChanged(state));
                })
            }));

        let sink = Arc::clone(&self.sink);
        self.peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let sink = Arc::clone(&sink);
                Box::pin(async move {
                    let kind = match track.kind() {
                        RTPCodecType::Audio => MediaKind::Audio,
                        RTPCodecType::Video => MediaKind::Video,
                        _ => return,
                    };
                    let remote = RemoteTrack::new(track.id(), kind, track.stream_id())
                        .with_source(track as Arc<dyn Any + Send + Sync>);
                    emit(&sink, EngineEvent::TrackReceived(remote));
                })
            },
        ));

        let sink = Arc::clone(&self.sink);
        self.peer_connection
            .on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
                let sink = Arc::clone(&sink);
                Box::pin(async move {
                    let label = channel.label().to_string();
                    info!("Remote data channel opened: label={}", label);

                    channel.on_message(Box::new(move |msg: DataChannelMessage| {
                        let sink = Arc::clone(&sink);
                        let label = label.clone();
                        Box::pin(async move {
                            emit(
                                &sink,
                                EngineEvent::ChannelMessage {
                                    label,
                                    data: msg.data,
                                },
                            );
                        })
                    }));
                })
            }));
    }

    /// Make sure the offer asks to receive each wanted kind
    async fn ensure_receivers(&self, want_audio: bool, want_video: bool) -> Result<()> {
        let transceivers = self.peer_connection.get_transceivers().await;

        for (wanted, kind) in [
            (want_audio, RTPCodecType::Audio),
            (want_video, RTPCodecType::Video),
        ] {
            if !wanted || transceivers.iter().any(|t| t.kind() == kind) {
                continue;
            }
            self.peer_connection
                .add_transceiver_from_kind(
                    kind,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await
                .map_err(|e| {
                    Error::MediaTrackError(format!("Failed to add {:?} transceiver: {}", kind, e))
                })?;
        }

        Ok(())
    }
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription> {
    let parsed = match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp),
    };
    parsed.map_err(|e| Error::SdpError(format!("Failed to parse description: {}", e)))
}

fn from_rtc(description: RTCSessionDescription) -> Option<SessionDescription> {
    match description.sdp_type {
        RTCSdpType::Offer => Some(SessionDescription::offer(description.sdp)),
        RTCSdpType::Answer => Some(SessionDescription::answer(description.sdp)),
        _ => None,
    }
}

impl From<RTCIceCandidateInit> for IceCandidate {
    fn from(init: RTCIceCandidateInit) -> Self {
        Self {
            candidate: init.candidate,
            sdp_mid: init.sdp_mid,
            sdp_mline_index: init.sdp_mline_index,
            username_fragment: init.username_fragment,
        }
    }
}

impl From<IceCandidate> for RTCIceCandidateInit {
    fn from(candidate: IceCandidate) -> Self {
        Self {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        }
    }
}

#[async_trait]
impl ConnectionEngine for RtcEngine {
    fn set_event_sink(&self, sink: EngineEventSink) {
        *self.sink.lock() = Some(sink);
    }

    async fn create_offer(&self, want_audio: bool, want_video: bool) -> Result<SessionDescription> {
        self.ensure_receivers(want_audio, want_video).await?;

        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;

        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create answer: {}", e)))?;

        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_local_description(to_rtc(description)?)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_remote_description(to_rtc(description)?)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.peer_connection
            .local_description()
            .await
            .and_then(from_rtc)
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.peer_connection
            .add_ice_candidate(candidate.into())
            .await
            .map_err(|e| Error::IceCandidateError(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<Arc<dyn RtpSender>> {
        let rtc_track = track
            .as_any()
            .downcast_ref::<RtcLocalTrack>()
            .ok_or_else(|| {
                Error::MediaTrackError(format!(
                    "Track {} was not created for the webrtc-rs engine",
                    track.id()
                ))
            })?;

        let sender = self
            .peer_connection
            .add_track(Arc::clone(&rtc_track.sample_track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| {
                Error::MediaTrackError(format!("Failed to add {} track: {}", track.kind(), e))
            })?;

        debug!("Attached {} track {}", track.kind(), track.id());

        Ok(Arc::new(RtcSender {
            sender,
            track_id: track.id().to_string(),
            parameters: tokio::sync::Mutex::new(SendParameters::default()),
            max_bitrate: Arc::clone(&rtc_track.max_bitrate),
        }))
    }

    async fn remove_track(&self, sender: Arc<dyn RtpSender>) -> Result<()> {
        let rtc_sender = sender
            .as_any()
            .downcast_ref::<RtcSender>()
            .ok_or_else(|| {
                Error::MediaTrackError(format!(
                    "Sender for track {} was not created by the webrtc-rs engine",
                    sender.track_id()
                ))
            })?;

        self.peer_connection
            .remove_track(&rtc_sender.sender)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to remove track: {}", e)))
    }

    async fn open_side_channel(&self, label: &str) -> Result<Arc<dyn SideChannel>> {
        let channel = ControlChannel::open(&self.peer_connection, label).await?;
        Ok(Arc::new(channel))
    }

    async fn close(&self) -> Result<()> {
        info!("Closing peer connection");
        self.peer_connection.close().await.map_err(|e| {
            Error::PeerConnectionError(format!("Failed to close connection: {}", e))
        })
    }
}

/// Local track that accepts encoded samples
pub struct RtcLocalTrack {
    id: String,
    stream_id: String,
    kind: MediaKind,
    sample_track: Arc<TrackLocalStaticSample>,
    stopped: AtomicBool,
    /// 0 means uncapped
    max_bitrate: Arc<AtomicU64>,
}

impl RtcLocalTrack {
    /// Opus for audio, VP8 for video
    pub fn new(kind: MediaKind, stream_id: &str) -> Self {
        let codec = match kind {
            MediaKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            MediaKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
        };

        let id = format!("{}-{}", kind, uuid::Uuid::new_v4());
        let sample_track = Arc::new(TrackLocalStaticSample::new(
            codec,
            id.clone(),
            stream_id.to_string(),
        ));

        Self {
            id,
            stream_id: stream_id.to_string(),
            kind,
            sample_track,
            stopped: AtomicBool::new(false),
            max_bitrate: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn sample_track(&self) -> &Arc<TrackLocalStaticSample> {
        &self.sample_track
    }

    /// Bitrate cap set through the track's sender, for the encoder feeding it
    pub fn max_bitrate(&self) -> Option<u64> {
        match self.max_bitrate.load(Ordering::Relaxed) {
            0 => None,
            bps => Some(bps),
        }
    }

    /// Write one encoded sample. Ignored once the track is stopped.
    pub async fn write_sample(&self, sample: &Sample) -> Result<()> {
        if self.is_stopped() {
            return Ok(());
        }
        self.sample_track
            .write_sample(sample)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to write sample: {}", e)))
    }
}

impl fmt::Debug for RtcLocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtcLocalTrack")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("kind", &self.kind)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl LocalTrack for RtcLocalTrack {
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
        if !self.stopped.swap(true, Ordering::SeqCst) {
            debug!("Stopped {} track {}", self.kind, self.id);
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Sender of an attached [`RtcLocalTrack`]
///
/// webrtc-rs leaves rate control to whoever encodes the samples, so the
/// encoding cap is published to the track through [`RtcLocalTrack::max_bitrate`].
pub struct RtcSender {
    sender: Arc<RTCRtpSender>,
    track_id: String,
    parameters: tokio::sync::Mutex<SendParameters>,
    max_bitrate: Arc<AtomicU64>,
}

impl RtcSender {
    pub fn rtp_sender(&self) -> &Arc<RTCRtpSender> {
        &self.sender
    }
}

#[async_trait]
impl RtpSender for RtcSender {
    fn track_id(&self) -> &str {
        &self.track_id
    }

    async fn parameters(&self) -> SendParameters {
        self.parameters.lock().await.clone()
    }

    async fn set_parameters(&self, parameters: SendParameters) -> Result<()> {
        let cap = parameters
            .encodings
            .iter()
            .filter_map(|e| e.max_bitrate)
            .min()
            .unwrap_or(0);
        self.max_bitrate.store(cap, Ordering::Relaxed);
        *self.parameters.lock().await = parameters;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
