//! In-memory connection engine
//!
//! Records every call, gathers a fixed candidate set on the first local
//! commit and delivers side-channel text to a linked peer engine as
//! `ChannelMessage` events.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use peershare_session::capture::LocalTrack;
use peershare_session::engine::{
    EngineEventSink, IceGatheringState, RtpSender, SdpKind, SendParameters, SideChannel,
};
use peershare_session::{
    ConnectionEngine, ConnectionState, EngineEvent, Error, IceCandidate, Result,
    SessionDescription,
};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Semaphore;

/// Offer SDP with VP9 listed ahead of VP8
pub const MOCK_OFFER_SDP: &str = "v=0\r\n\
o=- 1 1 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
a=rtpmap:111 opus/48000/2\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 98 96\r\n\
a=rtpmap:98 VP9/90000\r\n\
a=rtpmap:96 VP8/90000\r\n";

pub const MOCK_ANSWER_SDP: &str = "v=0\r\n\
o=- 2 1 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\n";

/// An engine primitive invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateOffer,
    CreateAnswer,
    SetLocal(SdpKind),
    SetRemote(SdpKind),
    AddCandidate(String),
    AddTrack(String),
    RemoveTrack(String),
    OpenChannel(String),
    Close,
}

/// How the engine reports ICE gathering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gathering {
    /// Emit the candidates then `Complete` on the first local commit
    Completes,
    /// Emit the candidates but never reach `Complete`
    Stalls,
}

pub struct MockEngine {
    name: String,
    sink: Mutex<Option<EngineEventSink>>,
    calls: Mutex<Vec<Call>>,
    local: Mutex<Option<SessionDescription>>,
    gathering: Gathering,
    gathered: AtomicBool,
    connected: AtomicBool,
    candidates: Vec<IceCandidate>,
    add_track_calls: AtomicUsize,
    fail_add_track_at: Option<usize>,
    offer_gate: Option<Arc<Semaphore>>,
    senders: Mutex<Vec<Arc<MockSender>>>,
    channel: Arc<MockChannel>,
}

impl MockEngine {
    pub fn new(name: &str) -> Self {
        Self::build(name, Gathering::Completes, None, None)
    }

    pub fn stalling(name: &str) -> Self {
        Self::build(name, Gathering::Stalls, None, None)
    }

    /// `create_offer` waits for a permit on `gate` before returning
    pub fn gated(name: &str, gate: Arc<Semaphore>) -> Self {
        Self::build(name, Gathering::Completes, None, Some(gate))
    }

    /// The `n`th `add_track` call (1-based) fails
    pub fn failing_add_track(name: &str, n: usize) -> Self {
        Self::build(name, Gathering::Completes, Some(n), None)
    }

    fn build(
        name: &str,
        gathering: Gathering,
        fail_add_track_at: Option<usize>,
        offer_gate: Option<Arc<Semaphore>>,
    ) -> Self {
        let candidates = (1..=2)
            .map(|i| {
                let mut c = IceCandidate::new(format!(
                    "candidate:{name}{i} 1 udp 2130706431 10.0.0.{i} 5000{i} typ host"
                ));
                c.sdp_mid = Some("0".to_string());
                c.sdp_mline_index = Some(0);
                c
            })
            .collect();

        Self {
            name: name.to_string(),
            sink: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            local: Mutex::new(None),
            gathering,
            gathered: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            candidates,
            add_track_calls: AtomicUsize::new(0),
            fail_add_track_at,
            offer_gate,
            senders: Mutex::new(Vec::new()),
            channel: Arc::new(MockChannel::new("data")),
        }
    }

    /// Candidates this engine reports on its first gathering round
    pub fn local_candidates(&self) -> &[IceCandidate] {
        &self.candidates
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    /// Most recent sender created for `track_id`
    pub fn sender(&self, track_id: &str) -> Option<Arc<MockSender>> {
        self.senders
            .lock()
            .iter()
            .rev()
            .find(|s| s.track_id == track_id)
            .cloned()
    }

    pub fn channel(&self) -> Arc<MockChannel> {
        Arc::clone(&self.channel)
    }

    /// Push an event into the registered sink as if the engine raised it
    pub fn emit(&self, event: EngineEvent) {
        if let Some(sink) = self.sink.lock().as_ref() {
            let _ = sink.send(event);
        }
    }

    /// Raise an inbound side-channel message
    pub fn deliver_text(&self, text: &str) {
        self.emit(EngineEvent::ChannelMessage {
            label: self.channel.label().to_string(),
            data: Bytes::copy_from_slice(text.as_bytes()),
        });
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn start_gathering(&self) {
        if self.gathered.swap(true, Ordering::SeqCst) {
            return;
        }
        self.emit(EngineEvent::IceGatheringStateChanged(
            IceGatheringState::Gathering,
        ));
        for candidate in &self.candidates {
            self.emit(EngineEvent::IceCandidate(candidate.clone()));
        }
        if self.gathering == Gathering::Completes {
            self.emit(EngineEvent::IceCandidate(IceCandidate::new("")));
            self.emit(EngineEvent::IceGatheringStateChanged(
                IceGatheringState::Complete,
            ));
        }
    }

    fn mark_connected(&self) {
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.emit(EngineEvent::ConnectionStateChanged(
                ConnectionState::Connecting,
            ));
            self.emit(EngineEvent::ConnectionStateChanged(
                ConnectionState::Connected,
            ));
        }
    }
}

/// Link the side channels of two engines in both directions
pub fn link(a: &Arc<MockEngine>, b: &Arc<MockEngine>) {
    *a.channel.peer.lock() = Some(Arc::downgrade(b));
    *b.channel.peer.lock() = Some(Arc::downgrade(a));
}

#[async_trait]
impl ConnectionEngine for MockEngine {
    fn set_event_sink(&self, sink: EngineEventSink) {
        *self.sink.lock() = Some(sink);
    }

    async fn create_offer(&self, want_audio: bool, want_video: bool) -> Result<SessionDescription> {
        assert!(want_audio && want_video, "offers always ask for both kinds");
        self.record(Call::CreateOffer);
        if let Some(gate) = &self.offer_gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| Error::InternalError(e.to_string()))?;
        }
        Ok(SessionDescription::offer(MOCK_OFFER_SDP))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.record(Call::CreateAnswer);
        Ok(SessionDescription::answer(MOCK_ANSWER_SDP))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.record(Call::SetLocal(description.kind));
        let kind = description.kind;
        *self.local.lock() = Some(description);
        self.start_gathering();
        if kind == SdpKind::Answer {
            self.mark_connected();
        }
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.record(Call::SetRemote(description.kind));
        if description.kind == SdpKind::Answer {
            self.mark_connected();
        }
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.record(Call::AddCandidate(candidate.candidate));
        Ok(())
    }

    async fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<Arc<dyn RtpSender>> {
        self.record(Call::AddTrack(track.id().to_string()));
        let n = self.add_track_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_add_track_at == Some(n) {
            return Err(Error::MediaTrackError(format!(
                "{}: refusing track {}",
                self.name,
                track.id()
            )));
        }
        let sender = Arc::new(MockSender::new(track.id()));
        self.senders.lock().push(Arc::clone(&sender));
        Ok(sender as Arc<dyn RtpSender>)
    }

    async fn remove_track(&self, sender: Arc<dyn RtpSender>) -> Result<()> {
        self.record(Call::RemoveTrack(sender.track_id().to_string()));
        Ok(())
    }

    async fn open_side_channel(&self, label: &str) -> Result<Arc<dyn SideChannel>> {
        self.record(Call::OpenChannel(label.to_string()));
        Ok(self.channel() as Arc<dyn SideChannel>)
    }

    async fn close(&self) -> Result<()> {
        self.record(Call::Close);
        self.channel.set_open(false);
        self.emit(EngineEvent::ConnectionStateChanged(ConnectionState::Closed));
        Ok(())
    }
}

/// Sender that keeps whatever parameters it is given
pub struct MockSender {
    track_id: String,
    parameters: Mutex<SendParameters>,
}

impl MockSender {
    pub fn new(track_id: &str) -> Self {
        Self {
            track_id: track_id.to_string(),
            parameters: Mutex::new(SendParameters::default()),
        }
    }

    /// Caps of every encoding, in order
    pub fn max_bitrates(&self) -> Vec<Option<u64>> {
        self.parameters
            .lock()
            .encodings
            .iter()
            .map(|e| e.max_bitrate)
            .collect()
    }
}

#[async_trait]
impl RtpSender for MockSender {
    fn track_id(&self) -> &str {
        &self.track_id
    }

    async fn parameters(&self) -> SendParameters {
        self.parameters.lock().clone()
    }

    async fn set_parameters(&self, parameters: SendParameters) -> Result<()> {
        *self.parameters.lock() = parameters;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Side channel recording sent text and forwarding it to a linked engine
pub struct MockChannel {
    label: String,
    open: AtomicBool,
    sent: Mutex<Vec<String>>,
    peer: Mutex<Option<Weak<MockEngine>>>,
}

impl MockChannel {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            open: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            peer: Mutex::new(None),
        }
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    /// Every message sent so far, parsed
    pub fn sent(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .iter()
            .map(|text| serde_json::from_str(text).expect("sent text is JSON"))
            .collect()
    }

    /// Sent messages carrying `cmd`
    pub fn sent_with_cmd(&self, cmd: &str) -> Vec<serde_json::Value> {
        self.sent()
            .into_iter()
            .filter(|m| m["cmd"] == cmd)
            .collect()
    }
}

#[async_trait]
impl SideChannel for MockChannel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send_text(&self, text: String) -> Result<()> {
        let peer = self.peer.lock().as_ref().and_then(Weak::upgrade);
        if let Some(peer) = peer {
            peer.deliver_text(&text);
        }
        self.sent.lock().push(text);
        Ok(())
    }
}
