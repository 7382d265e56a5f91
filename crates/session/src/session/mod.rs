//! Peer session facade
//!
//! A [`Session`] owns one connection engine, the remote stream registry and
//! the local streams. Two background tasks run per session:
//!
//! - the engine event pump, which feeds candidates and gathering state to the
//!   negotiator, tracks connection state, labels remote tracks and queues
//!   inbound control messages
//! - the control dispatcher, which handles queued control messages one at a
//!   time
//!
//! Both tasks hold only a weak reference and end when the session is dropped.

mod events;
mod handler;
mod streams;

pub use events::SessionEvent;

use crate::capture::MediaCapture;
use crate::channels::ControlMessage;
use crate::config::SessionConfig;
use crate::engine::{
    ConnectionEngine, ConnectionState, EngineEvent, MediaKind, SessionDescription, SideChannel,
};
use crate::media::StreamRegistry;
use crate::negotiation::{NegotiationPayload, Negotiator};
use crate::Result;
use bytes::Bytes;
use std::sync::{Arc, Weak};
use streams::ActiveStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

pub(crate) struct SessionInner {
    config: SessionConfig,
    engine: Arc<dyn ConnectionEngine>,
    capture: Arc<dyn MediaCapture>,
    negotiator: Negotiator,
    registry: StreamRegistry,
    control_channel: RwLock<Option<Arc<dyn SideChannel>>>,
    local_audio: Mutex<Option<ActiveStream>>,
    screen: Mutex<Option<ActiveStream>>,
    camera: Mutex<Option<ActiveStream>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    connection_state: watch::Sender<ConnectionState>,
    shutdown: watch::Sender<bool>,
    inbound: mpsc::Sender<Bytes>,
}

impl SessionInner {
    pub(crate) fn emit(&self, event: SessionEvent) {
        let name = event.name();
        if self.events.send(event).is_err() {
            debug!("No listener for session event {}", name);
        }
    }

    /// Send a control message; logged and dropped if the channel is not open
    pub(crate) async fn send_control(&self, message: &ControlMessage) {
        let channel = self.control_channel.read().await.clone();
        let Some(channel) = channel else {
            error!(
                "Control channel not created, dropping '{}' message",
                message.cmd
            );
            return;
        };

        if !channel.is_open().await {
            error!(
                "Control channel '{}' not open, dropping '{}' message",
                channel.label(),
                message.cmd
            );
            return;
        }

        let text = match message.to_json_text() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode '{}' message: {}", message.cmd, e);
                return;
            }
        };

        match channel.send_text(text).await {
            Ok(()) => debug!("Sent '{}' control message", message.cmd),
            Err(e) => error!("Error sending '{}' control message: {}", message.cmd, e),
        }
    }

    fn handle_engine_event(&self, event: EngineEvent) {
        self.negotiator.observe(&event);

        match event {
            EngineEvent::ConnectionStateChanged(state) => {
                let previous = self.connection_state.send_replace(state);
                if previous == state {
                    return;
                }
                info!("Connection state {:?} -> {:?}", previous, state);
                match state {
                    ConnectionState::Connected => self.emit(SessionEvent::Connected),
                    ConnectionState::Disconnected | ConnectionState::Closed => {
                        self.emit(SessionEvent::Disconnected)
                    }
                    ConnectionState::Failed => warn!("Peer connection failed"),
                    ConnectionState::New | ConnectionState::Connecting => {}
                }
            }
            EngineEvent::TrackReceived(track) => {
                let stream_type = self.registry.kind_of(&track.stream_id);
                info!(
                    "Remote {} track {} on stream {} ({:?})",
                    track.kind, track.id, track.stream_id, stream_type
                );
                match track.kind {
                    MediaKind::Audio => self.emit(SessionEvent::TrackAudio { track, stream_type }),
                    MediaKind::Video => self.emit(SessionEvent::TrackVideo { track, stream_type }),
                }
            }
            EngineEvent::ChannelMessage { label, data } => match self.inbound.try_send(data) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    error!("Inbound control queue full, dropping message from '{}'", label)
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Control dispatcher stopped, dropping message from '{}'", label)
                }
            },
            EngineEvent::IceCandidate(_) | EngineEvent::IceGatheringStateChanged(_) => {}
        }
    }
}

async fn pump_engine_events(
    inner: Weak<SessionInner>,
    mut events: mpsc::UnboundedReceiver<EngineEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_engine_event(event);
    }
    debug!("Engine event pump stopped");
}

async fn dispatch_inbound(
    inner: Weak<SessionInner>,
    mut inbound: mpsc::Receiver<Bytes>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let raw = tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            raw = inbound.recv() => match raw {
                Some(raw) => raw,
                None => break,
            },
        };

        let Some(inner) = inner.upgrade() else {
            break;
        };
        handler::dispatch(&inner, &raw).await;
    }
    debug!("Control dispatcher stopped");
}

/// A negotiated peer session
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create a session over `engine`
    ///
    /// Registers the session as the engine's event sink and spawns the
    /// session tasks, so it must be called within a Tokio runtime. Returns
    /// the session and the receiver of its events.
    ///
    /// # Errors
    ///
    /// [`crate::Error::InvalidConfig`] if `config` does not validate.
    pub fn new(
        config: SessionConfig,
        engine: Arc<dyn ConnectionEngine>,
        capture: Arc<dyn MediaCapture>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>)> {
        config.validate()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(config.negotiation.inbound_queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, _) = watch::channel(ConnectionState::New);

        let negotiator = Negotiator::new(
            Arc::clone(&engine),
            config.negotiation.clone(),
            shutdown_rx.clone(),
        );

        let inner = Arc::new(SessionInner {
            config,
            engine,
            capture,
            negotiator,
            registry: StreamRegistry::new(),
            control_channel: RwLock::new(None),
            local_audio: Mutex::new(None),
            screen: Mutex::new(None),
            camera: Mutex::new(None),
            events: events_tx,
            connection_state: state_tx,
            shutdown: shutdown_tx,
            inbound: inbound_tx,
        });

        inner.engine.set_event_sink(engine_tx);
        tokio::spawn(pump_engine_events(Arc::downgrade(&inner), engine_rx));
        tokio::spawn(dispatch_inbound(
            Arc::downgrade(&inner),
            inbound_rx,
            shutdown_rx,
        ));

        Ok((Self { inner }, events_rx))
    }

    /// Open the control channel and attach the local microphone
    ///
    /// Must run before the first offer so the channel and audio are part of
    /// the initial negotiation. Idempotent.
    pub async fn start(&self) -> Result<()> {
        self.inner.start().await
    }

    /// Share the screen with the peer
    ///
    /// Returns `Ok(false)` without side effects if a screen share is already
    /// active. Otherwise tells the peer to drop any screen it holds from us,
    /// retires local screen entries and sends a screen offer.
    pub async fn start_screen_share(&self) -> Result<bool> {
        self.inner.start_screen_share().await
    }

    /// Stop the local screen share
    ///
    /// Returns `Ok(false)` if none was active. The peer is told only when
    /// `notify_peer` is set.
    pub async fn stop_screen_share(&self, notify_peer: bool) -> Result<bool> {
        self.inner.stop_screen_share(notify_peer).await
    }

    /// Share the camera with the peer. `Ok(false)` if already active.
    pub async fn start_camera(&self) -> Result<bool> {
        self.inner.start_camera().await
    }

    /// Stop the camera share and tell the peer. `Ok(false)` if none was active.
    pub async fn stop_camera(&self) -> Result<bool> {
        self.inner.stop_camera().await
    }

    /// Run a local offer round. Used to bootstrap the first negotiation
    /// before the control channel exists.
    pub async fn create_offer(&self) -> Result<NegotiationPayload> {
        self.inner.negotiator.create_offer().await
    }

    /// Answer a remote offer payload
    pub async fn create_answer(&self, remote: &NegotiationPayload) -> Result<NegotiationPayload> {
        self.inner.negotiator.create_answer(remote).await
    }

    /// Apply a remote payload (answer and candidates, or an offer)
    pub async fn process_payload(
        &self,
        payload: &NegotiationPayload,
    ) -> Result<Option<SessionDescription>> {
        self.inner.negotiator.process_payload(payload).await
    }

    /// Send a control message to the peer; dropped with an error log if the
    /// control channel is not open
    pub async fn send_message(&self, message: &ControlMessage) {
        self.inner.send_control(message).await
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.inner.registry
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.connection_state.borrow()
    }

    /// Watch connection state changes
    pub fn watch_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    pub async fn is_control_channel_open(&self) -> bool {
        let channel = self.inner.control_channel.read().await.clone();
        match channel {
            Some(channel) => channel.is_open().await,
            None => false,
        }
    }

    pub fn is_screen_share_supported(&self) -> bool {
        self.inner.capture.supports_screen_capture()
    }

    /// Id of the active local screen stream
    pub async fn screen_stream_id(&self) -> Option<String> {
        self.inner.screen.lock().await.as_ref().map(|s| s.id().to_string())
    }

    /// Id of the active local camera stream
    pub async fn camera_stream_id(&self) -> Option<String> {
        self.inner.camera.lock().await.as_ref().map(|s| s.id().to_string())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Tear the session down
    ///
    /// Cancels in-flight gathering waits, stops local streams without
    /// notifying the peer and closes the engine.
    pub async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}
