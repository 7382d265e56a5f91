//! Local stream lifecycle: microphone, screen share, camera share

use super::{SessionEvent, SessionInner};
use crate::capture::{ConstraintSet, LocalStream};
use crate::channels::{ControlMessage, StreamKind};
use crate::engine::RtpSender;
use crate::media::apply_bitrate_cap;
use crate::negotiation::NegotiationPayload;
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A local stream and the senders its tracks are attached through
pub(crate) struct ActiveStream {
    stream: LocalStream,
    senders: Vec<Arc<dyn RtpSender>>,
}

impl ActiveStream {
    pub(crate) fn id(&self) -> &str {
        self.stream.id()
    }
}

impl SessionInner {
    /// Open the control channel and attach the microphone
    pub(crate) async fn start(&self) -> Result<()> {
        let mut audio = self.local_audio.lock().await;

        if self.control_channel.read().await.is_none() {
            let label = &self.config.negotiation.control_channel_label;
            let channel = self.engine.open_side_channel(label).await?;
            info!("Control channel '{}' created", label);
            *self.control_channel.write().await = Some(channel);
        }

        if audio.is_some() {
            debug!("Session already started");
            return Ok(());
        }

        let constraints = self.constraints_for(&self.config.stream_constraints.audio)?;
        let stream = self.capture.acquire_audio(&constraints).await?;
        let senders = self.attach_stream(&stream, None).await?;

        info!("Microphone stream {} attached", stream.id());
        *audio = Some(ActiveStream { stream, senders });
        Ok(())
    }

    pub(crate) async fn start_screen_share(&self) -> Result<bool> {
        let mut screen = self.screen.lock().await;
        if screen.is_some() {
            debug!("Screen share already active");
            return Ok(false);
        }

        let constraints = self.constraints_for(&self.config.stream_constraints.screen)?;
        let stream = self.capture.acquire_screen(&constraints).await?;
        let senders = self
            .attach_stream(&stream, Some(self.config.negotiation.max_bitrate_bps))
            .await?;
        let stream_id = stream.id().to_string();
        let (active, payload) = self.negotiate_stream(ActiveStream { stream, senders }).await?;

        self.send_control(&ControlMessage::stop_screen_share(None)).await;
        for retired in self.registry.retire_kind(StreamKind::Screen) {
            self.emit(SessionEvent::StreamStopped {
                stream_type: StreamKind::Screen,
                stream_id: Some(retired),
            });
        }

        self.send_control(&ControlMessage::offer(StreamKind::Screen, &stream_id, payload))
            .await;
        *screen = Some(active);

        info!("Screen share {} started", stream_id);
        Ok(true)
    }

    pub(crate) async fn stop_screen_share(&self, notify_peer: bool) -> Result<bool> {
        let Some(active) = self.screen.lock().await.take() else {
            return Ok(false);
        };
        let stream_id = active.id().to_string();

        let detached = self.detach_stream(active).await;
        if notify_peer {
            self.send_control(&ControlMessage::stop_screen_share(Some(stream_id.clone())))
                .await;
        }

        info!("Screen share {} stopped (peer notified: {})", stream_id, notify_peer);
        detached.map(|_| true)
    }

    pub(crate) async fn start_camera(&self) -> Result<bool> {
        let mut camera = self.camera.lock().await;
        if camera.is_some() {
            debug!("Camera share already active");
            return Ok(false);
        }

        let constraints = self.constraints_for(&self.config.stream_constraints.video)?;
        let stream = self.capture.acquire_video(&constraints).await?;
        let senders = self
            .attach_stream(&stream, Some(self.config.negotiation.max_bitrate_bps))
            .await?;
        let stream_id = stream.id().to_string();
        let (active, payload) = self.negotiate_stream(ActiveStream { stream, senders }).await?;

        self.send_control(&ControlMessage::offer(StreamKind::Camera, &stream_id, payload))
            .await;
        *camera = Some(active);

        info!("Camera share {} started", stream_id);
        Ok(true)
    }

    pub(crate) async fn stop_camera(&self) -> Result<bool> {
        let Some(active) = self.camera.lock().await.take() else {
            return Ok(false);
        };
        let stream_id = active.id().to_string();

        let detached = self.detach_stream(active).await;
        self.send_control(&ControlMessage::stop_camera_share(stream_id.clone()))
            .await;

        info!("Camera share {} stopped", stream_id);
        detached.map(|_| true)
    }

    /// Stop every local stream without notifying the peer, then close the engine
    pub(crate) async fn close(&self) -> Result<()> {
        self.shutdown.send_replace(true);

        let streams = [
            self.screen.lock().await.take(),
            self.camera.lock().await.take(),
            self.local_audio.lock().await.take(),
        ];
        for active in streams.into_iter().flatten() {
            if let Err(e) = self.detach_stream(active).await {
                warn!("Error detaching stream during close: {}", e);
            }
        }

        self.engine.close().await?;
        info!("Session closed");
        Ok(())
    }

    /// Build the constraint set passed to the capture device
    fn constraints_for<T: Serialize>(&self, constraints: &T) -> Result<ConstraintSet> {
        Ok(ConstraintSet::from_constraints(constraints)?
            .retain_supported(&self.capture.supported_constraints()))
    }

    /// Attach every track of `stream`, capping each sender if requested
    ///
    /// On failure the senders attached so far are removed and the stream is
    /// stopped before the error is returned.
    async fn attach_stream(
        &self,
        stream: &LocalStream,
        bitrate_cap: Option<u64>,
    ) -> Result<Vec<Arc<dyn RtpSender>>> {
        let mut senders: Vec<Arc<dyn RtpSender>> = Vec::with_capacity(stream.tracks().len());

        for track in stream.tracks() {
            let attached = match self.engine.add_track(Arc::clone(track)).await {
                Ok(sender) => {
                    senders.push(Arc::clone(&sender));
                    match bitrate_cap {
                        Some(bps) => apply_bitrate_cap(sender.as_ref(), bps).await,
                        None => Ok(()),
                    }
                }
                Err(e) => Err(e),
            };

            if let Err(e) = attached {
                error!("Failed to attach track {}: {}", track.id(), e);
                for sender in senders {
                    if let Err(e) = self.engine.remove_track(sender).await {
                        warn!("Rollback could not remove sender: {}", e);
                    }
                }
                stream.stop();
                return Err(e);
            }
        }

        Ok(senders)
    }

    /// Run an offer round for a freshly attached stream
    ///
    /// If the round fails the stream is detached before the error is
    /// returned, so the share can be started again.
    async fn negotiate_stream(
        &self,
        active: ActiveStream,
    ) -> Result<(ActiveStream, NegotiationPayload)> {
        match self.negotiator.create_offer().await {
            Ok(payload) => Ok((active, payload)),
            Err(e) => {
                error!("Offer round for stream {} failed: {}", active.id(), e);
                if let Err(detach) = self.detach_stream(active).await {
                    warn!("Rollback could not detach stream: {}", detach);
                }
                Err(e)
            }
        }
    }

    /// Stop the stream's tracks and remove its senders
    ///
    /// Every sender is removed even if one removal fails; the first error is
    /// returned.
    async fn detach_stream(&self, active: ActiveStream) -> Result<()> {
        active.stream.stop();

        let mut first_error = None;
        for sender in active.senders {
            if let Err(e) = self.engine.remove_track(sender).await {
                warn!("Failed to remove sender of stream {}: {}", active.stream.id(), e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
