//! Control data channel over webrtc-rs
//!
//! Wraps a locally created `RTCDataChannel` as the session's outbound
//! [`SideChannel`]. Inbound control traffic arrives on the channel the remote
//! peer opens and is surfaced as `EngineEvent::ChannelMessage` by the engine.

use super::messages::MAX_MESSAGE_SIZE;
use crate::engine::SideChannel;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::RTCPeerConnection;

/// Data channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

/// Ordered, reliable control channel
pub struct ControlChannel {
    label: String,
    rtc_channel: Arc<RTCDataChannel>,
    state: Arc<RwLock<ChannelState>>,
}

impl ControlChannel {
    /// Create the channel on `peer_connection`
    ///
    /// The channel is usable once the connection's SCTP association is up;
    /// until then [`SideChannel::is_open`] reports `false`.
    pub async fn open(peer_connection: &RTCPeerConnection, label: &str) -> Result<Self> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };

        let rtc_channel = peer_connection
            .create_data_channel(label, Some(init))
            .await
            .map_err(|e| {
                Error::DataChannelError(format!("Failed to create data channel: {}", e))
            })?;

        let channel = Self {
            label: label.to_string(),
            rtc_channel,
            state: Arc::new(RwLock::new(ChannelState::Connecting)),
        };

        channel.setup_state_handler();

        Ok(channel)
    }

    fn setup_state_handler(&self) {
        let state = Arc::clone(&self.state);
        let label = self.label.clone();

        self.rtc_channel.on_open(Box::new(move || {
            let state = Arc::clone(&state);
            let label = label.clone();
            Box::pin(async move {
                debug!("Control channel '{}' opened", label);
                *state.write().await = ChannelState::Open;
            })
        }));

        let state = Arc::clone(&self.state);
        let label = self.label.clone();

        self.rtc_channel.on_close(Box::new(move || {
            let state = Arc::clone(&state);
            let label = label.clone();
            Box::pin(async move {
                debug!("Control channel '{}' closed", label);
                *state.write().await = ChannelState::Closed;
            })
        }));

        let label = self.label.clone();
        self.rtc_channel.on_error(Box::new(move |err| {
            let label = label.clone();
            Box::pin(async move {
                error!("Control channel '{}' error: {}", label, err);
            })
        }));
    }

    pub async fn state(&self) -> ChannelState {
        *self.state.read().await
    }
}

#[async_trait]
impl SideChannel for ControlChannel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn is_open(&self) -> bool {
        self.state().await == ChannelState::Open
    }

    async fn send_text(&self, text: String) -> Result<()> {
        if text.len() > MAX_MESSAGE_SIZE {
            return Err(Error::DataChannelError(format!(
                "Message size {} exceeds maximum {} bytes",
                text.len(),
                MAX_MESSAGE_SIZE
            )));
        }

        let state = self.state().await;
        if state != ChannelState::Open {
            return Err(Error::DataChannelError(format!(
                "Data channel is not open (state: {:?})",
                state
            )));
        }

        let len = text.len();
        self.rtc_channel
            .send_text(text)
            .await
            .map_err(|e| Error::DataChannelError(format!("Failed to send message: {}", e)))?;

        debug!("Sent {} bytes on control channel '{}'", len, self.label);

        Ok(())
    }
}
