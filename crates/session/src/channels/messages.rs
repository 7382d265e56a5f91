//! Control protocol messages
//!
//! Every message on the control channel is a JSON object with a `cmd` field.
//! Recognized commands drive renegotiation and stream teardown; any other
//! `cmd` value is preserved so the application can handle it.

use crate::negotiation::NegotiationPayload;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest control message accepted for sending
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024;

/// Category of a shared media stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Screen,
    Camera,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Screen => write!(f, "screen"),
            StreamKind::Camera => write!(f, "camera"),
        }
    }
}

/// Control command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Command {
    Offer,
    Answer,
    StopScreenShare,
    StopCameraShare,
    /// Unrecognized command, kept verbatim
    Other(String),
}

impl Command {
    pub fn as_str(&self) -> &str {
        match self {
            Command::Offer => "offer",
            Command::Answer => "answer",
            Command::StopScreenShare => "stopScreenShare",
            Command::StopCameraShare => "stopCameraShare",
            Command::Other(cmd) => cmd,
        }
    }
}

impl From<String> for Command {
    fn from(value: String) -> Self {
        match value.as_str() {
            "offer" => Command::Offer,
            "answer" => Command::Answer,
            "stopScreenShare" => Command::StopScreenShare,
            "stopCameraShare" => Command::StopCameraShare,
            _ => Command::Other(value),
        }
    }
}

impl From<Command> for String {
    fn from(cmd: Command) -> Self {
        match cmd {
            Command::Other(cmd) => cmd,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message exchanged on the control channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlMessage {
    pub cmd: Command,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_type: Option<StreamKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<NegotiationPayload>,
}

impl ControlMessage {
    /// Offer announcing a new local stream
    pub fn offer(stream_type: StreamKind, stream_id: impl Into<String>, data: NegotiationPayload) -> Self {
        Self {
            cmd: Command::Offer,
            stream_id: Some(stream_id.into()),
            stream_type: Some(stream_type),
            data: Some(data),
        }
    }

    pub fn answer(data: NegotiationPayload) -> Self {
        Self {
            cmd: Command::Answer,
            stream_id: None,
            stream_type: None,
            data: Some(data),
        }
    }

    /// Screen share ended. Without a stream id the receiver retires every
    /// screen entry it holds.
    pub fn stop_screen_share(stream_id: Option<String>) -> Self {
        Self {
            cmd: Command::StopScreenShare,
            stream_id,
            stream_type: None,
            data: None,
        }
    }

    pub fn stop_camera_share(stream_id: impl Into<String>) -> Self {
        Self {
            cmd: Command::StopCameraShare,
            stream_id: Some(stream_id.into()),
            stream_type: None,
            data: None,
        }
    }

    pub fn to_json_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        Ok(Self::deserialize(value)?)
    }
}
