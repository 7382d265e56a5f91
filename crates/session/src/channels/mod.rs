//! Control channel: message schema and the webrtc-rs data channel it rides on

mod data_channel;
mod messages;

pub use data_channel::{ChannelState, ControlChannel};
pub use messages::{Command, ControlMessage, StreamKind, MAX_MESSAGE_SIZE};
