//! Two-party WebRTC session negotiation for screen and camera sharing
//!
//! This crate negotiates a peer-to-peer media session between two endpoints
//! and runs a small JSON control protocol over a reliable data channel to
//! add and remove screen-share and camera streams.
//!
//! # Features
//!
//! - **Offer/answer rounds**: description plus gathered candidates in one payload
//! - **Bounded ICE gathering wait**: partial candidates after the deadline
//! - **Codec preference**: preferred video codec moved to the front of the offer
//! - **Control protocol**: offer, answer, stopScreenShare, stopCameraShare
//! - **Stream registry**: labels remote tracks as screen or camera
//! - **Pluggable engine and capture**: webrtc-rs and a synthetic capture included
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  Application                                         │
//! │  ↓ start / start_screen_share / start_camera / ...   │
//! │  Session                                             │
//! │  ├─ Negotiator (round lock, candidate buffer)        │
//! │  │   └─ sdp::prefer_codec                            │
//! │  ├─ StreamRegistry (remote stream id → kind)         │
//! │  ├─ control dispatcher (bounded inbound queue)       │
//! │  └─ engine event pump                                │
//! │     ↓                                                │
//! │  ConnectionEngine (RtcEngine on webrtc-rs)           │
//! │  MediaCapture (SyntheticCapture)                     │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use peershare_session::{IceTransportPolicy, SessionConfig};
//!
//! let config = SessionConfig::from_json_str(r#"{"iceTransportPolicy": "all"}"#).unwrap();
//! assert_eq!(config.ice_transport_policy, IceTransportPolicy::All);
//! assert_eq!(config.negotiation.preferred_video_codec, "VP8");
//! ```
//!
//! ## Async Usage
//!
//! ```no_run
//! use peershare_session::{RtcEngine, Session, SessionConfig, SyntheticCapture};
//! use std::sync::Arc;
//!
//! # async fn example() -> peershare_session::Result<()> {
//! let config = SessionConfig::default();
//! let engine = Arc::new(RtcEngine::new(&config).await?);
//! let (session, mut events) = Session::new(config, engine, Arc::new(SyntheticCapture::new()))?;
//!
//! session.start().await?;
//! let offer = session.create_offer().await?;
//! // deliver `offer` to the peer out of band, then apply its answer:
//! // session.process_payload(&answer).await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod capture;
pub mod channels;
pub mod config;
pub mod engine;
pub mod error;
pub mod media;
pub mod negotiation;
pub mod sdp;
mod session;

pub use capture::{
    ConstraintSet, LocalStream, LocalTrack, MediaCapture, SupportedConstraints, SyntheticCapture,
};
pub use channels::{Command, ControlMessage, StreamKind};
pub use config::{
    AudioConstraints, BundlePolicy, IceTransportPolicy, MaxConstraint, NegotiationOptions,
    ScreenConstraints, SessionConfig, StreamConstraints, TurnServerConfig, VideoConstraints,
};
pub use engine::{
    ConnectionEngine, ConnectionState, EngineEvent, IceCandidate, MediaKind, RemoteTrack,
    RtcEngine, SessionDescription,
};
pub use error::{Error, Result};
pub use media::StreamRegistry;
pub use negotiation::{NegotiationItem, NegotiationPayload, Negotiator};
pub use session::{Session, SessionEvent};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
