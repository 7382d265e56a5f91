//! Configuration types for peer sessions
//!
//! Every struct carries `#[serde(default)]`, so a partial JSON document is
//! merged field-by-field onto the documented defaults below.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Longest ICE gathering wait a configuration may ask for
pub const MAX_GATHER_DEADLINE: Duration = Duration::from_secs(300);

/// Main configuration for a [`crate::Session`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// STUN server URLs
    pub stun_servers: Vec<String>,

    /// TURN server configurations
    pub turn_servers: Vec<TurnServerConfig>,

    /// Media bundling policy (default: max-bundle)
    pub bundle_policy: BundlePolicy,

    /// ICE candidate types the engine may use (default: relay)
    pub ice_transport_policy: IceTransportPolicy,

    /// Capture constraints for microphone, camera and screen
    pub stream_constraints: StreamConstraints,

    /// Negotiation tuning
    pub negotiation: NegotiationOptions,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TurnServerConfig {
    /// TURN server URL (turn: or turns:)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

/// Media bundling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundlePolicy {
    Balanced,
    MaxCompat,
    MaxBundle,
}

/// ICE transport policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceTransportPolicy {
    /// Host, server-reflexive and relay candidates
    All,
    /// Relay candidates only
    Relay,
}

/// An upper bound for a numeric capture constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxConstraint {
    pub max: u32,
}

impl MaxConstraint {
    pub const fn new(max: u32) -> Self {
        Self { max }
    }
}

/// Microphone constraints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub sample_rate: u32,
    pub channel_count: u16,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            sample_rate: 32000,
            channel_count: 1,
        }
    }
}

/// Camera capture constraints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VideoConstraints {
    pub width: MaxConstraint,
    pub height: MaxConstraint,
    pub frame_rate: MaxConstraint,
}

impl Default for VideoConstraints {
    /// 1440x900 @ 16 fps
    fn default() -> Self {
        Self {
            width: MaxConstraint::new(1440),
            height: MaxConstraint::new(900),
            frame_rate: MaxConstraint::new(16),
        }
    }
}

/// Screen capture constraints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScreenConstraints {
    pub width: MaxConstraint,
    pub height: MaxConstraint,
    pub frame_rate: MaxConstraint,
}

impl Default for ScreenConstraints {
    /// 1920x1080 @ 16 fps
    fn default() -> Self {
        Self {
            width: MaxConstraint::new(1920),
            height: MaxConstraint::new(1080),
            frame_rate: MaxConstraint::new(16),
        }
    }
}

/// Per-source capture constraints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConstraints {
    pub audio: AudioConstraints,
    /// Camera constraints
    pub video: VideoConstraints,
    pub screen: ScreenConstraints,
}

/// Negotiation tuning knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NegotiationOptions {
    /// Video codec moved to the front of locally created offers (default: VP8)
    pub preferred_video_codec: String,

    /// Max bitrate applied to every outgoing screen/camera encoding (default: 5 Mbps)
    pub max_bitrate_bps: u64,

    /// Interval between ICE gathering checks (default: 250ms)
    pub ice_gather_poll_interval_ms: u64,

    /// Number of checks before giving up on gathering (default: 20)
    pub ice_gather_max_polls: u32,

    /// Label of the locally created control channel (default: "data")
    pub control_channel_label: String,

    /// Capacity of the inbound control message queue (default: 64)
    pub inbound_queue_capacity: usize,
}

impl Default for NegotiationOptions {
    fn default() -> Self {
        Self {
            preferred_video_codec: "VP8".to_string(),
            max_bitrate_bps: 5_000_000,
            ice_gather_poll_interval_ms: 250,
            ice_gather_max_polls: 20,
            control_channel_label: "data".to_string(),
            inbound_queue_capacity: 64,
        }
    }
}

impl NegotiationOptions {
    /// Interval between gathering checks
    pub fn gather_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ice_gather_poll_interval_ms)
    }

    /// Upper bound on the gathering wait
    pub fn gather_deadline(&self) -> Duration {
        self.gather_poll_interval()
            .saturating_mul(self.ice_gather_max_polls)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stun_servers: Vec::new(),
            turn_servers: Vec::new(),
            bundle_policy: BundlePolicy::MaxBundle,
            ice_transport_policy: IceTransportPolicy::Relay,
            stream_constraints: StreamConstraints::default(),
            negotiation: NegotiationOptions::default(),
        }
    }
}

impl SessionConfig {
    /// Parse a (possibly partial) JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a (possibly partial) JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `ice_transport_policy` is relay but no TURN server is configured
    ///   and STUN servers are present (a relay-only session with only STUN
    ///   can never gather a usable candidate)
    /// - a STUN or TURN URL has the wrong scheme
    /// - `preferred_video_codec` or `control_channel_label` is empty
    /// - `max_bitrate_bps`, `ice_gather_poll_interval_ms`,
    ///   `ice_gather_max_polls` or `inbound_queue_capacity` is zero
    /// - the gathering wait exceeds [`MAX_GATHER_DEADLINE`]
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = self
            .stun_servers
            .iter()
            .find(|u| !u.starts_with("stun:") && !u.starts_with("stuns:"))
        {
            return Err(Error::InvalidConfig(format!(
                "STUN url must start with stun: or stuns:, got {}",
                url
            )));
        }

        if let Some(turn) = self
            .turn_servers
            .iter()
            .find(|t| !t.url.starts_with("turn:") && !t.url.starts_with("turns:"))
        {
            return Err(Error::InvalidConfig(format!(
                "TURN url must start with turn: or turns:, got {}",
                turn.url
            )));
        }

        if self.ice_transport_policy == IceTransportPolicy::Relay
            && self.turn_servers.is_empty()
            && !self.stun_servers.is_empty()
        {
            return Err(Error::InvalidConfig(
                "relay-only ICE policy requires at least one TURN server".to_string(),
            ));
        }

        let n = &self.negotiation;
        if n.preferred_video_codec.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "preferred_video_codec must not be empty".to_string(),
            ));
        }
        if n.control_channel_label.is_empty() {
            return Err(Error::InvalidConfig(
                "control_channel_label must not be empty".to_string(),
            ));
        }
        if n.max_bitrate_bps == 0 {
            return Err(Error::InvalidConfig("max_bitrate_bps must be > 0".to_string()));
        }
        if n.ice_gather_poll_interval_ms == 0 || n.ice_gather_max_polls == 0 {
            return Err(Error::InvalidConfig(format!(
                "ICE gathering wait must be bounded and non-zero, got {}ms x {}",
                n.ice_gather_poll_interval_ms, n.ice_gather_max_polls
            )));
        }
        if n.gather_deadline() > MAX_GATHER_DEADLINE {
            return Err(Error::InvalidConfig(format!(
                "ICE gathering wait of {}ms x {} exceeds {:?}",
                n.ice_gather_poll_interval_ms, n.ice_gather_max_polls, MAX_GATHER_DEADLINE
            )));
        }
        if n.inbound_queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "inbound_queue_capacity must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Add STUN servers to this configuration
    pub fn with_stun_servers(mut self, stun_servers: Vec<String>) -> Self {
        self.stun_servers = stun_servers;
        self
    }

    /// Add TURN servers to this configuration
    pub fn with_turn_servers(mut self, turn_servers: Vec<TurnServerConfig>) -> Self {
        self.turn_servers = turn_servers;
        self
    }

    /// Set the ICE transport policy
    pub fn with_ice_transport_policy(mut self, policy: IceTransportPolicy) -> Self {
        self.ice_transport_policy = policy;
        self
    }

    /// Replace the capture constraints
    pub fn with_stream_constraints(mut self, constraints: StreamConstraints) -> Self {
        self.stream_constraints = constraints;
        self
    }

    /// Replace the negotiation options
    pub fn with_negotiation(mut self, negotiation: NegotiationOptions) -> Self {
        self.negotiation = negotiation;
        self
    }
}
