//! Error types for peer sessions

/// Result type alias using the session Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while negotiating or driving a peer session
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// SDP creation, rewrite or commit failed
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// ICE candidate rejected or malformed
    #[error("ICE candidate error: {0}")]
    IceCandidateError(String),

    /// Media track attach/detach or sender parameter error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// Capture device denied or unavailable
    #[error("Capture error: {0}")]
    CaptureError(String),

    /// Side channel error
    #[error("Data channel error: {0}")]
    DataChannelError(String),

    /// Peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The owning session was torn down while an operation was waiting
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// Internal error (should not occur in normal operation)
    #[error("Internal error: {0}")]
    InternalError(String),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error came from an external collaborator (engine or
    /// capture device) rather than from the session itself
    pub fn is_capability_error(&self) -> bool {
        matches!(
            self,
            Error::SdpError(_)
                | Error::IceCandidateError(_)
                | Error::MediaTrackError(_)
                | Error::CaptureError(_)
                | Error::PeerConnectionError(_)
                | Error::WebRtcError(_)
        )
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    /// Hint for callers: whether repeating the operation could succeed.
    /// The session itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::DataChannelError(_) | Error::CaptureError(_) | Error::IoError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::SdpError("no offer".to_string());
        assert_eq!(err.to_string(), "SDP negotiation error: no offer");
    }

    #[test]
    fn test_capability_errors() {
        assert!(Error::CaptureError("denied".to_string()).is_capability_error());
        assert!(Error::IceCandidateError("bad".to_string()).is_capability_error());
        assert!(!Error::InvalidConfig("x".to_string()).is_capability_error());
        assert!(!Error::SessionClosed("x".to_string()).is_capability_error());
    }

    #[test]
    fn test_is_config_error() {
        assert!(Error::InvalidConfig("test".to_string()).is_config_error());
        assert!(!Error::SdpError("test".to_string()).is_config_error());
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::CaptureError("busy".to_string()).is_retryable());
        assert!(!Error::SdpError("rejected".to_string()).is_retryable());
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = Error::from(json_err);
        assert!(matches!(err, Error::SerializationError(_)));
    }
}
