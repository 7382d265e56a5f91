//! Outbound bitrate cap

use crate::engine::{EncodingParameters, RtpSender};
use crate::Result;
use tracing::debug;

/// Cap every encoding of `sender` at `max_bitrate_bps`
///
/// A sender reporting no encodings gets a single capped one.
pub async fn apply_bitrate_cap(sender: &dyn RtpSender, max_bitrate_bps: u64) -> Result<()> {
    let mut parameters = sender.parameters().await;

    if parameters.encodings.is_empty() {
        parameters.encodings.push(EncodingParameters::default());
    }
    for encoding in &mut parameters.encodings {
        encoding.max_bitrate = Some(max_bitrate_bps);
    }

    sender.set_parameters(parameters).await?;

    debug!(
        "Capped track {} at {} bps",
        sender.track_id(),
        max_bitrate_bps
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SendParameters;
    use crate::Error;
    use async_trait::async_trait;
    use std::any::Any;
    use tokio::sync::Mutex;

    struct FakeSender {
        parameters: Mutex<SendParameters>,
        reject: bool,
    }

    impl FakeSender {
        fn new(encodings: usize) -> Self {
            Self {
                parameters: Mutex::new(SendParameters {
                    encodings: vec![EncodingParameters::default(); encodings],
                }),
                reject: false,
            }
        }
    }

    #[async_trait]
    impl RtpSender for FakeSender {
        fn track_id(&self) -> &str {
            "fake"
        }

        async fn parameters(&self) -> SendParameters {
            self.parameters.lock().await.clone()
        }

        async fn set_parameters(&self, parameters: SendParameters) -> Result<()> {
            if self.reject {
                return Err(Error::MediaTrackError("rejected".to_string()));
            }
            *self.parameters.lock().await = parameters;
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[tokio::test]
    async fn test_empty_encodings_get_one_capped_entry() {
        let sender = FakeSender::new(0);
        apply_bitrate_cap(&sender, 5_000_000).await.unwrap();

        let params = sender.parameters().await;
        assert_eq!(params.encodings.len(), 1);
        assert_eq!(params.encodings[0].max_bitrate, Some(5_000_000));
    }

    #[tokio::test]
    async fn test_every_encoding_capped() {
        let sender = FakeSender::new(3);
        apply_bitrate_cap(&sender, 1_000).await.unwrap();

        let params = sender.parameters().await;
        assert_eq!(params.encodings.len(), 3);
        assert!(params.encodings.iter().all(|e| e.max_bitrate == Some(1_000)));
    }

    #[tokio::test]
    async fn test_rejection_propagates() {
        let mut sender = FakeSender::new(1);
        sender.reject = true;
        assert!(apply_bitrate_cap(&sender, 1_000).await.is_err());
    }
}
