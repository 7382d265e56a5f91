//! Inbound control message dispatch

use super::{SessionEvent, SessionInner};
use crate::channels::{Command, ControlMessage, StreamKind};
use crate::Result;
use tracing::{debug, error, info, warn};

/// Handle one raw inbound control message
///
/// Recognized commands are acted on first; every message that parses as
/// JSON is then forwarded to the application as [`SessionEvent::DataMessage`].
pub(crate) async fn dispatch(inner: &SessionInner, raw: &[u8]) {
    let value: serde_json::Value = match serde_json::from_slice(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!("Dropping control message that is not JSON: {}", e);
            return;
        }
    };

    match ControlMessage::from_value(&value) {
        Ok(message) => {
            if let Err(e) = handle(inner, &message).await {
                error!("Error handling '{}' control message: {}", message.cmd, e);
            }
        }
        Err(e) => debug!("Control message has no usable command: {}", e),
    }

    inner.emit(SessionEvent::DataMessage(value));
}

async fn handle(inner: &SessionInner, message: &ControlMessage) -> Result<()> {
    match &message.cmd {
        Command::Offer => on_offer(inner, message).await,
        Command::Answer => on_answer(inner, message).await,
        Command::StopScreenShare => on_stop_screen_share(inner, message).await,
        Command::StopCameraShare => {
            on_stop_camera_share(inner, message);
            Ok(())
        }
        Command::Other(cmd) => {
            debug!("No handler for control command '{}'", cmd);
            Ok(())
        }
    }
}

async fn on_offer(inner: &SessionInner, message: &ControlMessage) -> Result<()> {
    match (&message.stream_id, message.stream_type) {
        (Some(stream_id), Some(kind)) if !stream_id.is_empty() => {
            inner.registry.register(stream_id.clone(), kind);
        }
        (Some(stream_id), None) => {
            warn!("Offer for stream {} has no streamType, not registered", stream_id);
        }
        _ => {}
    }

    let Some(payload) = &message.data else {
        warn!("Offer without negotiation data ignored");
        return Ok(());
    };

    let answer = inner.negotiator.create_answer(payload).await?;
    inner.send_control(&ControlMessage::answer(answer)).await;
    Ok(())
}

async fn on_answer(inner: &SessionInner, message: &ControlMessage) -> Result<()> {
    if !inner.negotiator.has_outstanding_offer() {
        warn!("Ignoring answer with no outstanding local offer");
        return Ok(());
    }

    let Some(payload) = &message.data else {
        warn!("Answer without negotiation data ignored");
        return Ok(());
    };

    inner.negotiator.process_payload(payload).await?;
    info!("Remote answer applied");
    Ok(())
}

async fn on_stop_screen_share(inner: &SessionInner, message: &ControlMessage) -> Result<()> {
    let stopped = inner.stop_screen_share(false).await;

    inner.emit(SessionEvent::StreamStopped {
        stream_type: StreamKind::Screen,
        stream_id: message.stream_id.clone(),
    });

    match &message.stream_id {
        Some(stream_id) => {
            inner.registry.remove(stream_id);
        }
        None => {
            inner.registry.retire_kind(StreamKind::Screen);
        }
    }

    stopped.map(|_| ())
}

/// Reflects the peer's camera ending. The local camera is left alone.
fn on_stop_camera_share(inner: &SessionInner, message: &ControlMessage) {
    inner.emit(SessionEvent::StreamStopped {
        stream_type: StreamKind::Camera,
        stream_id: message.stream_id.clone(),
    });

    if let Some(stream_id) = &message.stream_id {
        inner.registry.remove(stream_id);
    }
}
