//! Bounded wait for ICE gathering

use crate::engine::IceGatheringState;
use crate::{Error, Result};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// How a gathering wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherOutcome {
    Complete,
    /// The deadline passed; whatever was gathered so far is used
    TimedOut,
}

/// Wait until `state` reports `Complete`, at most `max_polls` intervals
///
/// Returns as soon as gathering completes. A timeout is not an error. Fails
/// with [`Error::SessionClosed`] if `shutdown` flips to `true` first.
pub async fn wait_for_gathering(
    state: &mut watch::Receiver<IceGatheringState>,
    shutdown: &mut watch::Receiver<bool>,
    poll_interval: Duration,
    max_polls: u32,
) -> Result<GatherOutcome> {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    let mut polls = 0u32;
    loop {
        if *state.borrow_and_update() == IceGatheringState::Complete {
            debug!("ICE gathering complete after {} poll(s)", polls);
            return Ok(GatherOutcome::Complete);
        }
        if *shutdown.borrow_and_update() {
            return Err(Error::SessionClosed(
                "closed while waiting for ICE gathering".to_string(),
            ));
        }
        if polls >= max_polls {
            warn!(
                "ICE gathering not complete after {:?}, sending partial candidates",
                poll_interval.saturating_mul(max_polls)
            );
            return Ok(GatherOutcome::TimedOut);
        }

        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() {
                    return Err(Error::SessionClosed("session dropped".to_string()));
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    return Err(Error::SessionClosed("gathering state source dropped".to_string()));
                }
            }
            _ = ticker.tick() => {
                polls += 1;
            }
        }
    }
}
