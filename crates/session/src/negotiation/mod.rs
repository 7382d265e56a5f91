//! Offer/answer negotiation
//!
//! A negotiation round produces one local description plus every local
//! candidate gathered for it, bundled as a [`NegotiationPayload`]. Rounds are
//! serialized: a round that starts while another is in flight waits for it.
//!
//! Local candidates and gathering state reach the negotiator through
//! [`Negotiator::observe`], fed from the engine's event stream in order.

mod gather;
mod payload;

pub use gather::{wait_for_gathering, GatherOutcome};
pub use payload::{NegotiationItem, NegotiationPayload};

use crate::config::NegotiationOptions;
use crate::engine::{
    ConnectionEngine, EngineEvent, IceCandidate, IceGatheringState, SessionDescription,
};
use crate::sdp::prefer_codec;
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument};

/// Runs negotiation rounds against a connection engine
pub struct Negotiator {
    engine: Arc<dyn ConnectionEngine>,
    options: NegotiationOptions,
    /// Held for the duration of a round
    round: Mutex<()>,
    candidates: parking_lot::Mutex<Vec<IceCandidate>>,
    gathering: watch::Sender<IceGatheringState>,
    offer_outstanding: AtomicBool,
    shutdown: watch::Receiver<bool>,
}

impl Negotiator {
    pub fn new(
        engine: Arc<dyn ConnectionEngine>,
        options: NegotiationOptions,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (gathering, _) = watch::channel(IceGatheringState::New);
        Self {
            engine,
            options,
            round: Mutex::new(()),
            candidates: parking_lot::Mutex::new(Vec::new()),
            gathering,
            offer_outstanding: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Feed an engine event. Candidate and gathering events are consumed,
    /// everything else is ignored.
    pub fn observe(&self, event: &EngineEvent) {
        match event {
            EngineEvent::IceCandidate(candidate) => {
                if candidate.is_end_of_candidates() {
                    return;
                }
                debug!("Buffered local candidate {}", candidate.candidate);
                self.candidates.lock().push(candidate.clone());
            }
            EngineEvent::IceGatheringStateChanged(state) => {
                self.gathering.send_replace(*state);
            }
            _ => {}
        }
    }

    /// Whether a local offer is awaiting its answer
    pub fn has_outstanding_offer(&self) -> bool {
        self.offer_outstanding.load(Ordering::SeqCst)
    }

    /// Create, rewrite and commit a local offer, then gather
    ///
    /// Returns the committed description followed by the candidates gathered
    /// within the deadline.
    #[instrument(skip(self))]
    pub async fn create_offer(&self) -> Result<NegotiationPayload> {
        let _round = self.round.lock().await;
        self.reset_candidates();

        let offer = self.engine.create_offer(true, true).await?;
        let offer = SessionDescription::offer(prefer_codec(
            &offer.sdp,
            "video",
            &self.options.preferred_video_codec,
        ));

        self.engine.set_local_description(offer.clone()).await?;
        self.offer_outstanding.store(true, Ordering::SeqCst);

        // An offer that never leaves this side has no answer to wait for
        let outcome = match self.wait_for_gathering().await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.offer_outstanding.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let description = self.engine.local_description().await.unwrap_or(offer);
        let candidates = self.take_candidates();
        info!(
            "Offer ready with {} candidate(s) ({:?})",
            candidates.len(),
            outcome
        );

        Ok(NegotiationPayload::with_candidates(description, candidates))
    }

    /// Apply a remote offer payload and produce the answer payload
    ///
    /// # Errors
    ///
    /// [`Error::SdpError`] if the payload carries no offer.
    #[instrument(skip(self, remote), fields(items = remote.len()))]
    pub async fn create_answer(&self, remote: &NegotiationPayload) -> Result<NegotiationPayload> {
        let _round = self.round.lock().await;
        self.reset_candidates();

        let answer = self.apply_payload(remote).await?.ok_or_else(|| {
            Error::SdpError("remote payload carried no offer to answer".to_string())
        })?;

        let outcome = self.wait_for_gathering().await?;

        let candidates = self.take_candidates();
        info!(
            "Answer ready with {} candidate(s) ({:?})",
            candidates.len(),
            outcome
        );

        Ok(NegotiationPayload::with_candidates(answer, candidates))
    }

    /// Apply a remote payload in order
    ///
    /// Returns the committed local answer if the payload carried an offer.
    pub async fn process_payload(
        &self,
        payload: &NegotiationPayload,
    ) -> Result<Option<SessionDescription>> {
        let _round = self.round.lock().await;
        self.apply_payload(payload).await
    }

    /// Caller holds the round lock
    async fn apply_payload(
        &self,
        payload: &NegotiationPayload,
    ) -> Result<Option<SessionDescription>> {
        let mut answer = None;

        for item in payload {
            match item {
                NegotiationItem::Offer { sdp } => {
                    self.engine
                        .set_remote_description(SessionDescription::offer(sdp.clone()))
                        .await?;
                    let local = self.engine.create_answer().await?;
                    self.engine.set_local_description(local.clone()).await?;
                    debug!("Remote offer applied, local answer committed");
                    answer = Some(local);
                }
                NegotiationItem::Answer { sdp } => {
                    self.engine
                        .set_remote_description(SessionDescription::answer(sdp.clone()))
                        .await?;
                    self.offer_outstanding.store(false, Ordering::SeqCst);
                    debug!("Remote answer applied");
                }
                NegotiationItem::Candidate { candidate } => {
                    if candidate.is_end_of_candidates() {
                        continue;
                    }
                    self.engine.add_candidate(candidate.clone()).await?;
                }
            }
        }

        Ok(answer)
    }

    async fn wait_for_gathering(&self) -> Result<GatherOutcome> {
        let mut state = self.gathering.subscribe();
        let mut shutdown = self.shutdown.clone();
        debug!(
            "Waiting up to {:?} for ICE gathering",
            self.options.gather_deadline()
        );
        wait_for_gathering(
            &mut state,
            &mut shutdown,
            self.options.gather_poll_interval(),
            self.options.ice_gather_max_polls,
        )
        .await
    }

    fn reset_candidates(&self) {
        let dropped = std::mem::take(&mut *self.candidates.lock());
        if !dropped.is_empty() {
            debug!("Discarding {} candidate(s) gathered outside a round", dropped.len());
        }
    }

    fn take_candidates(&self) -> Vec<IceCandidate> {
        std::mem::take(&mut *self.candidates.lock())
    }
}
