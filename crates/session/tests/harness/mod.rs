//! Session test harness
//!
//! Provides:
//! - [`MockEngine`]: in-memory engine with call recording and linked side channels
//! - [`RecordingCapture`]: capture source that records requested constraints
//! - [`Peer`]: a session wired to both, plus its event receiver
//!
//! Basic usage pattern:
//!
//! 1. Build two peers with [`Peer::pair`]
//! 2. Run the first round with [`bootstrap`]
//! 3. Drive one side and wait on the other with [`Peer::wait_for`]

#![allow(dead_code)]

pub mod capture;
pub mod mock_engine;

use peershare_session::{Session, SessionConfig, SessionEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub use capture::{Device, RecordingCapture};
pub use mock_engine::{link, Call, MockEngine, MOCK_ANSWER_SDP, MOCK_OFFER_SDP};

/// How long a test waits for an expected session event
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize test logging (call once per test)
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,peershare_session=debug")
        .with_test_writer()
        .try_init();
}

/// Config with host candidates allowed
pub fn test_config() -> SessionConfig {
    SessionConfig::default()
        .with_ice_transport_policy(peershare_session::IceTransportPolicy::All)
}

pub struct Peer {
    pub session: Session,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub engine: Arc<MockEngine>,
    pub capture: Arc<RecordingCapture>,
}

impl Peer {
    pub fn new(engine: MockEngine) -> Self {
        Self::with_capture(engine, RecordingCapture::new())
    }

    pub fn with_capture(engine: MockEngine, capture: RecordingCapture) -> Self {
        Self::with_config(test_config(), engine, capture)
    }

    pub fn with_config(config: SessionConfig, engine: MockEngine, capture: RecordingCapture) -> Self {
        let engine = Arc::new(engine);
        let capture = Arc::new(capture);
        let (session, events) = Session::new(
            config,
            engine.clone(),
            capture.clone(),
        )
        .expect("session builds");
        Self {
            session,
            events,
            engine,
            capture,
        }
    }

    /// Two peers whose side channels deliver to each other
    pub fn pair() -> (Peer, Peer) {
        let a = Peer::new(MockEngine::new("a"));
        let b = Peer::new(MockEngine::new("b"));
        link(&a.engine, &b.engine);
        (a, b)
    }

    /// Wait for the first event matching `pred`, skipping others
    pub async fn wait_for<F>(&mut self, mut pred: F) -> SessionEvent
    where
        F: FnMut(&SessionEvent) -> bool,
    {
        tokio::time::timeout(EVENT_TIMEOUT, async {
            loop {
                match self.events.recv().await {
                    Some(event) if pred(&event) => return event,
                    Some(_) => continue,
                    None => panic!("session event stream ended"),
                }
            }
        })
        .await
        .expect("timed out waiting for session event")
    }

    /// Wait for the next forwarded control message
    pub async fn next_data_message(&mut self) -> serde_json::Value {
        match self
            .wait_for(|e| matches!(e, SessionEvent::DataMessage(_)))
            .await
        {
            SessionEvent::DataMessage(value) => value,
            _ => unreachable!(),
        }
    }

    /// Wait for the next forwarded control message carrying `cmd`
    pub async fn next_message_with_cmd(&mut self, cmd: &str) -> serde_json::Value {
        match self
            .wait_for(|e| matches!(e, SessionEvent::DataMessage(v) if v["cmd"] == cmd))
            .await
        {
            SessionEvent::DataMessage(value) => value,
            _ => unreachable!(),
        }
    }

    /// Events already queued, without waiting
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}

/// Start both peers and run the first negotiation round directly
pub async fn bootstrap(a: &Peer, b: &Peer) {
    a.session.start().await.expect("a starts");
    b.session.start().await.expect("b starts");

    let offer = a.session.create_offer().await.expect("a offers");
    let answer = b.session.create_answer(&offer).await.expect("b answers");
    a.session
        .process_payload(&answer)
        .await
        .expect("a applies answer");
}
