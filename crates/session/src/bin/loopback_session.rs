//! Loopback session demo
//!
//! Runs two sessions in one process, bootstraps the first negotiation
//! between them directly, then shares a synthetic camera or screen from
//! session A to session B over the control channel.

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use peershare_session::{
    ConnectionState, IceTransportPolicy, RtcEngine, Session, SessionConfig, SessionEvent,
    SyntheticCapture,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Stream shared from A to B once connected
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Share {
    Camera,
    Screen,
}

/// Two-session loopback demo
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Session config file (JSON); missing fields take defaults
    #[arg(long, env = "PEERSHARE_CONFIG")]
    config: Option<PathBuf>,

    /// STUN server URLs, comma separated; replaces the configured list
    #[arg(long, value_delimiter = ',', env = "PEERSHARE_STUN_SERVERS")]
    stun_servers: Vec<String>,

    /// Stream to share from A to B
    #[arg(long, value_enum, default_value = "camera", env = "PEERSHARE_SHARE")]
    share: Share,

    /// Seconds to wait for the connection and control channels
    #[arg(long, default_value_t = 15, env = "PEERSHARE_CONNECT_TIMEOUT")]
    connect_timeout_secs: u64,

    /// Seconds to keep the share running before closing
    #[arg(long, default_value_t = 5, env = "PEERSHARE_RUN_SECS")]
    run_secs: u64,
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        share = ?args.share,
        "Starting loopback session demo"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("loopback-worker")
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(run(args))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;

    let (a, a_events) = build_session("A", &config).await?;
    let (b, b_events) = build_session("B", &config).await?;
    let a_log = tokio::spawn(log_events("A", a_events));
    let b_log = tokio::spawn(log_events("B", b_events));

    futures::future::try_join(a.start(), b.start())
        .await
        .context("failed to start sessions")?;

    // First round goes direct; later rounds travel over the control channel.
    let offer = a.create_offer().await.context("A failed to create offer")?;
    info!("A offer carries {} item(s)", offer.len());
    let answer = b
        .create_answer(&offer)
        .await
        .context("B failed to answer")?;
    info!("B answer carries {} item(s)", answer.len());
    a.process_payload(&answer)
        .await
        .context("A failed to apply answer")?;

    let timeout = Duration::from_secs(args.connect_timeout_secs);
    tokio::time::timeout(timeout, async {
        futures::future::try_join(wait_until_ready(&a), wait_until_ready(&b)).await
    })
    .await
    .context("timed out waiting for sessions to connect")??;
    info!("Both sessions connected with open control channels");

    let started = match args.share {
        Share::Camera => a.start_camera().await?,
        Share::Screen => a.start_screen_share().await?,
    };
    if !started {
        warn!("Share was already active");
    }

    tokio::time::sleep(Duration::from_secs(args.run_secs)).await;

    match args.share {
        Share::Camera => a.stop_camera().await?,
        Share::Screen => a.stop_screen_share(true).await?,
    };
    // Let the stop message reach B before tearing down
    tokio::time::sleep(Duration::from_millis(500)).await;

    info!("B registry at shutdown: {:?}", b.registry().snapshot());

    a.close().await?;
    b.close().await?;
    drop((a, b));

    let _ = tokio::time::timeout(Duration::from_secs(1), async {
        tokio::join!(a_log, b_log)
    })
    .await;
    info!("Loopback demo finished");
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SessionConfig::default(),
    };

    if !args.stun_servers.is_empty() {
        config = config.with_stun_servers(args.stun_servers.clone());
    }

    // Relay-only needs a TURN server; host candidates are enough in-process
    if config.turn_servers.is_empty() && config.ice_transport_policy == IceTransportPolicy::Relay {
        info!("No TURN servers configured, allowing all ICE candidates");
        config = config.with_ice_transport_policy(IceTransportPolicy::All);
    }

    config.validate()?;
    Ok(config)
}

async fn build_session(
    name: &str,
    config: &SessionConfig,
) -> anyhow::Result<(Session, mpsc::UnboundedReceiver<SessionEvent>)> {
    let engine = RtcEngine::new(config)
        .await
        .with_context(|| format!("failed to create engine for session {}", name))?;
    let session = Session::new(
        config.clone(),
        Arc::new(engine),
        Arc::new(SyntheticCapture::new()),
    )?;
    Ok(session)
}

async fn wait_until_ready(session: &Session) -> anyhow::Result<()> {
    let mut state = session.watch_connection_state();
    let reached = state
        .wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Failed))
        .await
        .map(|s| *s)
        .context("session dropped while connecting")?;
    if reached == ConnectionState::Failed {
        bail!("peer connection failed");
    }

    let mut poll = tokio::time::interval(Duration::from_millis(100));
    while !session.is_control_channel_open().await {
        poll.tick().await;
    }
    Ok(())
}

async fn log_events(name: &'static str, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::TrackAudio { track, stream_type }
            | SessionEvent::TrackVideo { track, stream_type } => {
                info!(
                    session = name,
                    "Remote {} track {} ({:?})", track.kind, track.id, stream_type
                );
            }
            SessionEvent::DataMessage(value) => {
                info!(session = name, "Control message: {}", value);
            }
            SessionEvent::StreamStopped {
                stream_type,
                stream_id,
            } => {
                info!(
                    session = name,
                    "Remote {} stream {:?} stopped", stream_type, stream_id
                );
            }
            other => info!(session = name, "Session event: {}", other.name()),
        }
    }
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
