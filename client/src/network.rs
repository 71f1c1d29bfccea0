//! Transport connector: owns the persistent server socket.
//!
//! One background task drives the connection: it reads newline-delimited
//! frames, writes queued outbound messages, sends a periodic liveness probe,
//! and reconnects a bounded number of times after abnormal closures. Every
//! decoded snapshot is handed to the single-threaded session runner through
//! an event channel; parse failures are logged and dropped, never surfaced
//! as a session-ending error.

use log::{debug, error, info, warn};
use shared::codec::{self, Inbound};
use shared::{Snapshot, WireMessage, HEARTBEAT_PROBE};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};

/// Connection tuning. Defaults follow the protocol constants; tests shorten
/// the intervals so they do not wait wall-clock seconds.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub addr: String,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
}

impl ConnectorConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            heartbeat_interval: Duration::from_secs(shared::HEARTBEAT_INTERVAL_SECS),
            reconnect_delay: Duration::from_secs(shared::RECONNECT_DELAY_SECS),
            max_reconnect_attempts: shared::MAX_RECONNECT_ATTEMPTS,
        }
    }
}

/// Events the connector reports to the session runner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The socket opened (or re-opened after a transient disconnect).
    Open,
    Snapshot(Snapshot),
    /// The reconnect ceiling was exceeded; the session is over. Reported
    /// exactly once.
    Fatal,
}

enum Outbound {
    Frame(String),
    Shutdown,
}

enum Closure {
    Clean,
    Abnormal,
}

pub struct Connector {
    config: ConnectorConfig,
    running: Arc<AtomicBool>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: Option<mpsc::UnboundedReceiver<Outbound>>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl Connector {
    pub fn new(config: ConnectorConfig) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        (
            Self {
                config,
                running: Arc::new(AtomicBool::new(false)),
                outbound_tx,
                outbound_rx: Some(outbound_rx),
                event_tx,
            },
            event_rx,
        )
    }

    /// Starts the connection task. Idempotent: a second call while the task
    /// is connecting or connected is a no-op.
    pub fn connect(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("connect() ignored: already connecting or connected");
            return;
        }
        let Some(outbound_rx) = self.outbound_rx.take() else {
            warn!("connect() ignored: connector already shut down");
            return;
        };
        let config = self.config.clone();
        let event_tx = self.event_tx.clone();
        let running = Arc::clone(&self.running);
        tokio::spawn(run_connection(config, outbound_rx, event_tx, running));
    }

    /// Queues a message; it is flushed once the socket is open, surviving a
    /// reconnect in between.
    pub fn send(&self, message: &WireMessage) -> Result<(), Box<dyn std::error::Error>> {
        let frame = codec::encode_outbound(message)?;
        self.outbound_tx
            .send(Outbound::Frame(frame))
            .map_err(|_| "transport task stopped")?;
        Ok(())
    }

    /// Clean, caller-initiated closure: no reconnection is attempted.
    pub fn close(&self) {
        let _ = self.outbound_tx.send(Outbound::Shutdown);
    }
}

async fn run_connection(
    config: ConnectorConfig,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    running: Arc<AtomicBool>,
) {
    let mut attempts: u32 = 0;

    loop {
        match TcpStream::connect(&config.addr).await {
            Ok(stream) => {
                info!("connected to {}", config.addr);
                attempts = 0;
                let _ = event_tx.send(TransportEvent::Open);

                match drive(stream, &config, &mut outbound_rx, &event_tx).await {
                    Closure::Clean => break,
                    Closure::Abnormal => {}
                }
            }
            Err(e) => warn!("connect to {} failed: {}", config.addr, e),
        }

        if attempts >= config.max_reconnect_attempts {
            error!(
                "giving up after {} reconnect attempts to {}",
                attempts, config.addr
            );
            let _ = event_tx.send(TransportEvent::Fatal);
            break;
        }
        attempts += 1;
        info!(
            "reconnecting in {:?} (attempt {}/{})",
            config.reconnect_delay, attempts, config.max_reconnect_attempts
        );
        sleep(config.reconnect_delay).await;
    }

    running.store(false, Ordering::SeqCst);
}

/// Services one open connection until it closes.
async fn drive(
    stream: TcpStream,
    config: &ConnectorConfig,
    outbound_rx: &mut mpsc::UnboundedReceiver<Outbound>,
    event_tx: &mpsc::UnboundedSender<TransportEvent>,
) -> Closure {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let mut heartbeat = interval(config.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the probe starts one interval in.
    heartbeat.tick().await;

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(raw)) => match codec::decode_inbound(&raw) {
                    Ok(Inbound::Snapshot(snapshot)) => {
                        let _ = event_tx.send(TransportEvent::Snapshot(snapshot));
                    }
                    Ok(Inbound::HeartbeatReply) => debug!("heartbeat reply received"),
                    Err(e) => warn!("dropping malformed frame: {}", e),
                },
                Ok(None) => {
                    warn!("server closed the connection");
                    return Closure::Abnormal;
                }
                Err(e) => {
                    warn!("read error: {}", e);
                    return Closure::Abnormal;
                }
            },

            message = outbound_rx.recv() => match message {
                Some(Outbound::Frame(frame)) => {
                    if let Err(e) = write_frame(&mut writer, &frame).await {
                        warn!("write error: {}", e);
                        return Closure::Abnormal;
                    }
                }
                Some(Outbound::Shutdown) | None => {
                    info!("closing connection");
                    let _ = writer.shutdown().await;
                    return Closure::Clean;
                }
            },

            _ = heartbeat.tick() => {
                if let Err(e) = write_frame(&mut writer, HEARTBEAT_PROBE).await {
                    warn!("heartbeat send failed: {}", e);
                    return Closure::Abnormal;
                }
            }
        }
    }
}

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &str) -> std::io::Result<()> {
    writer.write_all(frame.as_bytes()).await?;
    writer.write_all(b"\n").await
}
