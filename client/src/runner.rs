//! Session runner: the single thread of control.
//!
//! Every inbound socket event, timer tick and user intent is serialized onto
//! one channel and applied to the reducer in arrival order, so there is no
//! concurrent mutation of session state. Effects fan back out to the
//! connector and the timer set, and every change publishes a fresh
//! [`RoundView`] for whatever renders it.

use crate::network::{Connector, ConnectorConfig, TransportEvent};
use crate::session::{Effect, RoundView, Session, SessionEvent, UserIntent};
use crate::timers::TimerSet;
use log::{error, info};
use shared::Participant;
use tokio::sync::{mpsc, watch};

/// Handle given to the UI layer: feeds intents in, observes views out.
#[derive(Clone)]
pub struct SessionHandle {
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    shutdown_tx: mpsc::UnboundedSender<()>,
    view_rx: watch::Receiver<RoundView>,
}

impl SessionHandle {
    pub fn intent(&self, intent: UserIntent) {
        let _ = self.events_tx.send(SessionEvent::Intent(intent));
    }

    /// Requests a clean shutdown: timers cancelled, socket closed without
    /// reconnection.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub fn view(&self) -> watch::Receiver<RoundView> {
        self.view_rx.clone()
    }
}

pub struct SessionRunner {
    session: Session,
    timers: TimerSet,
    connector: Connector,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    shutdown_rx: mpsc::UnboundedReceiver<()>,
    view_tx: watch::Sender<RoundView>,
}

impl SessionRunner {
    pub fn new(identity: Participant, config: ConnectorConfig) -> (Self, SessionHandle) {
        let (connector, transport_rx) = Connector::new(config);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        let session = Session::new(identity);
        let (view_tx, view_rx) = watch::channel(session.view());

        let runner = Self {
            session,
            timers: TimerSet::new(events_tx.clone()),
            connector,
            transport_rx,
            events_rx,
            shutdown_rx,
            view_tx,
        };
        let handle = SessionHandle {
            events_tx,
            shutdown_tx,
            view_rx,
        };
        (runner, handle)
    }

    /// Opens the transport. Safe to call before or after `run`.
    pub fn connect(&mut self) {
        self.connector.connect();
    }

    /// Drives the session until the transport fails fatally or the handle
    /// requests a shutdown.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                transport = self.transport_rx.recv() => match transport {
                    Some(TransportEvent::Open) => info!("transport open"),
                    Some(TransportEvent::Snapshot(snapshot)) => {
                        self.dispatch(SessionEvent::Snapshot(snapshot));
                    }
                    Some(TransportEvent::Fatal) => {
                        error!("connection lost for good, ending session");
                        self.dispatch(SessionEvent::ConnectionLost);
                        self.timers.cancel_all();
                        break;
                    }
                    None => break,
                },

                event = self.events_rx.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },

                _ = self.shutdown_rx.recv() => {
                    info!("session shutdown requested");
                    self.timers.cancel_all();
                    self.connector.close();
                    break;
                }
            }
        }
    }

    fn dispatch(&mut self, event: SessionEvent) {
        let effects = self.session.apply(event);
        for effect in effects {
            match effect {
                Effect::Send(message) => {
                    if let Err(e) = self.connector.send(&message) {
                        error!("failed to queue {:?}: {}", message.event_type, e);
                    }
                }
                Effect::Arm {
                    kind,
                    seconds,
                    epoch,
                } => self.timers.arm(kind, seconds, epoch),
                Effect::Cancel(kind) => self.timers.cancel(kind),
            }
        }
        let _ = self.view_tx.send(self.session.view());
    }
}
