//! Session controller: turns gateway lines into call state and notifications.
//!
//! [`NcidSession`] owns one connection and one background task. The task is
//! the only writer of the call state; readers get copies through a `watch`
//! channel, so [`CallPresence`] accessors never block and never fail, even
//! while the link is reconnecting.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::{
    call::{advance, CallDirection, CallState},
    config::NcidConfig,
    connection::{ConnectionStatus, NcidConnection, NcidLineStream},
    error::{NcidError, NcidResult},
    identity::CallerIdentity,
    protocol::{parse, parse_status},
};

/// Receives call notifications from a session.
///
/// Called from the session task; implementations should return quickly.
pub trait CallObserver: Send + Sync {
    /// Every call-state change.
    fn on_state_changed(&self, state: CallState);

    /// A call started ringing and the gateway supplied a name or number.
    fn on_call_identified(&self, direction: CallDirection, identity: &CallerIdentity);

    /// Gateway link status changed.
    fn on_connection_status(&self, _status: ConnectionStatus) {}
}

/// Read side of a running session.
pub trait CallPresence {
    fn current_state(&self) -> CallState;
    fn current_identity(&self) -> CallerIdentity;
    fn connection_status(&self) -> ConnectionStatus;
}

/// Notification as a value, for consumers that prefer a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    StateChanged(CallState),
    CallIdentified {
        direction: CallDirection,
        identity: CallerIdentity,
    },
    ConnectionStatusChanged(ConnectionStatus),
}

impl CallObserver for mpsc::UnboundedSender<CallEvent> {
    fn on_state_changed(&self, state: CallState) {
        let _ = self.send(CallEvent::StateChanged(state));
    }

    fn on_call_identified(&self, direction: CallDirection, identity: &CallerIdentity) {
        let _ = self.send(CallEvent::CallIdentified {
            direction,
            identity: identity.clone(),
        });
    }

    fn on_connection_status(&self, status: ConnectionStatus) {
        let _ = self.send(CallEvent::ConnectionStatusChanged(status));
    }
}

/// Current call state and the identity of the most recent caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSnapshot {
    pub state: CallState,
    pub identity: CallerIdentity,
}

/// Line-processing half of the controller, independent of any socket.
pub struct SessionCore {
    snapshot_tx: watch::Sender<CallSnapshot>,
    observer: Arc<dyn CallObserver>,
}

impl std::fmt::Debug for SessionCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCore")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl SessionCore {
    /// Start on hook with no known caller.
    pub fn new(observer: Arc<dyn CallObserver>) -> Self {
        let (snapshot_tx, _) = watch::channel(CallSnapshot::default());
        Self {
            snapshot_tx,
            observer,
        }
    }

    /// Receiver that sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshot_tx
            .subscribe()
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> CallSnapshot {
        self.snapshot_tx
            .borrow()
            .clone()
    }

    /// Process one protocol line.
    ///
    /// Status lines and unparseable lines are logged and skipped. The
    /// snapshot is published before observers are notified.
    pub fn handle_line(&self, line: &str) {
        if line
            .trim()
            .is_empty()
        {
            return;
        }

        if let Some(status) = parse_status(line) {
            debug!(code = status.code, "Status line: {}", status.text);
            return;
        }

        let msg = match parse(line) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Skipping line: {}", e);
                return;
            }
        };
        debug!(command = msg.command(), "Handling message: {:?}", msg.fields());

        let current = self.snapshot();
        let transition = advance(current.state, &msg);

        if let Some(anomaly) = transition.anomaly {
            warn!(
                command = msg.command(),
                from = %current.state,
                to = %transition.next,
                "{}",
                anomaly
            );
        }

        let state_changed = transition.next != current.state;
        let identity_changed = transition
            .identity
            .as_ref()
            .is_some_and(|id| *id != current.identity);

        if !state_changed && !identity_changed {
            return;
        }

        self.snapshot_tx
            .send_modify(|snapshot| {
                snapshot.state = transition.next;
                if let Some(identity) = &transition.identity {
                    snapshot.identity = identity.clone();
                }
            });

        if !state_changed {
            return;
        }

        info!("Call state {} -> {}", current.state, transition.next);
        self.observer
            .on_state_changed(transition.next);

        if let (Some(direction), Some(identity)) = (
            transition
                .next
                .ringing_direction(),
            &transition.identity,
        ) {
            if !identity.is_empty() {
                info!("NCID reports {} call: {}", direction, identity);
                self.observer
                    .on_call_identified(direction, identity);
            }
        }
    }

    fn connection_status_changed(&self, status: ConnectionStatus) {
        match status {
            ConnectionStatus::Disconnected => warn!("Gateway link {}", status),
            _ => info!("Gateway link {}", status),
        }
        self.observer
            .on_connection_status(status);
    }
}

async fn session_task(
    core: SessionCore,
    mut lines: NcidLineStream,
    mut status_rx: watch::Receiver<ConnectionStatus>,
) {
    let mut watching_status = true;

    loop {
        tokio::select! {
            item = lines.recv() => match item {
                Some(Ok(line)) => core.handle_line(&line),
                Some(Err(NcidError::QueueFull)) => {
                    warn!("Session fell behind, gateway lines were dropped");
                }
                Some(Err(NcidError::Cancelled)) => {
                    debug!("Line stream cancelled");
                }
                Some(Err(e)) => warn!("Line stream error: {}", e),
                None => break,
            },
            changed = status_rx.changed(), if watching_status => {
                if changed.is_ok() {
                    let status = *status_rx.borrow_and_update();
                    core.connection_status_changed(status);
                } else {
                    watching_status = false;
                }
            }
        }
    }

    debug!("Session task exiting");
}

/// A running NCID session: one gateway connection plus the call state
/// derived from it.
pub struct NcidSession {
    display_name: String,
    connection: NcidConnection,
    snapshot_rx: watch::Receiver<CallSnapshot>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for NcidSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NcidSession")
            .field("display_name", &self.display_name)
            .field("state", &self.current_state())
            .field("connection", &self.connection_status())
            .finish()
    }
}

impl NcidSession {
    /// Start a session that logs under an `ncid` span named after the line.
    pub fn spawn(config: NcidConfig, observer: Arc<dyn CallObserver>) -> NcidResult<Self> {
        let span = info_span!(
            "ncid",
            name = %config.display_name,
            host = %config.host,
            port = config.port
        );
        Self::spawn_with_span(config, observer, span)
    }

    /// Start a session whose task logs inside `span`.
    ///
    /// Returns without waiting for the gateway; until the first connect the
    /// session reports [`CallState::OnHook`] and
    /// [`ConnectionStatus::Disconnected`].
    pub fn spawn_with_span(
        config: NcidConfig,
        observer: Arc<dyn CallObserver>,
        span: Span,
    ) -> NcidResult<Self> {
        let (connection, lines) = {
            let _guard = span.enter();
            NcidConnection::start(&config)?
        };

        let core = SessionCore::new(observer);
        let snapshot_rx = core.subscribe();
        let status_rx = connection.watch_status();

        let task = tokio::spawn(session_task(core, lines, status_rx).instrument(span));

        Ok(Self {
            display_name: config.display_name,
            connection,
            snapshot_rx,
            task: Mutex::new(Some(task)),
        })
    }

    /// Name of the monitored line.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Current call state and identity as one consistent copy.
    pub fn snapshot(&self) -> CallSnapshot {
        self.snapshot_rx
            .borrow()
            .clone()
    }

    /// Receiver that observes every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshot_rx
            .clone()
    }

    /// The underlying gateway connection.
    pub fn connection(&self) -> &NcidConnection {
        &self.connection
    }

    /// Close the socket and wait for the session task to exit.
    pub async fn stop(&self) {
        self.connection
            .stop()
            .await;
        let handle = self
            .task
            .lock()
            .await
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("session task did not exit cleanly: {}", e);
            }
        }
        info!("Session {} stopped", self.display_name);
    }
}

impl CallPresence for NcidSession {
    fn current_state(&self) -> CallState {
        self.snapshot_rx
            .borrow()
            .state
    }

    fn current_identity(&self) -> CallerIdentity {
        self.snapshot_rx
            .borrow()
            .identity
            .clone()
    }

    fn connection_status(&self) -> ConnectionStatus {
        self.connection
            .status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core_with_events() -> (SessionCore, mpsc::UnboundedReceiver<CallEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SessionCore::new(Arc::new(tx)), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<CallEvent>) -> Vec<CallEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_incoming_call_lifecycle() {
        let (core, mut rx) = core_with_events();

        core.handle_line("CID: *NMBR*5551234*");
        assert_eq!(
            drain(&mut rx),
            vec![
                CallEvent::StateChanged(CallState::IncomingRinging),
                CallEvent::CallIdentified {
                    direction: CallDirection::Incoming,
                    identity: CallerIdentity::from_number("5551234"),
                },
            ]
        );

        core.handle_line("CIDINFO: *RING*0*");
        core.handle_line("CIDINFO: *RING*-2*");
        assert_eq!(
            drain(&mut rx),
            vec![
                CallEvent::StateChanged(CallState::InCall),
                CallEvent::StateChanged(CallState::OnHook),
            ]
        );

        let snapshot = core.snapshot();
        assert_eq!(snapshot.state, CallState::OnHook);
        assert_eq!(snapshot.identity, CallerIdentity::from_number("5551234"));
    }

    #[test]
    fn test_outgoing_call_identified() {
        let (core, mut rx) = core_with_events();

        core.handle_line(
            "OUT: *DATE*01152017*TIME*0010*LINE*4901*NMBR*012345611*MESG*NONE*NAME*NO NAME*",
        );
        assert_eq!(
            drain(&mut rx),
            vec![
                CallEvent::StateChanged(CallState::OutgoingRinging),
                CallEvent::CallIdentified {
                    direction: CallDirection::Outgoing,
                    identity: CallerIdentity::from_number("012345611"),
                },
            ]
        );
    }

    #[test]
    fn test_anonymous_call_not_identified() {
        let (core, mut rx) = core_with_events();

        core.handle_line("CID: *NMBR*-*NAME*NO NAME*");
        assert_eq!(
            drain(&mut rx),
            vec![CallEvent::StateChanged(CallState::IncomingRinging)]
        );
    }

    #[test]
    fn test_repeated_ring_is_silent() {
        let (core, mut rx) = core_with_events();

        core.handle_line("CID: *NMBR*1*");
        drain(&mut rx);
        core.handle_line("CIDINFO: *RING*2*");
        core.handle_line("CIDINFO: *RING*3*");
        assert!(drain(&mut rx).is_empty());
        assert_eq!(core.snapshot().state, CallState::IncomingRinging);
    }

    #[test]
    fn test_status_and_garbage_lines_ignored() {
        let (core, mut rx) = core_with_events();
        let mut snapshots = core.subscribe();

        core.handle_line("200 Server: ncidd (NCID) 1.7");
        core.handle_line("no separator at all");
        core.handle_line("MSG: broken");
        core.handle_line("MSG: Hello ***NAME*X*");
        core.handle_line("");

        assert!(drain(&mut rx).is_empty());
        assert_eq!(core.snapshot(), CallSnapshot::default());
        assert!(!snapshots
            .has_changed()
            .unwrap());
    }

    #[test]
    fn test_end_updates_identity_without_state_change() {
        let (core, mut rx) = core_with_events();

        core.handle_line("END: *HTYPE*BYE*CTYPE*IN*NMBR*5550000*NAME*CAROL*");
        assert!(drain(&mut rx).is_empty());
        assert_eq!(core.snapshot().state, CallState::OnHook);
        assert_eq!(
            core.snapshot().identity,
            CallerIdentity::new("CAROL", "5550000")
        );
    }

    #[test]
    fn test_self_healing_ring() {
        let (core, mut rx) = core_with_events();

        core.handle_line("CIDINFO: *LINE*1*RING*3*");
        assert_eq!(
            drain(&mut rx),
            vec![CallEvent::StateChanged(CallState::IncomingRinging)]
        );
    }

    #[test]
    fn test_call_snapshot_serializes() {
        let snapshot = CallSnapshot {
            state: CallState::InCall,
            identity: CallerIdentity::from_number("5551234"),
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["state"], "in_call");
        assert_eq!(json["identity"]["number"], "5551234");
        assert!(json["identity"]["name"].is_null());
    }
}
