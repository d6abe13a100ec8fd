//! Domain events and the channel that moves them off the network thread.

use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Why the broker link went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The broker answered the connect handshake with a non-zero return code.
    Refused(u8),
    /// Network level failure (refused socket, timeout, dropped link, ...).
    Transport(String),
    /// The broker sent a DISCONNECT packet.
    Broker,
    /// The station asked for the disconnect.
    Requested,
}

impl DisconnectReason {
    /// Numeric reason code in the style of MQTT return codes.
    pub fn code(&self) -> i32 {
        match self {
            DisconnectReason::Refused(code) => i32::from(*code),
            DisconnectReason::Transport(_) => -1,
            DisconnectReason::Broker => 7,
            DisconnectReason::Requested => 0,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DisconnectReason::Refused(code) => write!(f, "rc={}", code),
            DisconnectReason::Transport(msg) => write!(f, "rc=-1, {}", msg),
            DisconnectReason::Broker => write!(f, "rc=7, closed by broker"),
            DisconnectReason::Requested => write!(f, "rc=0"),
        }
    }
}

/// Something that happened on the network side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    Connected,
    Disconnected(DisconnectReason),
    MessageReceived { topic: String, payload: String },
    /// Emitted right before the worker waits `delay` for reconnect attempt `attempt`.
    Reconnecting { attempt: u32, delay: Duration },
}

/// Creates the event channel. The sender goes to the network task, the
/// receiver stays on the presentation thread.
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

/// Producer half. Cloneable and usable from any thread; `push` never blocks.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<DomainEvent>,
}

impl EventSender {
    pub fn push(&self, event: DomainEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!("Event receiver gone, dropping {:?}", e.0);
        }
    }
}

/// Consumer half. There is exactly one, owned by the presentation thread.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<DomainEvent>,
}

impl EventReceiver {
    /// Returns every event pushed since the last drain, oldest first.
    pub fn drain_all(&mut self) -> Vec<DomainEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
