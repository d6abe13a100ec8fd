//! Connection State Machine
//!
//! Tracks the broker link as seen through domain events and decides which side
//! effects a transition needs. The machine itself never calls the transport; it
//! hands back a [`Transition`] and the console carries out the effects.
//!
//! ```text
//!                start
//! Disconnected ─────────► Connecting ──Connected──► Connected
//!      ▲  ▲                   │                        │
//!      │  └──── Disconnected ─┤                        │ Disconnected
//!      │                      │ Refused                ▼ (reset device)
//!      │                      ▼                  Disconnected
//!      │            Failed{rc, retry} ◄─┐ Reconnecting / Refused
//!      │                      └─────────┘        │
//!      │                      │ Connected        │ Reconnecting
//!      │                      ▼                  ▼
//!      └──────────────── Reconnecting{n} ──Connected──► Connected
//! ```
//!
//! A refused handshake stays `Failed` while the worker keeps retrying, so bad
//! credentials never read as a transient outage.

use tracing::{debug, info, warn};

use crate::bus::{DisconnectReason, DomainEvent};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// The broker rejected the connect handshake with return code `code`.
    /// `retry` is the pending reconnect attempt, if the worker is retrying.
    Failed { code: u8, retry: Option<u32> },
    /// Waiting out the backoff before reconnect attempt `attempt`
    Reconnecting { attempt: u32 },
}

/// Colour class of a status badge, mapped to real colours by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    Good,
    Pending,
    Bad,
}

/// Side effects requested by a state change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transition {
    /// Subscribe to the inbound topics (entered Connected)
    pub subscribe: bool,
    /// Forget the device liveness (left Connected)
    pub reset_device: bool,
    /// The state actually changed
    pub changed: bool,
}

#[derive(Debug, Default)]
pub struct ConnectionMachine {
    state: ConnectionState,
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// The operator (or startup) asked for a connection
    pub fn start_requested(&mut self) -> Transition {
        self.enter(ConnectionState::Connecting)
    }

    /// Shutdown was requested; the link is gone from our point of view
    pub fn stop_requested(&mut self) -> Transition {
        self.enter(ConnectionState::Disconnected)
    }

    /// Applies a lifecycle event. Message events leave the state untouched.
    pub fn apply(&mut self, event: &DomainEvent) -> Transition {
        match event {
            DomainEvent::Connected => {
                if self.is_connected() {
                    debug!("Duplicate Connected event ignored");
                    return Transition::default();
                }
                self.enter(ConnectionState::Connected)
            }
            DomainEvent::Disconnected(reason) => match (&self.state, reason) {
                (ConnectionState::Connecting, DisconnectReason::Refused(code)) => {
                    warn!("Broker rejected connect handshake (rc={})", code);
                    self.enter(ConnectionState::Failed {
                        code: *code,
                        retry: None,
                    })
                }
                (ConnectionState::Failed { retry, .. }, DisconnectReason::Refused(code)) => {
                    debug!("Retry rejected again (rc={})", code);
                    let retry = *retry;
                    self.enter(ConnectionState::Failed { code: *code, retry })
                }
                _ => self.enter(ConnectionState::Disconnected),
            },
            DomainEvent::Reconnecting { attempt, .. } => match &self.state {
                ConnectionState::Failed { code, .. } => {
                    let code = *code;
                    self.enter(ConnectionState::Failed {
                        code,
                        retry: Some(*attempt),
                    })
                }
                _ => self.enter(ConnectionState::Reconnecting { attempt: *attempt }),
            },
            DomainEvent::MessageReceived { .. } => Transition::default(),
        }
    }

    fn enter(&mut self, next: ConnectionState) -> Transition {
        if next == self.state {
            return Transition::default();
        }
        let was_connected = self.is_connected();
        info!("Connection state {:?} -> {:?}", self.state, next);
        self.state = next;

        Transition {
            subscribe: self.is_connected(),
            reset_device: was_connected,
            changed: true,
        }
    }

    pub fn status_text(&self) -> String {
        match &self.state {
            ConnectionState::Disconnected => "Broker: Disconnected".to_string(),
            ConnectionState::Connecting => "Broker: Connecting...".to_string(),
            ConnectionState::Connected => "Broker: Connected".to_string(),
            ConnectionState::Failed { code, retry: None } => {
                format!("Broker: Failed (rc={})", code)
            }
            ConnectionState::Failed {
                code,
                retry: Some(attempt),
            } => format!("Broker: Failed (rc={}), retrying (attempt {})", code, attempt),
            ConnectionState::Reconnecting { attempt } => {
                format!("Broker: Reconnecting (attempt {})", attempt)
            }
        }
    }

    pub fn tone(&self) -> StatusTone {
        match &self.state {
            ConnectionState::Connected => StatusTone::Good,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. } => {
                StatusTone::Pending
            }
            ConnectionState::Disconnected | ConnectionState::Failed { .. } => StatusTone::Bad,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn disconnected(reason: DisconnectReason) -> DomainEvent {
        DomainEvent::Disconnected(reason)
    }

    fn reconnecting(attempt: u32) -> DomainEvent {
        DomainEvent::Reconnecting {
            attempt,
            delay: Duration::from_millis(500),
        }
    }

    #[test]
    fn connect_subscribes_once() {
        let mut machine = ConnectionMachine::new();
        assert_eq!(machine.state(), &ConnectionState::Disconnected);

        machine.start_requested();
        assert_eq!(machine.state(), &ConnectionState::Connecting);

        let first = machine.apply(&DomainEvent::Connected);
        assert!(first.subscribe);
        assert!(!first.reset_device);

        let duplicate = machine.apply(&DomainEvent::Connected);
        assert_eq!(duplicate, Transition::default());
        assert_eq!(machine.state(), &ConnectionState::Connected);
    }

    #[test]
    fn leaving_connected_resets_device() {
        let mut machine = ConnectionMachine::new();
        machine.start_requested();
        machine.apply(&DomainEvent::Connected);

        let lost = machine.apply(&disconnected(DisconnectReason::Transport(
            "connection reset".to_string(),
        )));
        assert!(lost.reset_device);
        assert!(!lost.subscribe);
        assert_eq!(machine.state(), &ConnectionState::Disconnected);
    }

    #[test]
    fn refused_handshake_stays_failed_while_retrying() {
        let mut machine = ConnectionMachine::new();
        machine.start_requested();
        let failed = machine.apply(&disconnected(DisconnectReason::Refused(5)));
        assert_eq!(
            machine.state(),
            &ConnectionState::Failed {
                code: 5,
                retry: None
            }
        );
        assert!(!failed.reset_device);
        assert_eq!(machine.status_text(), "Broker: Failed (rc=5)");
        assert_eq!(machine.tone(), StatusTone::Bad);

        machine.apply(&reconnecting(1));
        machine.apply(&disconnected(DisconnectReason::Refused(5)));
        machine.apply(&reconnecting(2));
        assert_eq!(
            machine.status_text(),
            "Broker: Failed (rc=5), retrying (attempt 2)"
        );
        assert_eq!(machine.tone(), StatusTone::Bad);

        let back = machine.apply(&DomainEvent::Connected);
        assert!(back.subscribe);
        assert_eq!(machine.state(), &ConnectionState::Connected);
    }

    #[test]
    fn refusal_after_losing_an_established_link_is_a_disconnect() {
        let mut machine = ConnectionMachine::new();
        machine.start_requested();
        machine.apply(&DomainEvent::Connected);
        machine.apply(&disconnected(DisconnectReason::Broker));
        machine.apply(&reconnecting(1));
        machine.apply(&disconnected(DisconnectReason::Refused(5)));
        assert_eq!(machine.state(), &ConnectionState::Disconnected);
    }

    #[test]
    fn transport_error_while_failed_clears_the_refusal() {
        let mut machine = ConnectionMachine::new();
        machine.start_requested();
        machine.apply(&disconnected(DisconnectReason::Refused(4)));
        machine.apply(&disconnected(DisconnectReason::Transport(
            "connection refused".into(),
        )));
        machine.apply(&reconnecting(2));
        assert_eq!(
            machine.state(),
            &ConnectionState::Reconnecting { attempt: 2 }
        );
        assert_eq!(machine.tone(), StatusTone::Pending);
    }

    #[test]
    fn reconnect_cycle() {
        let mut machine = ConnectionMachine::new();
        machine.start_requested();
        machine.apply(&DomainEvent::Connected);
        machine.apply(&disconnected(DisconnectReason::Broker));
        machine.apply(&reconnecting(1));
        assert_eq!(
            machine.state(),
            &ConnectionState::Reconnecting { attempt: 1 }
        );
        assert_eq!(machine.tone(), StatusTone::Pending);
        assert_eq!(machine.status_text(), "Broker: Reconnecting (attempt 1)");

        machine.apply(&disconnected(DisconnectReason::Transport("timeout".into())));
        machine.apply(&reconnecting(2));
        let back = machine.apply(&DomainEvent::Connected);
        assert!(back.subscribe);
        assert_eq!(machine.tone(), StatusTone::Good);
    }

    #[test]
    fn every_connection_establishment_subscribes() {
        let mut machine = ConnectionMachine::new();
        machine.start_requested();
        let mut subscribes = 0;
        for _ in 0..3 {
            for event in [
                DomainEvent::Connected,
                DomainEvent::Connected,
                disconnected(DisconnectReason::Broker),
                reconnecting(1),
            ] {
                if machine.apply(&event).subscribe {
                    subscribes += 1;
                }
            }
        }
        assert_eq!(subscribes, 3);
    }

    #[test]
    fn stop_from_connected_resets_device() {
        let mut machine = ConnectionMachine::new();
        machine.start_requested();
        machine.apply(&DomainEvent::Connected);
        let stopped = machine.stop_requested();
        assert!(stopped.reset_device);
        assert_eq!(machine.state(), &ConnectionState::Disconnected);

        assert_eq!(machine.stop_requested(), Transition::default());
    }

    #[test]
    fn messages_do_not_change_state() {
        let mut machine = ConnectionMachine::new();
        let t = machine.apply(&DomainEvent::MessageReceived {
            topic: "epicure/status".into(),
            payload: "STM:ONLINE".into(),
        });
        assert_eq!(t, Transition::default());
        assert_eq!(machine.state(), &ConnectionState::Disconnected);
    }
}
