//! Console - presentation-thread owner of all station state
//!
//! The console is created on the UI thread and never leaves it. It owns the
//! receiving ends of the event and log channels, both state machines and the
//! log book. The UI calls [`Console::tick`] once per frame; that is the only
//! place network events are applied.
//!
//! # Frame Cycle
//!
//! ```text
//! tick():  EventReceiver::drain_all ─► ConnectionMachine::apply ─► effects
//!                                   └► classify ─► DeviceMachine + LogBook
//!          LogInbox::drain_into ─► LogBook
//! ```
//!
//! Commands go the other way: validate, log `TX: ...`, publish, log the
//! failure if the client did not accept it.

use tracing::{debug, error, info, warn};

use super::classifier::{classify, Classification};
use super::command::{Command, ValidationError};
use super::connection::{ConnectionMachine, ConnectionState};
use super::device::DeviceMachine;
use super::log::{log_channel, LogBook, LogInbox, LogKind, LogSink};
use crate::bus::{Bus, DisconnectReason, DomainEvent, EventReceiver, StartError};
use crate::config::{ConsoleConfig, TopicConfig};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Validation failed: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Command was not handed to the broker")]
    NotDelivered,
}

pub struct Console<B: Bus> {
    bus: B,
    events: EventReceiver,
    inbox: LogInbox,
    sink: LogSink,
    topics: TopicConfig,
    connection: ConnectionMachine,
    device: DeviceMachine,
    log: LogBook,
}

impl<B: Bus> Console<B> {
    pub fn new(bus: B, events: EventReceiver, topics: TopicConfig, config: &ConsoleConfig) -> Self {
        let (sink, inbox) = log_channel();
        Self {
            bus,
            events,
            inbox,
            sink,
            topics,
            connection: ConnectionMachine::new(),
            device: DeviceMachine::new(config.device_label.clone(), config.status_match),
            log: LogBook::new(),
        }
    }

    /// Kicks off the broker connection. `broker` is only used for the log line.
    pub fn start(&mut self, broker: &str) -> Result<(), StartError> {
        self.log.append(
            LogKind::System,
            format!("System Initialized. Connecting to Broker {}...", broker),
        );
        self.connection.start_requested();

        if let Err(e) = self.bus.start() {
            error!("Bus start failed: {}", e);
            self.log
                .append(LogKind::Error, format!("Bus Start Error: {}", e));
            self.connection.stop_requested();
            return Err(e);
        }
        Ok(())
    }

    /// Applies everything queued since the last tick. Returns the number of
    /// domain events processed.
    pub fn tick(&mut self) -> usize {
        let events = self.events.drain_all();
        let count = events.len();
        for event in events {
            self.handle_event(event);
        }
        self.inbox.drain_into(&mut self.log);
        count
    }

    fn handle_event(&mut self, event: DomainEvent) {
        let previous = self.connection.state().clone();
        let transition = self.connection.apply(&event);
        if transition.reset_device {
            self.device.reset();
        }

        match event {
            DomainEvent::Connected => {
                if transition.subscribe {
                    self.log.append(
                        LogKind::System,
                        "MQTT Connected. Subscribing to topics...",
                    );
                    let inbound = self.topics.inbound();
                    self.bus.subscribe(&inbound);
                }
            }
            DomainEvent::Disconnected(reason) => {
                let line = match (&previous, self.connection.state()) {
                    (_, ConnectionState::Failed { .. }) => {
                        format!("MQTT Connection failed with rc={}", reason.code())
                    }
                    (ConnectionState::Connecting | ConnectionState::Reconnecting { .. }, _) => {
                        format!("MQTT Connect attempt failed ({})", reason)
                    }
                    _ => format!("MQTT Disconnected ({})", reason),
                };
                self.log.append(LogKind::Error, line);
            }
            DomainEvent::Reconnecting { attempt, delay } => {
                self.log.append(
                    LogKind::System,
                    format!(
                        "Retrying broker connection in {} ms (attempt {})",
                        delay.as_millis(),
                        attempt
                    ),
                );
            }
            DomainEvent::MessageReceived { topic, payload } => {
                self.handle_message(&topic, &payload);
            }
        }
    }

    fn handle_message(&mut self, topic: &str, payload: &str) {
        let classification = classify(&self.topics, topic, payload);
        let kind = match classification {
            Classification::Status(status) => {
                if let Some(next) = self.device.on_status_message(status) {
                    debug!("Device status now {:?}", next);
                }
                LogKind::Rx
            }
            Classification::ControllerLog(_) => LogKind::ControllerLog,
            Classification::Unclassified { topic, .. } => {
                debug!("Unclassified message on {}", topic);
                LogKind::Rx
            }
        };
        self.log.append(kind, classification.log_line());
    }

    /// Logs the attempt, publishes, and logs the failure if the command was
    /// not handed off.
    pub fn send(&mut self, command: Command) -> Result<(), DispatchError> {
        self.log.append(LogKind::Tx, format!("TX: {}", command));

        let accepted = self.connection.is_connected() && self.bus.publish(&command);
        if accepted {
            info!("Sent command {}", command);
            Ok(())
        } else {
            warn!("Command {} not sent, broker link not established", command);
            self.log.append(
                LogKind::Error,
                "Error: MQTT Not Connected (publish failed)",
            );
            Err(DispatchError::NotDelivered)
        }
    }

    /// Motor move from raw form fields
    pub fn send_motor(&mut self, steps: &str, direction: &str) -> Result<(), DispatchError> {
        let command = self.validated(Command::motor(steps, direction))?;
        self.send(command)
    }

    /// Entry point for free-text commands in wire format (`led:on`, `motor:100:1`, ...)
    pub fn send_command_text(&mut self, text: &str) -> Result<(), DispatchError> {
        let command = self.validated(text.parse())?;
        self.send(command)
    }

    fn validated(
        &mut self,
        parsed: Result<Command, ValidationError>,
    ) -> Result<Command, DispatchError> {
        parsed.map_err(|e| {
            warn!("Rejected operator input: {}", e);
            self.log.append(LogKind::Error, format!("Error: {}", e));
            DispatchError::Invalid(e)
        })
    }

    /// Appends a line from the presentation thread
    pub fn append_log(&mut self, line: impl Into<String>) {
        self.log.append(LogKind::System, line);
    }

    /// A sink other threads can use to append log lines
    pub fn log_sink(&self) -> LogSink {
        self.sink.clone()
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Stops the transport and marks the link down. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        self.bus.stop();
        let transition = self.connection.stop_requested();
        if transition.reset_device {
            self.device.reset();
        }
        if transition.changed {
            self.log.append(
                LogKind::System,
                format!("MQTT Disconnected ({})", DisconnectReason::Requested),
            );
        }
    }

    pub fn connection(&self) -> &ConnectionMachine {
        &self.connection
    }

    pub fn device(&self) -> &DeviceMachine {
        &self.device
    }

    pub fn log(&self) -> &LogBook {
        &self.log
    }
}
