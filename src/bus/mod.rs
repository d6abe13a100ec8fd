//! # Message Bus Module
//!
//! Connects the control station to the MQTT broker that relays traffic to and
//! from the embedded controller. Everything that runs on the network side of
//! the application lives here.
//!
//! ## Why This Module Exists
//!
//! The STM32 controller is only reachable through an ESP gateway that speaks
//! MQTT. The station needs a connection that:
//! - Publishes operator commands on the command topic without blocking the UI
//! - Subscribes to the status and log topics once per broker session
//! - Keeps retrying when the broker is down or refuses the handshake
//! - Reports all of that as plain values the UI thread can consume
//!
//! ## Module Architecture
//!
//! ```text
//! bus/
//! ├── events.rs     - Domain events and the channel that carries them to the UI thread
//! └── transport.rs  - Broker connection, event loop worker and publish/subscribe
//! ```
//!
//! ## Threading Model
//!
//! The rumqttc event loop is polled inside a tokio task. That task never touches
//! presentation state: every connect, disconnect and inbound publish is turned
//! into a [`events::DomainEvent`] and pushed into the event channel. The UI
//! thread drains the channel once per frame.
//!
//! ```text
//! Broker ──► EventLoop worker ──[DomainEvent]──► EventReceiver::drain_all (UI thread)
//!   ▲                                                        │
//!   └────────── AsyncClient::try_publish ◄── TransportHandle ◄┘
//! ```
//!
//! ## Design Rationale
//!
//! rumqttc splits a connection into an `AsyncClient` (cheap, cloneable,
//! request side) and an `EventLoop` (must be polled to make progress). The
//! handle keeps the client; the event loop moves into a `BusWorker` task with
//! a statum lifecycle (`Configured` → `Polling`), mirroring how the rest of
//! the codebase models long-running workers.
//!
//! The worker paces reconnects itself. After a poll error it emits
//! `Disconnected` followed by `Reconnecting { attempt, delay }` and sleeps an
//! exponential backoff before polling again. A successful ConnAck resets the
//! backoff and bumps a session counter that scopes subscription bookkeeping.
//!
//! The [`Bus`] trait is the seam the console depends on. It carries exactly the
//! four operations the station uses, which lets the console be exercised with
//! an in-memory bus in tests.
//!
//! ## Failure Model
//!
//! Transport faults never cross the module boundary as errors. They surface as
//! `Disconnected` events or as a `false` return from `publish`. Only setup
//! faults detectable before any network activity (a malformed broker address)
//! are returned from [`transport::TransportHandle::start`].

pub mod events;
pub mod transport;

use crate::station::command::Command;

pub use events::{event_channel, DisconnectReason, DomainEvent, EventReceiver, EventSender};
pub use transport::{StartError, TransportHandle};

/// The operations the station needs from a bus connection.
///
/// Implemented by [`TransportHandle`] for the real broker; the console only
/// depends on this trait so it can be driven without a network.
pub trait Bus {
    /// Begins connecting in the background. Never blocks.
    fn start(&mut self) -> Result<(), StartError>;

    /// Hands a command to the client for at-least-once delivery.
    ///
    /// Returns `true` only if the link is established and the client accepted
    /// the request.
    fn publish(&mut self, command: &Command) -> bool;

    /// Subscribes to `topics` for the current broker session.
    fn subscribe(&mut self, topics: &[String]);

    /// Stops the network task and disconnects. Safe to call repeatedly.
    fn stop(&mut self);
}
