//! # Station Core
//!
//! Everything the control station knows about the remote controller and the
//! operator, independent of how it is drawn on screen.
//!
//! ## Why This Module Exists
//!
//! egui rebuilds the window every frame from whatever state it is handed. This
//! module is that state plus the rules for changing it:
//! - What the broker link looks like right now (connection state machine)
//! - Whether the STM32 has announced itself (device state machine)
//! - What the operator may send and how it is written on the wire
//! - What an inbound message means and how it is logged
//! - The operator log shown in the telemetry pane
//!
//! ## Module Architecture
//!
//! ```text
//! station/
//! ├── command.rs     - Operator commands, validation and wire format
//! ├── classifier.rs  - Inbound topic/payload routing
//! ├── connection.rs  - Broker connection state machine
//! ├── device.rs      - Controller liveness state machine
//! ├── log.rs         - Operator log book and cross-thread log sink
//! └── console.rs     - Presentation-thread owner tying it all together
//! ```
//!
//! ## Design Rationale
//!
//! All state here is owned by the presentation thread. The only way in from
//! the network side is the event channel drained by [`console::Console::tick`]
//! and the [`log::LogSink`]. Nothing in this module locks or awaits.
//!
//! The state machines are plain enums with an `apply` step that returns the
//! side effects to perform (subscribe, reset device) instead of performing
//! them. [`console::Console`] carries the effects out against the
//! [`crate::bus::Bus`], so every transition can be tested without a broker.
//!
//! ### Connection States
//! - **Disconnected**: initial, after stop, and after losing an established link
//! - **Connecting**: first handshake after start
//! - **Connected**: ConnAck accepted; the only state in which commands publish
//! - **Failed { code, retry }**: the broker refused the handshake; stays visible while retrying
//! - **Reconnecting { attempt }**: waiting out the backoff after a lost link
//!
//! ### Log Kinds
//! Every log line carries a [`log::LogKind`] (`System`, `Tx`, `Rx`,
//! `ControllerLog`, `Error`) so the UI can colour it without parsing text.

pub mod classifier;
pub mod command;
pub mod connection;
pub mod console;
pub mod device;
pub mod log;

pub use command::{Command, Direction, ValidationError};
pub use connection::{ConnectionState, StatusTone};
pub use console::{Console, DispatchError};
pub use device::DeviceStatus;
