//! Device Status State Machine
//!
//! Tracks whether the remote controller reports itself online. Independent of
//! the broker link except for the forced reset when the link drops.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::connection::StatusTone;

pub const ONLINE_MARKER: &str = "STM:ONLINE";
pub const OFFLINE_MARKER: &str = "STM:OFFLINE";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceStatus {
    #[default]
    Unknown,
    Online,
    Offline,
}

/// How a status payload is searched for the liveness markers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusMatch {
    /// A whitespace, comma or semicolon separated token equals the marker
    #[default]
    Token,
    /// The trimmed payload equals the marker
    Exact,
    /// The marker appears anywhere in the payload
    Substring,
}

impl StatusMatch {
    /// Finds the first liveness marker in `payload`
    fn find(self, payload: &str) -> Option<DeviceStatus> {
        let classify = |candidate: &str| match candidate {
            ONLINE_MARKER => Some(DeviceStatus::Online),
            OFFLINE_MARKER => Some(DeviceStatus::Offline),
            _ => None,
        };

        match self {
            StatusMatch::Token => payload
                .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
                .find_map(classify),
            StatusMatch::Exact => classify(payload.trim()),
            StatusMatch::Substring => {
                let online = payload.find(ONLINE_MARKER);
                let offline = payload.find(OFFLINE_MARKER);
                match (online, offline) {
                    (Some(on), Some(off)) if off < on => Some(DeviceStatus::Offline),
                    (Some(_), _) => Some(DeviceStatus::Online),
                    (None, Some(_)) => Some(DeviceStatus::Offline),
                    (None, None) => None,
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceMachine {
    status: DeviceStatus,
    matching: StatusMatch,
    label: String,
}

impl DeviceMachine {
    pub fn new(label: impl Into<String>, matching: StatusMatch) -> Self {
        Self {
            status: DeviceStatus::Unknown,
            matching,
            label: label.into(),
        }
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    /// Feeds a status payload. Returns the new status if it changed.
    pub fn on_status_message(&mut self, payload: &str) -> Option<DeviceStatus> {
        let next = self.matching.find(payload)?;
        if next == self.status {
            return None;
        }
        info!("{} status {:?} -> {:?}", self.label, self.status, next);
        self.status = next;
        Some(next)
    }

    /// Forgets any known liveness after the broker link went away
    pub fn reset(&mut self) {
        if self.status != DeviceStatus::Unknown {
            info!("{} status reset to Unknown", self.label);
        }
        self.status = DeviceStatus::Unknown;
    }

    pub fn status_text(&self) -> String {
        let state = match self.status {
            DeviceStatus::Unknown => "UNKNOWN",
            DeviceStatus::Online => "ONLINE",
            DeviceStatus::Offline => "OFFLINE",
        };
        format!("{}: {}", self.label, state)
    }

    pub fn tone(&self) -> StatusTone {
        match self.status {
            DeviceStatus::Online => StatusTone::Good,
            DeviceStatus::Unknown | DeviceStatus::Offline => StatusTone::Bad,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(matching: StatusMatch) -> DeviceMachine {
        DeviceMachine::new("STM32", matching)
    }

    #[test]
    fn markers_drive_transitions() {
        let mut device = machine(StatusMatch::Token);
        assert_eq!(device.status(), DeviceStatus::Unknown);

        assert_eq!(
            device.on_status_message("STM:ONLINE"),
            Some(DeviceStatus::Online)
        );
        assert_eq!(device.on_status_message("STM:ONLINE"), None);
        assert_eq!(
            device.on_status_message("STM:OFFLINE extra text"),
            Some(DeviceStatus::Offline)
        );
        assert_eq!(device.status(), DeviceStatus::Offline);
    }

    #[test]
    fn other_payloads_leave_status_alone() {
        let mut device = machine(StatusMatch::Token);
        device.on_status_message("STM:ONLINE");
        assert_eq!(device.on_status_message("LED:OK"), None);
        assert_eq!(device.on_status_message("MOTOR:OK"), None);
        assert_eq!(device.status(), DeviceStatus::Online);
    }

    #[test]
    fn token_match_ignores_quoted_markers() {
        let mut device = machine(StatusMatch::Token);
        assert_eq!(device.on_status_message("echo \"STM:ONLINE\""), None);
        assert_eq!(device.on_status_message("STM:ONLINEX"), None);
        assert_eq!(
            device.on_status_message("bridge,STM:ONLINE;uptime=3"),
            Some(DeviceStatus::Online)
        );
    }

    #[test]
    fn exact_match_requires_whole_payload() {
        let mut device = machine(StatusMatch::Exact);
        assert_eq!(device.on_status_message("STM:OFFLINE extra text"), None);
        assert_eq!(
            device.on_status_message(" STM:OFFLINE\n"),
            Some(DeviceStatus::Offline)
        );
    }

    #[test]
    fn substring_match_takes_first_marker() {
        let mut device = machine(StatusMatch::Substring);
        assert_eq!(
            device.on_status_message("xxSTM:OFFLINExx then STM:ONLINE"),
            Some(DeviceStatus::Offline)
        );
        assert_eq!(
            device.on_status_message("log: \"STM:ONLINE\""),
            Some(DeviceStatus::Online)
        );
    }

    #[test]
    fn reset_returns_to_unknown() {
        let mut device = machine(StatusMatch::Token);
        device.on_status_message("STM:ONLINE");
        device.reset();
        assert_eq!(device.status(), DeviceStatus::Unknown);
        assert_eq!(device.status_text(), "STM32: UNKNOWN");
        assert_eq!(device.tone(), StatusTone::Bad);
    }
}
