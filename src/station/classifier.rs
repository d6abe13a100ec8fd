//! Message Classifier
//!
//! Decides what an inbound `(topic, payload)` pair means to the station.
//! Nothing is dropped: unknown topics are passed through to the log.

use crate::config::TopicConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification<'a> {
    /// Controller status line; feeds the device state machine
    Status(&'a str),
    /// Log line forwarded by the controller
    ControllerLog(&'a str),
    Unclassified { topic: &'a str, payload: &'a str },
}

impl Classification<'_> {
    /// The single operator log line for this message
    pub fn log_line(&self) -> String {
        match self {
            Classification::Status(payload) => format!("STATUS: {}", payload),
            Classification::ControllerLog(payload) => format!("STM_LOG: {}", payload),
            Classification::Unclassified { topic, payload } => {
                format!("RX [{}]: {}", topic, payload)
            }
        }
    }
}

pub fn classify<'a>(topics: &TopicConfig, topic: &'a str, payload: &'a str) -> Classification<'a> {
    if topic == topics.status {
        Classification::Status(payload)
    } else if topic == topics.logs {
        Classification::ControllerLog(payload)
    } else {
        Classification::Unclassified { topic, payload }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_by_topic() {
        let topics = TopicConfig::default();

        assert_eq!(
            classify(&topics, "epicure/status", "STM:ONLINE"),
            Classification::Status("STM:ONLINE")
        );
        assert_eq!(
            classify(&topics, "epicure/logs", "motor stalled").log_line(),
            "STM_LOG: motor stalled"
        );

        let other = classify(&topics, "unknown_topic", "x");
        assert_eq!(
            other,
            Classification::Unclassified {
                topic: "unknown_topic",
                payload: "x"
            }
        );
        assert_eq!(other.log_line(), "RX [unknown_topic]: x");
    }

    #[test]
    fn command_topic_echo_is_unclassified() {
        let topics = TopicConfig::default();
        assert!(matches!(
            classify(&topics, "epicure/commands", "ping"),
            Classification::Unclassified { .. }
        ));
    }
}
