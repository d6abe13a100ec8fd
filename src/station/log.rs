//! Operator log: the telemetry pane's backing store.
//!
//! Entries are appended only on the presentation thread. Other threads go
//! through a [`LogSink`], whose lines are moved into the [`LogBook`] on the next
//! console tick.

use chrono::{DateTime, Local};
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    System,
    Tx,
    Rx,
    ControllerLog,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub kind: LogKind,
    pub text: String,
}

impl LogEntry {
    pub fn new(kind: LogKind, text: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            kind,
            text: text.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.text)
    }
}

/// Append-only sequence of entries in arrival order
#[derive(Debug, Default)]
pub struct LogBook {
    entries: Vec<LogEntry>,
}

impl LogBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, kind: LogKind, text: impl Into<String>) {
        let entry = LogEntry::new(kind, text);
        debug!("log: {}", entry.text);
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Operator requested wipe of the telemetry pane
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

pub fn log_channel() -> (LogSink, LogInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (LogSink { tx }, LogInbox { rx })
}

/// Thread-safe handle for appending operator log lines from anywhere
#[derive(Debug, Clone)]
pub struct LogSink {
    tx: mpsc::UnboundedSender<LogEntry>,
}

impl LogSink {
    pub fn append(&self, line: impl Into<String>) {
        self.append_kind(LogKind::System, line);
    }

    pub fn append_kind(&self, kind: LogKind, line: impl Into<String>) {
        if self.tx.send(LogEntry::new(kind, line)).is_err() {
            debug!("Log inbox closed, line dropped");
        }
    }
}

/// Receiving side of the [`LogSink`], owned by the console
#[derive(Debug)]
pub struct LogInbox {
    rx: mpsc::UnboundedReceiver<LogEntry>,
}

impl LogInbox {
    /// Moves all pending lines into `book`, returning how many were moved
    pub fn drain_into(&mut self, book: &mut LogBook) -> usize {
        let mut moved = 0;
        while let Ok(entry) = self.rx.try_recv() {
            book.entries.push(entry);
            moved += 1;
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn entries_keep_arrival_order() {
        let mut book = LogBook::new();
        book.append(LogKind::Tx, "TX: ping");
        book.append(LogKind::Error, "Error: publish failed");

        let texts: Vec<_> = book.entries().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["TX: ping", "Error: publish failed"]);

        book.clear();
        assert!(book.is_empty());
    }

    #[test]
    fn sink_lines_from_other_threads_arrive() {
        let (sink, mut inbox) = log_channel();
        let mut book = LogBook::new();

        let worker = {
            let sink = sink.clone();
            thread::spawn(move || {
                sink.append("from worker");
                sink.append_kind(LogKind::Error, "worker failed");
            })
        };
        worker.join().unwrap();

        assert_eq!(inbox.drain_into(&mut book), 2);
        assert_eq!(book.entries()[0].text, "from worker");
        assert_eq!(book.entries()[1].kind, LogKind::Error);
        assert_eq!(inbox.drain_into(&mut book), 0);
    }

    #[test]
    fn display_has_clock_prefix() {
        let entry = LogEntry::new(LogKind::System, "hello");
        let rendered = entry.to_string();
        assert!(rendered.starts_with('['));
        assert!(rendered.ends_with("] hello"));
    }
}
