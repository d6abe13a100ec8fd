//! Transport Handle - broker connection and event loop worker
//!
//! The handle lives on the presentation thread. On `start` it builds a rumqttc
//! client and spawns a [`BusWorker`] that polls the event loop on the tokio
//! runtime. The worker translates everything it sees into [`DomainEvent`]s.
//!
//! # Worker Lifecycle
//!
//! ```text
//! Configured ──► Polling ──► (cancelled | client dropped)
//!                  │  ▲
//!                  ▼  │
//!            backoff sleep after a poll error
//! ```
//!
//! rumqttc reconnects on the next `poll` after an error, so the worker owns the
//! pacing: it reports `Reconnecting` and waits an exponential backoff before
//! polling again.

use chrono::Local;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS,
};
use statum::{machine, state};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{DisconnectReason, DomainEvent, EventSender};
use super::Bus;
use crate::config::{BrokerConfig, ReconnectConfig};
use crate::station::command::Command;

/// How long a stopping worker keeps polling to get the DISCONNECT packet out
const DISCONNECT_FLUSH: Duration = Duration::from_millis(200);

/// Setup faults detected before any network activity
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StartError {
    #[error("Invalid broker address '{0}'")]
    InvalidAddress(String),

    #[error("Invalid broker port {0}")]
    InvalidPort(u16),

    #[error("Invalid client id prefix '{0}'")]
    InvalidClientId(String),

    #[error("Transport already started")]
    AlreadyStarted,
}

/// Link state shared between the handle and the worker
#[derive(Debug, Default)]
pub struct LinkState {
    connected: AtomicBool,
    /// Incremented on every accepted ConnAck
    session: AtomicU64,
}

impl LinkState {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn set_connected(&self, connected: bool) -> bool {
        self.connected.swap(connected, Ordering::AcqRel)
    }

    fn session(&self) -> u64 {
        self.session.load(Ordering::Acquire)
    }
}

/// Exponential reconnect delay, doubled per attempt and capped
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_backoff_ms),
            max: Duration::from_millis(config.max_backoff_ms),
            attempt: 0,
        }
    }

    /// Returns the next attempt number and how long to wait before it
    pub fn next_delay(&mut self) -> (u32, Duration) {
        let factor = 1u32.checked_shl(self.attempt.min(31)).unwrap_or(u32::MAX);
        let delay = self.initial.saturating_mul(factor).min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        (self.attempt, delay)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum WorkerState {
    Configured,
    Polling,
}

#[machine]
pub struct BusWorker<S: WorkerState> {
    eventloop: EventLoop,
    events: EventSender,
    link: Arc<LinkState>,
    backoff: Backoff,
    cancel: CancellationToken,
}

impl BusWorker<Configured> {
    fn configure(
        eventloop: EventLoop,
        events: EventSender,
        link: Arc<LinkState>,
        backoff: Backoff,
        cancel: CancellationToken,
    ) -> Self {
        Self::new(eventloop, events, link, backoff, cancel)
    }

    fn begin(self) -> BusWorker<Polling> {
        info!("Bus worker entering polling loop");
        self.transition()
    }
}

impl BusWorker<Polling> {
    async fn run(mut self) {
        loop {
            let polled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                polled = self.eventloop.poll() => Some(polled),
            };
            let Some(polled) = polled else {
                self.flush_disconnect().await;
                break;
            };

            match polled {
                Ok(Event::Incoming(packet)) => self.handle_packet(packet),
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    debug!("Disconnect request sent to broker");
                }
                Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    if !self.handle_error(e).await {
                        break;
                    }
                }
            }
        }

        self.link.set_connected(false);
        info!("Bus worker stopped");
    }

    fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::ConnAck(ack) => {
                if ack.code == ConnectReturnCode::Success {
                    self.backoff.reset();
                    self.link.session.fetch_add(1, Ordering::AcqRel);
                    self.link.set_connected(true);
                    info!("Broker accepted connection");
                    self.events.push(DomainEvent::Connected);
                } else {
                    let code = return_code(&ack.code);
                    warn!("Broker refused connection with rc={}", code);
                    self.events
                        .push(DomainEvent::Disconnected(DisconnectReason::Refused(code)));
                }
            }
            Packet::Publish(publish) => {
                let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                debug!("Inbound message on {}: {}", publish.topic, payload);
                self.events.push(DomainEvent::MessageReceived {
                    topic: publish.topic,
                    payload,
                });
            }
            Packet::Disconnect => {
                self.link.set_connected(false);
                warn!("Broker closed the connection");
                self.events
                    .push(DomainEvent::Disconnected(DisconnectReason::Broker));
            }
            Packet::SubAck(ack) => debug!("Subscription confirmed: {:?}", ack.return_codes),
            other => debug!("Ignoring packet {:?}", other),
        }
    }

    /// Reports the failure and waits out the backoff.
    ///
    /// Returns `false` when the worker should stop.
    async fn handle_error(&mut self, err: ConnectionError) -> bool {
        let reason = match &err {
            ConnectionError::ConnectionRefused(code) => {
                DisconnectReason::Refused(return_code(code))
            }
            ConnectionError::RequestsDone => {
                info!("All client handles dropped, stopping bus worker");
                return false;
            }
            other => DisconnectReason::Transport(other.to_string()),
        };

        let was_connected = self.link.set_connected(false);
        if was_connected {
            warn!("Broker link lost: {}", err);
        } else {
            debug!("Connect attempt failed: {}", err);
        }
        self.events.push(DomainEvent::Disconnected(reason));

        let (attempt, delay) = self.backoff.next_delay();
        self.events
            .push(DomainEvent::Reconnecting { attempt, delay });
        debug!("Reconnect attempt {} in {:?}", attempt, delay);

        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn flush_disconnect(&mut self) {
        if !self.link.is_connected() {
            return;
        }
        let eventloop = &mut self.eventloop;
        let flush = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
        };
        if tokio::time::timeout(DISCONNECT_FLUSH, flush).await.is_err() {
            debug!("Disconnect not flushed within {:?}", DISCONNECT_FLUSH);
        }
    }
}

fn return_code(code: &ConnectReturnCode) -> u8 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    }
}

/// Accepts IP literals and host names. Underscores are allowed since
/// container runtimes hand them out (`my_broker`).
fn validate_host(host: &str) -> Result<(), StartError> {
    let invalid = || StartError::InvalidAddress(host.to_string());

    if host.parse::<IpAddr>().is_ok() {
        return Ok(());
    }
    if host.is_empty() || host.len() > 253 {
        return Err(invalid());
    }
    for label in host.split('.') {
        let valid = !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(invalid());
        }
    }
    Ok(())
}

/// Owns the broker connection on behalf of the presentation thread
pub struct TransportHandle {
    broker: BrokerConfig,
    command_topic: String,
    reconnect: ReconnectConfig,
    shutdown_grace: Duration,
    events: EventSender,
    runtime: Handle,
    link: Arc<LinkState>,
    client: Option<AsyncClient>,
    cancel: Option<CancellationToken>,
    finished: Option<std_mpsc::Receiver<()>>,
    subscribed: HashSet<String>,
    subscribed_session: u64,
}

impl TransportHandle {
    pub fn new(
        broker: BrokerConfig,
        command_topic: String,
        reconnect: ReconnectConfig,
        shutdown_grace: Duration,
        events: EventSender,
        runtime: Handle,
    ) -> Self {
        Self {
            broker,
            command_topic,
            reconnect,
            shutdown_grace,
            events,
            runtime,
            link: Arc::new(LinkState::default()),
            client: None,
            cancel: None,
            finished: None,
            subscribed: HashSet::new(),
            subscribed_session: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    fn mqtt_options(&self) -> Result<MqttOptions, StartError> {
        validate_host(&self.broker.host)?;
        if self.broker.port == 0 {
            return Err(StartError::InvalidPort(self.broker.port));
        }
        let prefix = &self.broker.client_id_prefix;
        if prefix.is_empty() || prefix.starts_with(char::is_whitespace) {
            return Err(StartError::InvalidClientId(prefix.clone()));
        }

        let client_id = format!("{}_{}", prefix, Local::now().timestamp_millis());
        debug!("Using client id {}", client_id);

        let mut options = MqttOptions::new(client_id, self.broker.host.clone(), self.broker.port);
        options
            .set_keep_alive(Duration::from_secs(self.broker.keep_alive_secs))
            .set_clean_session(true);
        if let Some(user) = &self.broker.username {
            options.set_credentials(user.clone(), self.broker.password.clone().unwrap_or_default());
        }
        Ok(options)
    }
}

impl Bus for TransportHandle {
    fn start(&mut self) -> Result<(), StartError> {
        if self.client.is_some() {
            return Err(StartError::AlreadyStarted);
        }
        let options = self.mqtt_options()?;
        info!(
            "Connecting to broker {}:{}",
            self.broker.host, self.broker.port
        );

        let (client, eventloop) = AsyncClient::new(options, self.broker.channel_capacity);
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = std_mpsc::sync_channel(1);

        let worker = BusWorker::configure(
            eventloop,
            self.events.clone(),
            self.link.clone(),
            Backoff::new(&self.reconnect),
            cancel.clone(),
        );
        self.runtime.spawn(async move {
            worker.begin().run().await;
            let _ = done_tx.send(());
        });

        self.client = Some(client);
        self.cancel = Some(cancel);
        self.finished = Some(done_rx);
        Ok(())
    }

    fn publish(&mut self, command: &Command) -> bool {
        let Some(client) = &self.client else {
            debug!("Publish of '{}' before start", command);
            return false;
        };
        if !self.link.is_connected() {
            debug!("Publish of '{}' while broker link is down", command);
            return false;
        }
        match client.try_publish(
            self.command_topic.clone(),
            QoS::AtLeastOnce,
            false,
            command.to_string(),
        ) {
            Ok(()) => {
                debug!("Handed '{}' to client for {}", command, self.command_topic);
                true
            }
            Err(e) => {
                warn!("Client rejected publish of '{}': {}", command, e);
                false
            }
        }
    }

    fn subscribe(&mut self, topics: &[String]) {
        let Some(client) = &self.client else {
            warn!("Subscribe requested before start");
            return;
        };

        let session = self.link.session();
        if session != self.subscribed_session {
            self.subscribed.clear();
            self.subscribed_session = session;
        }

        for topic in topics {
            if self.subscribed.contains(topic) {
                debug!("Already subscribed to {} in this session", topic);
                continue;
            }
            match client.try_subscribe(topic.clone(), QoS::AtLeastOnce) {
                Ok(()) => {
                    info!("Subscribing to {}", topic);
                    self.subscribed.insert(topic.clone());
                }
                Err(e) => error!("Failed to subscribe to {}: {}", topic, e),
            }
        }
    }

    fn stop(&mut self) {
        let Some(cancel) = self.cancel.take() else {
            debug!("Stop requested but transport is not running");
            return;
        };

        if let Some(client) = self.client.take() {
            if self.link.is_connected() {
                if let Err(e) = client.try_disconnect() {
                    debug!("Disconnect request not queued: {}", e);
                }
            }
        }
        cancel.cancel();

        if let Some(finished) = self.finished.take() {
            match finished.recv_timeout(self.shutdown_grace) {
                Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                    debug!("Bus worker finished")
                }
                Err(std_mpsc::RecvTimeoutError::Timeout) => warn!(
                    "Bus worker did not stop within {:?}, abandoning it",
                    self.shutdown_grace
                ),
            }
        }

        self.link.set_connected(false);
        self.subscribed.clear();
        info!("Transport stopped");
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::events::event_channel;
    use crate::station::command::{Command, Direction};

    fn handle_for(host: &str, port: u16) -> (TransportHandle, crate::bus::EventReceiver) {
        let (tx, rx) = event_channel();
        let broker = BrokerConfig {
            host: host.to_string(),
            port,
            ..BrokerConfig::default()
        };
        let handle = TransportHandle::new(
            broker,
            "epicure/commands".to_string(),
            ReconnectConfig {
                initial_backoff_ms: 50,
                max_backoff_ms: 200,
            },
            Duration::from_millis(500),
            tx,
            Handle::current(),
        );
        (handle, rx)
    }

    #[test]
    fn host_validation() {
        assert!(validate_host("localhost").is_ok());
        assert!(validate_host("broker.example.com").is_ok());
        assert!(validate_host("192.168.1.20").is_ok());
        assert!(validate_host("my_broker").is_ok());
        assert!(validate_host("mqtt_1.compose_net").is_ok());
        assert!(validate_host("::1").is_ok());
        assert!(validate_host("").is_err());
        assert!(validate_host("xxx.xxx.xxx.xxx ").is_err());
        assert!(validate_host("mqtt://broker").is_err());
        assert!(validate_host("broker..lan").is_err());
        assert!(validate_host("-broker").is_err());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(&ReconnectConfig {
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
        });
        assert_eq!(backoff.next_delay(), (1, Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), (2, Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), (3, Duration::from_millis(350)));
        assert_eq!(backoff.next_delay(), (4, Duration::from_millis(350)));
        backoff.reset();
        assert_eq!(backoff.next_delay(), (1, Duration::from_millis(100)));
    }

    #[test]
    fn backoff_survives_many_attempts() {
        let mut backoff = Backoff::new(&ReconnectConfig::default());
        for _ in 0..100 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay().1, Duration::from_millis(30_000));
    }

    #[tokio::test]
    async fn malformed_address_fails_synchronously() {
        let (mut handle, _rx) = handle_for("not a host", 1883);
        assert_eq!(
            handle.start(),
            Err(StartError::InvalidAddress("not a host".to_string()))
        );

        let (mut handle, _rx) = handle_for("localhost", 0);
        assert_eq!(handle.start(), Err(StartError::InvalidPort(0)));
    }

    #[tokio::test]
    async fn publish_before_start_is_rejected() {
        let (mut handle, _rx) = handle_for("localhost", 1883);
        assert!(!handle.publish(&Command::Ping));
        assert!(!handle.publish(&Command::MotorMove {
            steps: 10,
            direction: Direction::Clockwise,
        }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn container_host_name_starts() {
        let (mut handle, _rx) = handle_for("my_broker", 1883);
        assert_eq!(handle.start(), Ok(()));
        handle.stop();
    }

    #[tokio::test]
    async fn stop_without_start_is_idempotent() {
        let (mut handle, _rx) = handle_for("localhost", 1883);
        handle.stop();
        handle.stop();
        assert!(!handle.is_connected());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unreachable_broker_reports_disconnect_and_stops_cleanly() {
        // Port 1 on loopback refuses connections immediately
        let (mut handle, mut rx) = handle_for("127.0.0.1", 1);
        handle.start().unwrap();
        assert_eq!(handle.start(), Err(StartError::AlreadyStarted));
        assert!(!handle.publish(&Command::LedOn));

        let mut events = Vec::new();
        for _ in 0..50 {
            events.extend(rx.drain_all());
            if events
                .iter()
                .any(|e| matches!(e, DomainEvent::Reconnecting { .. }))
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert!(matches!(events.first(), Some(DomainEvent::Disconnected(_))));
        assert!(events
            .iter()
            .any(|e| matches!(e, DomainEvent::Reconnecting { attempt: 1, .. })));

        handle.stop();
        handle.stop();
        assert!(!handle.is_connected());
    }
}
