pub mod bus;
pub mod config;
pub mod station;
pub mod ui;

use crate::bus::{event_channel, TransportHandle};
use crate::config::StationConfig;
use crate::station::Console;
use crate::ui::StationUI;
use color_eyre::{eyre::eyre, Result};
use eframe::egui;
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(StationConfig::default_path);
    let config = StationConfig::load_or_create(&config_path).await?;

    setup_logging_env(&config.station.log_level);
    info!("Using config {}", config_path.display());

    let (event_tx, event_rx) = event_channel();
    let transport = TransportHandle::new(
        config.broker.clone(),
        config.topics.commands.clone(),
        config.reconnect.clone(),
        Duration::from_millis(config.station.shutdown_grace_ms),
        event_tx,
        Handle::current(),
    );

    let mut console = Console::new(transport, event_rx, config.topics.clone(), &config.station);
    let broker = format!("{}:{}", config.broker.host, config.broker.port);
    if let Err(e) = console.start(&broker) {
        warn!("Broker connection not started: {}", e);
    }

    info!("Starting UI");
    let tick_interval = Duration::from_millis(config.station.tick_interval_ms);
    let mut native_options = eframe::NativeOptions::default();
    native_options.viewport = egui::ViewportBuilder::default()
        .with_title("Epicure Control Station")
        .with_inner_size([520.0, 700.0]);

    eframe::run_native(
        "Control Station",
        native_options,
        Box::new(move |cc| Ok(Box::new(StationUI::new(cc, console, tick_interval)))),
    )
    .map_err(|e| eyre!("UI terminated with error: {}", e))?;

    Ok(())
}

/// RUST_LOG wins over the configured level when it names a plain level
fn setup_logging_env(configured: &str) {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| value.parse::<Level>().ok())
        .or_else(|| configured.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
