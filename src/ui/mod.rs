//! # Control Station User Interface
//!
//! eframe/egui window for the operator. egui is immediate mode: every frame
//! the UI first drains pending network events through [`Console::tick`], then
//! rebuilds the widgets from the console's current state.
//!
//! ## Layout
//! - **Header**: broker connection badge (left) and device liveness badge (right)
//! - **Controls**: LED on/off, motor steps and direction, raw command line
//! - **Telemetry**: the operator log, newest at the bottom
//! - **Footer**: clear log, ping
//!
//! ## Threading
//! The UI runs on the main thread and owns the [`Console`]. It never waits on
//! the network: repaint is requested every tick interval so queued events are
//! picked up even without user input.

pub mod common;
pub mod control_panel;

use eframe::egui;
use std::time::Duration;
use tracing::info;

use crate::bus::Bus;
use crate::station::Console;

use self::common::UiColors;
use self::control_panel::ControlPanelData;

pub struct StationUI<B: Bus> {
    console: Console<B>,
    panel: ControlPanelData,
    tick_interval: Duration,
}

impl<B: Bus> StationUI<B> {
    pub fn new(cc: &eframe::CreationContext<'_>, console: Console<B>, tick_interval: Duration) -> Self {
        cc.egui_ctx.set_theme(egui::Theme::Dark);
        StationUI {
            console,
            panel: ControlPanelData::default(),
            tick_interval,
        }
    }
}

impl<B: Bus> eframe::App for StationUI<B> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.console.tick();
        ctx.request_repaint_after(self.tick_interval);

        egui::TopBottomPanel::top("status_header")
            .show_separator_line(false)
            .show(ctx, |ui| {
                self.panel.render_header(ui, &self.console);
            });

        egui::CentralPanel::default()
            .frame(egui::Frame::new().fill(UiColors::MAIN_BG).inner_margin(10))
            .show(ctx, |ui| {
                self.panel.render_controls(ui, &mut self.console);
                self.panel.render_telemetry(ui, &mut self.console);
            });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("Window closing, shutting down transport");
        self.console.shutdown();
    }
}
