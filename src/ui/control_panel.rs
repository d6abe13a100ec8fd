use eframe::egui::{
    self, Button, Label, RichText, ScrollArea, TextEdit, TextWrapMode, Ui, Vec2,
};
use tracing::debug;

use super::common::{panel_frame, UiColors};
use crate::bus::Bus;
use crate::station::log::LogBook;
use crate::station::{Command, Console};

/// Form state of the command widgets
pub struct ControlPanelData {
    steps: String,
    direction: String,
    raw_command: String,
}

impl Default for ControlPanelData {
    fn default() -> Self {
        Self {
            steps: "100".to_string(),
            direction: "1".to_string(),
            raw_command: String::new(),
        }
    }
}

impl ControlPanelData {
    /// Header with the broker and device badges
    pub fn render_header<B: Bus>(&self, ui: &mut Ui, console: &Console<B>) {
        panel_frame(UiColors::INNER_BG, UiColors::BORDER).show(ui, |ui| {
            ui.horizontal(|ui| {
                let connection = console.connection();
                ui.label(
                    RichText::new(connection.status_text())
                        .color(UiColors::tone(connection.tone()))
                        .strong(),
                );
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let device = console.device();
                    ui.label(
                        RichText::new(device.status_text())
                            .color(UiColors::tone(device.tone()))
                            .strong(),
                    );
                });
            });
        });
    }

    pub fn render_controls<B: Bus>(&mut self, ui: &mut Ui, console: &mut Console<B>) {
        let width = ui.available_width() - 40.0;

        section(ui, " LED Control ", |ui| {
            ui.horizontal(|ui| {
                let size = Vec2::new(width / 2.0, 24.0);
                if ui.add(Button::new("ON").min_size(size)).clicked() {
                    let _ = console.send(Command::LedOn);
                }
                if ui.add(Button::new("OFF").min_size(size)).clicked() {
                    let _ = console.send(Command::LedOff);
                }
            });
        });

        section(ui, " Motor Control ", |ui| {
            ui.label("Target Steps:");
            ui.add(TextEdit::singleline(&mut self.steps).desired_width(width));
            ui.horizontal(|ui| {
                ui.radio_value(&mut self.direction, "1".to_string(), "Clockwise");
                ui.add_space(20.0);
                ui.radio_value(&mut self.direction, "0".to_string(), "Counter-CW");
            });
            if ui
                .add(Button::new("GO").min_size(Vec2::new(width, 24.0)))
                .clicked()
            {
                debug!("Motor GO with steps={:?} dir={}", self.steps, self.direction);
                let _ = console.send_motor(&self.steps, &self.direction);
            }
        });

        section(ui, " Raw Command ", |ui| {
            ui.horizontal(|ui| {
                let response = ui.add(
                    TextEdit::singleline(&mut self.raw_command)
                        .hint_text("led:on | led:off | ping | motor:<steps>:<1|0>")
                        .desired_width(width - 80.0),
                );
                let submitted =
                    response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if ui.button("Send").clicked() || submitted {
                    if console.send_command_text(&self.raw_command).is_ok() {
                        self.raw_command.clear();
                    }
                }
            });
        });
    }

    pub fn render_telemetry<B: Bus>(&mut self, ui: &mut Ui, console: &mut Console<B>) {
        let footer_height = 36.0;
        section(ui, " Telemetry ", |ui| {
            let height = (ui.available_height() - footer_height).max(80.0);
            panel_frame(UiColors::LOG_BG, UiColors::BORDER).show(ui, |ui| {
                ui.set_min_size(Vec2::new(ui.available_width(), height));
                log_rows(ui, console.log(), height);
            });
        });

        ui.horizontal(|ui| {
            if ui.button("Clear Logs").clicked() {
                console.clear_log();
            }
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("Ping STM").clicked() {
                    let _ = console.send(Command::Ping);
                }
            });
        });
    }
}

/// Lays out only the rows in view. Returns how many rows were built.
fn log_rows(ui: &mut Ui, log: &LogBook, height: f32) -> usize {
    let row_height = ui.text_style_height(&egui::TextStyle::Monospace);
    let entries = log.entries();
    // Rows must not wrap so every row has the same height
    ScrollArea::both()
        .max_height(height)
        .stick_to_bottom(true)
        .auto_shrink([false, false])
        .show_rows(ui, row_height, entries.len(), |ui, rows| {
            let visible = &entries[rows];
            for entry in visible {
                ui.add(
                    Label::new(
                        RichText::new(entry.to_string())
                            .monospace()
                            .color(UiColors::log_kind(entry.kind)),
                    )
                    .wrap_mode(TextWrapMode::Extend),
                );
            }
            visible.len()
        })
        .inner
}

fn section(ui: &mut Ui, title: &str, add_contents: impl FnOnce(&mut Ui)) {
    panel_frame(UiColors::INNER_BG, UiColors::BORDER).show(ui, |ui| {
        ui.label(RichText::new(title).color(UiColors::PRIMARY).strong());
        add_contents(ui);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::log::LogKind;
    use eframe::egui::{pos2, vec2, Context, RawInput, Rect};

    #[test]
    fn long_logs_only_build_visible_rows() {
        let mut log = LogBook::new();
        for n in 0..10_000 {
            log.append(LogKind::Rx, format!("RX [epicure/logs]: line {}", n));
        }

        let ctx = Context::default();
        let input = RawInput {
            screen_rect: Some(Rect::from_min_size(pos2(0.0, 0.0), vec2(400.0, 300.0))),
            ..RawInput::default()
        };
        let mut drawn = 0;
        let _ = ctx.run(input, |ctx| {
            egui::CentralPanel::default().show(ctx, |ui| {
                drawn = log_rows(ui, &log, 200.0);
            });
        });

        assert!(drawn > 0);
        assert!(drawn < 100, "built {} rows", drawn);
    }
}
