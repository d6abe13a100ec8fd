//! # UI Common Components and Utilities
//!
//! Shared styling for the control station window: the dark colour palette,
//! the mapping from station status tones and log kinds to colours, and the
//! standard panel frame.

use eframe::egui::{Color32, Frame, Stroke};

use crate::station::log::LogKind;
use crate::station::StatusTone;

/// Centralized color palette for the dark theme.
///
/// Colors are organized from darkest to lightest background, with semantic
/// colors for status indication:
/// - **Background Colors**: LOG_BG → INNER_BG → MAIN_BG
/// - **Status Colors**: ACTIVE (green), PENDING (amber), INACTIVE (red)
/// - **Structural Colors**: BORDER, PRIMARY for component separation and headings
pub struct UiColors;

impl UiColors {
    /// Primary background color for main content areas (RGB: 30, 30, 30)
    pub const MAIN_BG: Color32 = Color32::from_rgb(30, 30, 30);

    /// Background for grouped controls (RGB: 45, 45, 48)
    pub const INNER_BG: Color32 = Color32::from_rgb(45, 45, 48);

    /// Telemetry pane background (RGB: 18, 18, 18)
    pub const LOG_BG: Color32 = Color32::from_rgb(18, 18, 18);

    /// Border color for component separation (RGB: 60, 60, 60)
    pub const BORDER: Color32 = Color32::from_rgb(60, 60, 60);

    /// Section headings (RGB: 0, 122, 204)
    pub const PRIMARY: Color32 = Color32::from_rgb(0, 122, 204);

    pub const TEXT: Color32 = Color32::from_rgb(224, 224, 224);

    /// Connected / online (RGB: 76, 175, 80)
    pub const ACTIVE: Color32 = Color32::from_rgb(76, 175, 80);

    /// Connecting / reconnecting (RGB: 255, 193, 7)
    pub const PENDING: Color32 = Color32::from_rgb(255, 193, 7);

    /// Disconnected / offline / errors (RGB: 211, 47, 47)
    pub const INACTIVE: Color32 = Color32::from_rgb(211, 47, 47);

    /// Default telemetry text (RGB: 0, 255, 0)
    pub const LOG_TEXT: Color32 = Color32::from_rgb(0, 255, 0);

    pub fn tone(tone: StatusTone) -> Color32 {
        match tone {
            StatusTone::Good => Self::ACTIVE,
            StatusTone::Pending => Self::PENDING,
            StatusTone::Bad => Self::INACTIVE,
        }
    }

    pub fn log_kind(kind: LogKind) -> Color32 {
        match kind {
            LogKind::System | LogKind::Rx => Self::LOG_TEXT,
            LogKind::Tx => Self::TEXT,
            LogKind::ControllerLog => Self::PENDING,
            LogKind::Error => Self::INACTIVE,
        }
    }
}

/// Standard frame for a group of controls
pub fn panel_frame(bg_color: Color32, border_color: Color32) -> Frame {
    Frame::new()
        .stroke(Stroke::new(1.0, border_color))
        .fill(bg_color)
        .inner_margin(12)
        .outer_margin(4)
}
