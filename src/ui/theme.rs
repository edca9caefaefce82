//! Theme configuration for the TUI.
//!
//! Supports light and dark themes with automatic terminal detection.

use heartwatch_sdk::StatusState;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::block::BorderType;

/// Color and style theme for the TUI.
///
/// Use [`Theme::auto_detect()`] for automatic theme selection based on
/// terminal background, or [`Theme::dark()`]/[`Theme::light()`] explicitly.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Accent color for highlights and active elements.
    pub highlight: Color,
    /// Color for a connection that has dropped.
    pub lost: Color,
    /// Color for a client that never connected.
    pub idle: Color,
    /// Color for a live connection.
    pub connected: Color,
    /// Color for borders and separators.
    pub border: Color,
    /// Style for header rows in tables.
    pub header: Style,
    /// Style for selected/highlighted rows.
    pub selected: Style,
    /// Style for the server's own row.
    pub own_row: Style,
    /// Border style (rounded, plain, etc.).
    pub border_type: BorderType,
}

impl Theme {
    /// Create a dark theme suitable for dark terminal backgrounds.
    pub fn dark() -> Self {
        Self {
            highlight: Color::Cyan,
            lost: Color::Red,
            idle: Color::Yellow,
            connected: Color::Green,
            border: Color::Gray,
            header: Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            selected: Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD),
            own_row: Style::default().add_modifier(Modifier::ITALIC),
            border_type: BorderType::Rounded,
        }
    }

    /// Create a light theme suitable for light terminal backgrounds.
    pub fn light() -> Self {
        Self {
            highlight: Color::Blue,
            lost: Color::Red,
            idle: Color::Magenta,
            connected: Color::Green,
            border: Color::DarkGray,
            header: Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
            selected: Style::default().bg(Color::LightBlue).add_modifier(Modifier::BOLD),
            own_row: Style::default().add_modifier(Modifier::ITALIC),
            border_type: BorderType::Rounded,
        }
    }

    /// Auto-detect based on terminal background
    pub fn auto_detect() -> Self {
        // Use terminal-light crate to detect background luminance
        match terminal_light::luma() {
            Ok(luma) if luma > 0.5 => Self::light(),
            _ => Self::dark(),
        }
    }

    /// Get style for a connection state
    pub fn status_style(&self, state: StatusState) -> Style {
        match state {
            StatusState::Connected => Style::default().fg(self.connected),
            StatusState::NeverConnected => Style::default().fg(self.idle),
            StatusState::NotConnected => Style::default().fg(self.lost).add_modifier(Modifier::BOLD),
        }
    }
}
