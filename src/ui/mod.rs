//! Terminal rendering.

pub mod client;
pub mod common;
pub mod programs;
pub mod theme;

pub use theme::Theme;

use ratatui::{
    layout::{Constraint, Layout},
    Frame,
};

use crate::app::App;
use crate::source::Role;

/// Draw one full frame: header, the role's view, status bar, overlays.
pub fn draw(frame: &mut Frame, app: &App) {
    let area = frame.area();
    let chunks = Layout::vertical([
        Constraint::Length(1), // Header bar
        Constraint::Min(6),    // Content
        Constraint::Length(1), // Status bar
    ])
    .split(area);

    common::render_header(frame, app, chunks[0]);

    match app.role() {
        Role::Server => programs::render(frame, app, chunks[1]),
        Role::Client => client::render(frame, app, chunks[1]),
    }

    common::render_status_bar(frame, app, chunks[2]);

    if app.show_help {
        common::render_help(frame, app, area);
    }
}
