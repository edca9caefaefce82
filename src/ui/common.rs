//! Common UI components shared across views.
//!
//! This module contains the header bar, status bar, and help overlay.

use heartwatch_sdk::StatusState;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::app::App;
use crate::source::Role;

/// Render the header bar.
///
/// Server: registered count by state. Client: the client's own state.
pub fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let Some(ref data) = app.data else {
        let line = Line::from(vec![
            Span::styled(" HEARTWATCH ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("| Loading..."),
        ]);
        frame.render_widget(Paragraph::new(line), area);
        return;
    };

    let line = match data.role {
        Role::Server => {
            let mut connected = 0;
            let mut lost = 0;
            for row in data.clients() {
                match row.state {
                    Some(StatusState::Connected) => connected += 1,
                    _ => lost += 1,
                }
            }

            Line::from(vec![
                Span::styled(" ● ", Style::default().fg(app.theme.connected)),
                Span::styled("HEARTWATCH SERVER ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw("│ "),
                Span::styled(
                    format!("{}", connected + lost),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::raw(" registered │ "),
                Span::styled(
                    format!("{}", connected),
                    Style::default().fg(app.theme.connected),
                ),
                Span::raw(" connected "),
                if lost > 0 {
                    Span::styled(format!("{}", lost), app.theme.status_style(StatusState::NotConnected))
                } else {
                    Span::styled("0", Style::default().add_modifier(Modifier::DIM))
                },
                Span::raw(" closing"),
            ])
        }
        Role::Client => {
            let state = data
                .rows
                .first()
                .and_then(|row| row.state)
                .unwrap_or_default();
            let style = app.theme.status_style(state);

            Line::from(vec![
                Span::styled(" ● ", style),
                Span::styled("HEARTWATCH CLIENT ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw("│ "),
                Span::styled(state.label(), style),
            ])
        }
    };

    frame.render_widget(Paragraph::new(line), area);
}

/// Render the status bar at the bottom.
///
/// Shows: source, time since last redraw, available controls.
/// Also displays temporary status messages.
pub fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    // Check for temporary status message first
    if let Some(msg) = app.get_status_message() {
        let paragraph =
            Paragraph::new(format!(" {} ", msg)).style(Style::default().fg(app.theme.highlight));
        frame.render_widget(paragraph, area);
        return;
    }

    let controls = match app.role() {
        Role::Server => "↑↓:select ?:help q:quit",
        Role::Client => "r:reconnect ?:help q:quit",
    };

    let status = match app.last_updated {
        Some(at) => format!(
            " {} | Updated {:.1}s ago | {}",
            app.source_description(),
            at.elapsed().as_secs_f64(),
            controls,
        ),
        None => " Loading... | q:quit".to_string(),
    };

    let paragraph = Paragraph::new(status).style(Style::default().add_modifier(Modifier::DIM));

    frame.render_widget(paragraph, area);
}

/// Render the help overlay with keyboard shortcuts.
///
/// Displayed as a centered modal on top of the current view.
pub fn render_help(frame: &mut Frame, app: &App, area: Rect) {
    let mut help_text = vec![
        Line::from(vec![Span::styled("Keyboard Shortcuts", app.theme.header)]),
        Line::from(""),
        Line::from(vec![Span::styled(
            " Navigation",
            Style::default().add_modifier(Modifier::BOLD),
        )]),
        Line::from("  ↑/↓ j/k     Navigate list"),
        Line::from("  PgUp/PgDn   Jump 10 items"),
        Line::from("  Home/End    Jump to first/last"),
        Line::from(""),
        Line::from(vec![Span::styled(
            " General",
            Style::default().add_modifier(Modifier::BOLD),
        )]),
    ];
    if app.role() == Role::Client {
        help_text.push(Line::from("  r           Reconnect now"));
    }
    help_text.extend([
        Line::from("  q/Esc       Quit"),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Press any key to close",
            Style::default().add_modifier(Modifier::DIM),
        )]),
    ]);

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(Style::default().fg(app.theme.highlight));

    let paragraph = Paragraph::new(help_text).block(block);

    // Center the help overlay - responsive to terminal size
    let help_width = 42u16.min(area.width.saturating_sub(4));
    let help_height = 16u16.min(area.height.saturating_sub(2));
    let x = area.x + (area.width.saturating_sub(help_width)) / 2;
    let y = area.y + (area.height.saturating_sub(help_height)) / 2;
    let help_area = Rect::new(x, y, help_width, help_height);

    // Clear the area behind the help
    frame.render_widget(ratatui::widgets::Clear, help_area);
    frame.render_widget(paragraph, help_area);
}
