//! Client view rendering.

use chrono::Utc;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::app::App;
use crate::format::{format_span, format_time};

/// Render the client's own status as labelled lines.
pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let Some(row) = app.data.as_ref().and_then(|data| data.rows.first()) else {
        return;
    };
    let state = row.state.unwrap_or_default();
    let label = Style::default().add_modifier(Modifier::BOLD);

    let lines = vec![
        Line::from(vec![
            Span::styled("Program: ", label),
            Span::raw(row.name.clone()),
        ]),
        Line::from(vec![
            Span::styled("Time Started: ", label),
            Span::raw(format_time(row.start_time)),
        ]),
        Line::from(vec![
            Span::styled("Last Updated: ", label),
            Span::raw(format_time(row.last_time)),
        ]),
        Line::from(vec![
            Span::styled("Connection Status: ", label),
            Span::styled(state.label(), app.theme.status_style(state)),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            format!("Running for {}", format_span(Utc::now() - row.start_time)),
            Style::default().add_modifier(Modifier::DIM),
        )),
    ];

    let block = Block::default()
        .title(" Client ")
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(Style::default().fg(app.theme.border));

    frame.render_widget(Paragraph::new(lines).block(block), area);
}
