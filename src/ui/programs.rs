//! Programs table rendering (server view).
//!
//! One row for the server itself, then one per registered client.

use ratatui::{
    layout::{Constraint, Rect},
    style::Style,
    widgets::{Block, Borders, Cell, Row, Table, TableState},
    Frame,
};

use crate::app::App;
use crate::format::format_time;

/// Render the server's programs table.
pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let Some(ref data) = app.data else {
        return;
    };

    let header = Row::new(vec![
        Cell::from("Name"),
        Cell::from("Start Time"),
        Cell::from("Last Updated"),
        Cell::from("Status"),
    ])
    .height(1)
    .style(app.theme.header);

    let rows: Vec<Row> = data
        .rows
        .iter()
        .map(|row| {
            let (row_style, status_style) = match row.state {
                Some(state) => (Style::default(), app.theme.status_style(state)),
                None => (app.theme.own_row, app.theme.own_row),
            };

            Row::new(vec![
                Cell::from(row.name.clone()),
                Cell::from(format_time(row.start_time)),
                Cell::from(format_time(row.last_time)),
                Cell::from(row.status_label()).style(status_style),
            ])
            .style(row_style)
        })
        .collect();

    let widths = [
        Constraint::Fill(3), // Name
        Constraint::Fill(1), // Start Time
        Constraint::Fill(1), // Last Updated
        Constraint::Min(16), // Status
    ];

    let selected = app.selected_index.min(data.rows.len().saturating_sub(1));
    let title = format!(
        " Programs ({} registered) [{}/{}] ",
        data.clients().count(),
        selected + 1,
        data.rows.len()
    );

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_type(app.theme.border_type)
                .border_style(Style::default().fg(app.theme.border)),
        )
        .row_highlight_style(app.theme.selected)
        .highlight_symbol("▶ ");

    let mut state = TableState::default();
    state.select(Some(selected));

    frame.render_stateful_widget(table, area, &mut state);
}
