//! Application state and navigation logic.

use std::time::{Duration, Instant};

use crate::source::{Role, StatusSource, StatusView};
use crate::ui::Theme;

/// How long a status message stays in the status bar.
const STATUS_MESSAGE_TTL: Duration = Duration::from_secs(3);

/// Main application state.
pub struct App {
    pub running: bool,
    pub show_help: bool,

    // Data source
    source: Box<dyn StatusSource>,
    pub data: Option<StatusView>,
    pub last_updated: Option<Instant>,

    // Navigation state
    pub selected_index: usize,

    // UI
    pub theme: Theme,

    // Status message (temporary feedback)
    pub status_message: Option<(String, Instant)>,

    reconnect_requested: bool,
}

impl App {
    /// Create a new App reading from the given source.
    pub fn new(source: Box<dyn StatusSource>) -> Self {
        Self::with_theme(source, Theme::auto_detect())
    }

    /// Create a new App with an explicit theme.
    pub fn with_theme(source: Box<dyn StatusSource>, theme: Theme) -> Self {
        Self {
            running: true,
            show_help: false,
            source,
            data: None,
            last_updated: None,
            selected_index: 0,
            theme,
            status_message: None,
            reconnect_requested: false,
        }
    }

    /// Returns a description of the current data source.
    pub fn source_description(&self) -> &str {
        self.source.description()
    }

    /// Which side of the protocol this app shows.
    pub fn role(&self) -> Role {
        self.source.role()
    }

    /// Set a temporary status message that will be shown for a few seconds.
    pub fn set_status_message(&mut self, message: String) {
        self.status_message = Some((message, Instant::now()));
    }

    /// Get the current status message if it hasn't expired.
    pub fn get_status_message(&self) -> Option<&str> {
        if let Some((msg, time)) = &self.status_message {
            if time.elapsed() < STATUS_MESSAGE_TTL {
                return Some(msg);
            }
        }
        None
    }

    /// Copy the latest status out of the source.
    pub fn reload_data(&mut self) {
        let view = self.source.poll();

        // Clamp selection index
        let max = view.rows.len().saturating_sub(1);
        self.selected_index = self.selected_index.min(max);

        self.data = Some(view);
        self.last_updated = Some(Instant::now());
    }

    /// Number of rows in the current view.
    pub fn row_count(&self) -> usize {
        self.data.as_ref().map_or(0, |data| data.rows.len())
    }

    /// Move selection down by one row.
    pub fn select_next(&mut self) {
        self.select_next_n(1);
    }

    /// Move selection up by one row.
    pub fn select_prev(&mut self) {
        self.select_prev_n(1);
    }

    /// Move selection down by n rows.
    pub fn select_next_n(&mut self, n: usize) {
        let max = self.row_count().saturating_sub(1);
        self.selected_index = (self.selected_index + n).min(max);
    }

    /// Move selection up by n rows.
    pub fn select_prev_n(&mut self, n: usize) {
        self.selected_index = self.selected_index.saturating_sub(n);
    }

    /// Jump to the first row.
    pub fn select_first(&mut self) {
        self.selected_index = 0;
    }

    /// Jump to the last row.
    pub fn select_last(&mut self) {
        self.selected_index = self.row_count().saturating_sub(1);
    }

    /// Toggle the help overlay.
    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    /// Ask the main loop for one reconnect attempt. Clients only.
    pub fn request_reconnect(&mut self) {
        if self.role() == Role::Client {
            self.reconnect_requested = true;
            self.set_status_message("Reconnecting...".to_string());
        }
    }

    /// Returns true once per reconnect request.
    pub fn take_reconnect_request(&mut self) -> bool {
        std::mem::take(&mut self.reconnect_requested)
    }

    /// Signal the application to quit.
    pub fn quit(&mut self) {
        self.running = false;
    }
}
