use chrono::{DateTime, Local, TimeZone};
use heartwatch_sdk::Timestamp;

/// 12-hour clock with lowercase meridiem, e.g. "3:04:05 pm".
const TIME_FORMAT: &str = "%-I:%M:%S %P";

/// Format a timestamp in local time for display
pub fn format_time(t: Timestamp) -> String {
    format_time_in(t, &Local)
}

/// Format a timestamp in the given zone
pub fn format_time_in<Tz: TimeZone>(t: Timestamp, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let local: DateTime<Tz> = t.with_timezone(tz);
    local.format(TIME_FORMAT).to_string()
}

/// Format an elapsed span as "3s", "4m 05s" or "2h 03m 04s"
pub fn format_span(span: chrono::Duration) -> String {
    let secs = span.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}
