use chrono::Utc;

/// Current unix time in seconds
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Current unix time in nanoseconds
pub fn unix_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

pub fn strip_carriage_returns(s: &str) -> String {
    s.replace('\r', "")
}

/// Format a duration in seconds as `H:MM:SS`.
pub fn format_hms(secs: i64) -> String {
    let secs = secs.max(0);
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
