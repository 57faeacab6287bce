use chrono::{DateTime, Utc};

pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Short "time ago" label: `Now`, then minutes, hours, days, weeks and years.
///
/// Timestamps in the future count as `Now`.
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds();
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if seconds < 60 {
        "Now".to_string()
    } else if minutes < 60 {
        format!("{}m", minutes)
    } else if hours < 24 {
        format!("{}h", hours)
    } else if hours < 168 {
        format!("{}d", hours / 24)
    } else if hours < 8760 {
        format!("{}w", hours / 168)
    } else {
        format!("{}y", hours / 8760)
    }
}
