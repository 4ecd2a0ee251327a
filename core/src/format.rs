/// Display helpers for message timestamps and thread toggles
use chrono::{DateTime, TimeZone};
use std::fmt::Display;

/// `03:07 PM` for messages under a day old, `Jan 5, 03:07 PM` otherwise
pub fn format_time<Tz>(timestamp: &DateTime<Tz>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let age = now.clone().signed_duration_since(timestamp.clone());
    if age.num_hours() < 24 {
        timestamp.format("%I:%M %p").to_string()
    } else {
        timestamp.format("%b %-d, %I:%M %p").to_string()
    }
}

/// Label of the reply-thread toggle, e.g. `View 2 replies`
pub fn thread_label(reply_count: u32, expanded: bool) -> String {
    let verb = if expanded { "Hide" } else { "View" };
    let noun = if reply_count == 1 { "reply" } else { "replies" };
    format!("{} {} {}", verb, reply_count, noun)
}
