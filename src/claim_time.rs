use chrono::{DateTime, Datelike, FixedOffset};

/// Claim timestamps are always rendered at this fixed offset (+05:30),
/// independent of the server's locale.
const CLAIM_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// Renders a Unix timestamp as `hh:mm A MMMM Do, YYYY` at UTC+05:30,
/// e.g. `05:46 AM January 1st, 1970`. This is the canonical form of a
/// record's `timeString`; it must stay a pure function of the timestamp.
pub fn render_claim_time(timestamp: i64) -> String {
    let offset = FixedOffset::east_opt(CLAIM_OFFSET_SECS).expect("valid fixed offset");
    let at = DateTime::from_timestamp(timestamp, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .with_timezone(&offset);
    format!(
        "{} {}{}, {}",
        at.format("%I:%M %p %B"),
        at.day(),
        ordinal_suffix(at.day()),
        at.year()
    )
}

fn ordinal_suffix(day: u32) -> &'static str {
    match day {
        11..=13 => "th",
        _ => match day % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        },
    }
}
