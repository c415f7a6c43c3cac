use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Parse an IANA timezone name such as `America/New_York`.
pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.trim().parse::<Tz>().ok()
}

/// Render a user turn the way it is stored in the conversation:
/// `At Mon 01/01/24 10:00 UTC 42 (alice) said: hi`.
pub fn format_user_turn(
    author_id: &str,
    author_name: &str,
    content: &str,
    timezone: Tz,
    at: DateTime<Utc>,
) -> String {
    let local = at.with_timezone(&timezone);
    format!(
        "At {} {author_id} ({author_name}) said: {}",
        local.format("%a %d/%m/%y %H:%M %Z"),
        content.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_in_utc() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 10, 5, 0).unwrap();
        let text = format_user_turn("42", "alice", "  hi there ", Tz::UTC, at);
        assert_eq!(text, "At Mon 01/01/24 10:05 UTC 42 (alice) said: hi there");
    }

    #[test]
    fn formats_in_user_timezone() {
        let at = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        let tz = parse_timezone("America/New_York").unwrap();
        let text = format_user_turn("7", "bob", "hey", tz, at);
        assert_eq!(text, "At Mon 01/07/24 08:00 EDT 7 (bob) said: hey");
    }

    #[test]
    fn rejects_unknown_timezone() {
        assert!(parse_timezone("Mars/Olympus").is_none());
        assert!(parse_timezone(" Europe/London ").is_some());
    }
}
