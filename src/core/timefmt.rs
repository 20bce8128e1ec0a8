// src/core/timefmt.rs

use chrono::{DateTime, Utc};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

/// Renders a stored UTC instant in the machine's local timezone, e.g.
/// `05-03-2024 02:07PM`. Falls back to UTC when the local offset cannot be
/// determined.
pub fn format_local(instant: DateTime<Utc>) -> String {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    format_with_offset(instant, offset)
}

pub fn format_with_offset(instant: DateTime<Utc>, offset: UtcOffset) -> String {
    let Ok(moment) = OffsetDateTime::from_unix_timestamp(instant.timestamp()) else {
        return String::new();
    };
    let layout = format_description!("[day]-[month]-[year] [hour repr:12]:[minute][period]");
    moment.to_offset(offset).format(&layout).unwrap_or_default()
}

/// Empty string for a missing instant.
pub fn format_optional(instant: Option<DateTime<Utc>>) -> String {
    instant.map(format_local).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use time::macros::offset;

    #[test]
    fn test_formats_in_given_offset() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 0).unwrap();
        assert_eq!(format_with_offset(instant, UtcOffset::UTC), "05-03-2024 02:07PM");
        assert_eq!(format_with_offset(instant, offset!(+5:30)), "05-03-2024 07:37PM");
        assert_eq!(format_with_offset(instant, offset!(-15:00)), "04-03-2024 11:07PM");
    }

    #[test]
    fn test_missing_instant_is_empty() {
        assert_eq!(format_optional(None), "");
    }
}
