use chrono::{DateTime, SecondsFormat, Utc};

/// Timestamp format used for every persisted `*_at` field.
pub fn iso8601(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Calendar-date prefix of a stored timestamp, tolerating short or
/// non-ASCII values.
pub fn date_part(timestamp: &str) -> &str {
    timestamp.get(..10).unwrap_or(timestamp)
}

#[cfg(test)]
mod tests {
    use super::{date_part, iso8601};
    use chrono::{TimeZone, Utc};

    #[test]
    fn formats_utc_seconds() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(iso8601(at), "2026-03-04T05:06:07Z");
    }

    #[test]
    fn date_part_handles_legacy_and_short_values() {
        assert_eq!(date_part("2025-12-01T09:15:00.123456"), "2025-12-01");
        assert_eq!(date_part("2025"), "2025");
        assert_eq!(date_part(""), "");
    }
}
