use crate::zone::local_to_utc;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M",
    "%d.%m.%Y %H:%M",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y"];

/// Generic date/time parsing used once no strategy claimed the input.
///
/// Offset-carrying formats are taken as-is; naive ones are wall time in
/// `zone`. A bare date means the start of that day.
pub fn parse_fixed_format(input: &str, zone: Tz) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, fmt) {
            return local_to_utc(zone, naive).ok();
        }
    }

    for fmt in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(input, fmt) {
            return local_to_utc(zone, date.and_time(NaiveTime::MIN)).ok();
        }
    }

    DateTime::parse_from_rfc2822(input)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_keeps_its_offset() {
        let dt = parse_fixed_format("2025-01-01T10:00:00+02:00", Tz::Europe__Berlin)
            .expect("rfc3339");
        assert_eq!(dt.to_rfc3339(), "2025-01-01T08:00:00+00:00");
    }

    #[test]
    fn naive_datetime_is_local_wall_time() {
        let dt = parse_fixed_format("2025-07-01 09:30", Tz::Europe__Berlin).expect("naive");
        assert_eq!(dt.to_rfc3339(), "2025-07-01T07:30:00+00:00");
    }

    #[test]
    fn bare_date_is_start_of_day() {
        let dt = parse_fixed_format("2025-03-01", Tz::UTC).expect("date");
        assert_eq!(dt.to_rfc3339(), "2025-03-01T00:00:00+00:00");
    }

    #[test]
    fn rfc2822_is_last_resort() {
        let dt = parse_fixed_format("Wed, 01 Jan 2025 12:00:00 +0000", Tz::UTC).expect("rfc2822");
        assert_eq!(dt.to_rfc3339(), "2025-01-01T12:00:00+00:00");
    }

    #[test]
    fn garbage_is_none() {
        assert!(parse_fixed_format("whenever you like", Tz::UTC).is_none());
        assert!(parse_fixed_format("", Tz::UTC).is_none());
    }
}
