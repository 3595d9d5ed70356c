use crate::error::{ParseFailure, Result};
use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Parses an IANA zone name. Missing or blank means UTC.
pub fn parse_zone(zone: Option<&str>) -> Result<Tz> {
    let Some(raw) = zone.map(str::trim).filter(|z| !z.is_empty()) else {
        return Ok(Tz::UTC);
    };
    if raw.eq_ignore_ascii_case("utc") || raw.eq_ignore_ascii_case("gmt") || raw == "Z" {
        return Ok(Tz::UTC);
    }
    raw.parse::<Tz>()
        .map_err(|_| ParseFailure::UnknownTimeZone {
            zone: raw.to_string(),
        })
}

pub(crate) fn to_local(zone: Tz, instant: DateTime<Utc>) -> NaiveDateTime {
    instant.with_timezone(&zone).naive_local()
}

/// Wall-clock time in `zone` to UTC. A DST fold takes the earlier instant,
/// a DST gap has no answer.
pub(crate) fn local_to_utc(
    zone: Tz,
    local: NaiveDateTime,
) -> std::result::Result<DateTime<Utc>, String> {
    match zone.from_local_datetime(&local) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(format!("{local} does not exist in {zone}")),
    }
}
