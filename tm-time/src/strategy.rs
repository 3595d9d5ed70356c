//! The ordered parser chain.
//!
//! Every recognizer is anchored at both ends so that no two strategies can
//! claim the same normalized input; dispatch is plain first match.

use crate::clock::{ClockSpec, TIME_FRAGMENT, hour_of, on_date, parse_clock};
use crate::zone::local_to_utc;
use chrono::{DateTime, Datelike, Days, Duration, NaiveDateTime, Utc, Weekday};
use chrono_tz::Tz;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:in\s+(?P<n>\d+)\s*(?P<unit>minutes?|mins?|m|hours?|hrs?|h|days?|d|weeks?|wks?|w)|(?P<bare_n>\d+)\s*(?P<bare_unit>minutes?|mins?|m|hours?|hrs?|h)|in\s+(?:an?|one)\s+(?P<one_unit>minute|hour|day|week)|in\s+(?P<half>half\s+an?\s+hour))$",
    )
    .expect("duration regex")
});

static CLOCK_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:at\s+)?(?P<named>noon|midnight)|at\s+(?P<at>\d{1,2}(?::\d{2})?\s*(?:am|pm)?)|(?P<bare>\d{1,2}(?::\d{2})?\s*(?:am|pm)|\d{1,2}:\d{2}))$",
    )
    .expect("clock time regex")
});

static DAY_OF_WEEK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?:(?P<next_week>next\s+week)|(?:next|on)\s+(?P<day>monday|mon|tuesday|tues|tue|wednesday|wed|thursday|thurs|thu|friday|fri|saturday|sat|sunday|sun)(?:\s+at\s+(?P<time>{TIME_FRAGMENT}))?)$"
    ))
    .expect("day of week regex")
});

static END_OF_PERIOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?P<day>end\s+of\s+(?:the\s+)?day|eod)|(?P<week>end\s+of\s+(?:the\s+)?week|eow))$",
    )
    .expect("end of period regex")
});

static TIME_OF_DAY_ALIAS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?P<tonight>tonight)|this\s+(?P<part>morning|afternoon|evening))$")
        .expect("time of day alias regex")
});

static TOMORROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^tomorrow(?:\s+(?P<part>morning|afternoon|evening)|\s+(?:at\s+)?(?P<time>{TIME_FRAGMENT}))?$"
    ))
    .expect("tomorrow regex")
});

const END_OF_DAY_HOUR: u32 = 17;
const TONIGHT_HOUR: u32 = 20;

/// Reference point for one resolution.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResolveContext {
    pub reference: DateTime<Utc>,
    pub zone: Tz,
    pub local: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseStrategy {
    Duration,
    ClockTime,
    DayOfWeek,
    EndOfPeriod,
    TimeOfDayAlias,
    Tomorrow,
}

impl ParseStrategy {
    pub const ORDERED: [ParseStrategy; 6] = [
        ParseStrategy::Duration,
        ParseStrategy::ClockTime,
        ParseStrategy::DayOfWeek,
        ParseStrategy::EndOfPeriod,
        ParseStrategy::TimeOfDayAlias,
        ParseStrategy::Tomorrow,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Duration => "duration",
            Self::ClockTime => "clock_time",
            Self::DayOfWeek => "day_of_week",
            Self::EndOfPeriod => "end_of_period",
            Self::TimeOfDayAlias => "time_of_day_alias",
            Self::Tomorrow => "tomorrow",
        }
    }

    /// Whether this strategy claims `input`. Input must already be trimmed,
    /// lowercased and whitespace-collapsed.
    pub fn matches(&self, input: &str) -> bool {
        self.recognize(input).is_some()
    }

    pub(crate) fn recognize<'t>(&self, input: &'t str) -> Option<Captures<'t>> {
        match self {
            Self::Duration => {
                let caps = DURATION_RE.captures(input)?;
                // A zero amount is not a duration at all.
                let amount = caps.name("n").or_else(|| caps.name("bare_n"));
                if let Some(amount) = amount {
                    if amount.as_str().bytes().all(|b| b == b'0') {
                        return None;
                    }
                }
                Some(caps)
            }
            Self::ClockTime => CLOCK_TIME_RE.captures(input),
            Self::DayOfWeek => DAY_OF_WEEK_RE.captures(input),
            Self::EndOfPeriod => END_OF_PERIOD_RE.captures(input),
            Self::TimeOfDayAlias => TIME_OF_DAY_ALIAS_RE.captures(input),
            Self::Tomorrow => TOMORROW_RE.captures(input),
        }
    }

    pub(crate) fn resolve(
        &self,
        caps: &Captures<'_>,
        ctx: &ResolveContext,
    ) -> Result<DateTime<Utc>, String> {
        match self {
            Self::Duration => resolve_duration(caps, ctx),
            Self::ClockTime => resolve_clock_time(caps, ctx),
            Self::DayOfWeek => resolve_day_of_week(caps, ctx),
            Self::EndOfPeriod => resolve_end_of_period(caps, ctx),
            Self::TimeOfDayAlias => resolve_time_of_day_alias(caps, ctx),
            Self::Tomorrow => resolve_tomorrow(caps, ctx),
        }
    }
}

fn resolve_duration(caps: &Captures<'_>, ctx: &ResolveContext) -> Result<DateTime<Utc>, String> {
    let (amount, unit) = if let (Some(n), Some(unit)) = (caps.name("n"), caps.name("unit")) {
        (n.as_str(), unit.as_str())
    } else if let (Some(n), Some(unit)) = (caps.name("bare_n"), caps.name("bare_unit")) {
        (n.as_str(), unit.as_str())
    } else if let Some(unit) = caps.name("one_unit") {
        ("1", unit.as_str())
    } else if caps.name("half").is_some() {
        ("30", "minutes")
    } else {
        return Err("no duration captured".to_string());
    };

    let amount: i64 = amount
        .parse()
        .map_err(|_| format!("amount {amount} is too large"))?;
    let seconds_per_unit: i64 = match unit.chars().next() {
        Some('m') => 60,
        Some('h') => 3_600,
        Some('d') => 86_400,
        Some('w') => 604_800,
        _ => return Err(format!("unsupported unit {unit:?}")),
    };
    let total = amount
        .checked_mul(seconds_per_unit)
        .and_then(Duration::try_seconds)
        .ok_or_else(|| format!("{amount} {unit} is too large"))?;
    ctx.reference
        .checked_add_signed(total)
        .ok_or_else(|| format!("{amount} {unit} from now is out of range"))
}

fn resolve_clock_time(caps: &Captures<'_>, ctx: &ResolveContext) -> Result<DateTime<Utc>, String> {
    let raw = caps
        .name("named")
        .or_else(|| caps.name("at"))
        .or_else(|| caps.name("bare"))
        .map(|m| m.as_str())
        .ok_or_else(|| "no clock time captured".to_string())?;
    let clock = parse_clock(raw)?;
    local_to_utc(ctx.zone, on_date(ctx.local.date(), clock)?)
}

fn resolve_day_of_week(caps: &Captures<'_>, ctx: &ResolveContext) -> Result<DateTime<Utc>, String> {
    if caps.name("next_week").is_some() {
        return ctx
            .reference
            .checked_add_signed(Duration::days(7))
            .ok_or_else(|| "next week is out of range".to_string());
    }
    let day = caps
        .name("day")
        .map(|m| m.as_str())
        .ok_or_else(|| "no weekday captured".to_string())?;
    let target = parse_weekday(day).ok_or_else(|| format!("unknown weekday {day:?}"))?;
    let date = next_occurrence(ctx.local, target)?;
    let local = match caps.name("time") {
        Some(time) => on_date(date.date(), parse_clock(time.as_str())?)?,
        None => date,
    };
    local_to_utc(ctx.zone, local)
}

fn resolve_end_of_period(
    caps: &Captures<'_>,
    ctx: &ResolveContext,
) -> Result<DateTime<Utc>, String> {
    let date = if caps.name("week").is_some() {
        next_occurrence(ctx.local, Weekday::Fri)?.date()
    } else {
        ctx.local.date()
    };
    local_to_utc(ctx.zone, on_date(date, hour_of(END_OF_DAY_HOUR))?)
}

fn resolve_time_of_day_alias(
    caps: &Captures<'_>,
    ctx: &ResolveContext,
) -> Result<DateTime<Utc>, String> {
    let clock = if caps.name("tonight").is_some() {
        hour_of(TONIGHT_HOUR)
    } else {
        let part = caps
            .name("part")
            .map(|m| m.as_str())
            .ok_or_else(|| "no part of day captured".to_string())?;
        part_of_day(part)?
    };
    local_to_utc(ctx.zone, on_date(ctx.local.date(), clock)?)
}

fn resolve_tomorrow(caps: &Captures<'_>, ctx: &ResolveContext) -> Result<DateTime<Utc>, String> {
    let clock = if let Some(part) = caps.name("part") {
        part_of_day(part.as_str())?
    } else if let Some(time) = caps.name("time") {
        parse_clock(time.as_str())?
    } else {
        return ctx
            .reference
            .checked_add_signed(Duration::days(1))
            .ok_or_else(|| "tomorrow is out of range".to_string());
    };
    let date = ctx
        .local
        .date()
        .checked_add_days(Days::new(1))
        .ok_or_else(|| "tomorrow is out of range".to_string())?;
    local_to_utc(ctx.zone, on_date(date, clock)?)
}

fn part_of_day(part: &str) -> Result<ClockSpec, String> {
    match part {
        "morning" => Ok(hour_of(9)),
        "afternoon" => Ok(hour_of(14)),
        "evening" => Ok(hour_of(18)),
        other => Err(format!("unknown part of day {other:?}")),
    }
}

fn parse_weekday(day: &str) -> Option<Weekday> {
    match day {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tues" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thurs" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Next strictly-future date falling on `target`, keeping the time of day.
/// Today never counts: the same weekday is a week out.
fn next_occurrence(local: NaiveDateTime, target: Weekday) -> Result<NaiveDateTime, String> {
    let today = local.weekday().num_days_from_monday();
    let wanted = target.num_days_from_monday();
    let ahead = match (wanted + 7 - today) % 7 {
        0 => 7,
        n => n,
    };
    local
        .checked_add_days(Days::new(u64::from(ahead)))
        .ok_or_else(|| format!("next {target} is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claimants(input: &str) -> Vec<ParseStrategy> {
        ParseStrategy::ORDERED
            .iter()
            .copied()
            .filter(|s| s.matches(input))
            .collect()
    }

    #[test]
    fn recognizers_are_disjoint() {
        let inputs = [
            "in 10 minutes",
            "10 minutes",
            "in an hour",
            "in half an hour",
            "at 3pm",
            "3pm",
            "15:00",
            "noon",
            "at midnight",
            "next monday",
            "on friday at 9am",
            "next week",
            "eod",
            "end of the week",
            "tonight",
            "this evening",
            "tomorrow",
            "tomorrow at 8:30",
            "tomorrow morning",
        ];
        for input in inputs {
            assert_eq!(claimants(input).len(), 1, "{input} should match exactly once");
        }
    }

    #[test]
    fn zero_duration_is_not_claimed() {
        assert!(claimants("in 0 minutes").is_empty());
        assert!(claimants("00 hours").is_empty());
    }

    #[test]
    fn bare_days_are_not_a_duration() {
        assert!(!ParseStrategy::Duration.matches("3 days"));
        assert!(ParseStrategy::Duration.matches("in 3 days"));
    }

    #[test]
    fn tomorrow_variants_are_not_clock_times() {
        assert!(!ParseStrategy::ClockTime.matches("tomorrow at 3pm"));
        assert!(ParseStrategy::Tomorrow.matches("tomorrow at 3pm"));
    }

    #[test]
    fn weekday_abbreviations() {
        assert_eq!(parse_weekday("tues"), Some(Weekday::Tue));
        assert_eq!(parse_weekday("thurs"), Some(Weekday::Thu));
        assert_eq!(parse_weekday("someday"), None);
    }
}
