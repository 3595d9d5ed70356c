use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::sync::LazyLock;

static CLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<h>\d{1,2})(?::(?P<m>\d{2}))?\s*(?P<mer>am|pm)?$").expect("clock regex")
});

/// Shared `TIME` fragment for strategy recognizers.
pub(crate) const TIME_FRAGMENT: &str = r"noon|midnight|\d{1,2}(?::\d{2})?\s*(?:am|pm)?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClockSpec {
    At(NaiveTime),
    /// 00:00 at the end of the day it is applied to.
    Midnight,
}

pub(crate) fn parse_clock(raw: &str) -> Result<ClockSpec, String> {
    let raw = raw.trim();
    match raw {
        "noon" => return at(12, 0),
        "midnight" => return Ok(ClockSpec::Midnight),
        _ => {}
    }
    let caps = CLOCK_RE
        .captures(raw)
        .ok_or_else(|| format!("{raw:?} is not a clock time"))?;
    let hour: u32 = caps["h"]
        .parse()
        .map_err(|_| format!("invalid hour in {raw:?}"))?;
    let minute: u32 = match caps.name("m") {
        Some(m) => m
            .as_str()
            .parse()
            .map_err(|_| format!("invalid minute in {raw:?}"))?,
        None => 0,
    };
    let hour = match caps.name("mer").map(|m| m.as_str()) {
        Some(mer) => {
            if !(1..=12).contains(&hour) {
                return Err(format!("hour {hour} out of range for {mer}"));
            }
            match (mer, hour) {
                ("am", 12) => 0,
                ("am", h) => h,
                ("pm", 12) => 12,
                (_, h) => h + 12,
            }
        }
        None => hour,
    };
    at(hour, minute)
}

fn at(hour: u32, minute: u32) -> Result<ClockSpec, String> {
    NaiveTime::from_hms_opt(hour, minute, 0)
        .map(ClockSpec::At)
        .ok_or_else(|| format!("{hour:02}:{minute:02} is not a valid time of day"))
}

pub(crate) fn on_date(date: NaiveDate, clock: ClockSpec) -> Result<NaiveDateTime, String> {
    match clock {
        ClockSpec::At(time) => Ok(date.and_time(time)),
        ClockSpec::Midnight => date
            .checked_add_days(Days::new(1))
            .map(|d| d.and_time(NaiveTime::MIN))
            .ok_or_else(|| format!("no day follows {date}")),
    }
}

pub(crate) fn hour_of(hour: u32) -> ClockSpec {
    NaiveTime::from_hms_opt(hour, 0, 0)
        .map(ClockSpec::At)
        .unwrap_or(ClockSpec::At(NaiveTime::MIN))
}
