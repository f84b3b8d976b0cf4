//! Relative time expressions.
//!
//! Two grammars are supported. Graph templates use the short form
//! `"2 days 3 hours 10 minutes"` (days, hours and minutes only), parsed by
//! [`parse_time`]. Expression documents use [`parse_duration`], which also
//! accepts a sign, years, months, weeks and seconds.

use chrono::{DateTime, Duration, SecondsFormat, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::{Error, Result};

static TIME_EXPR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\s*(\d+)\s*d(ays?)?)?(\s*(\d+)\s*h(ours?)?)?(\s*(\d+)\s*m(in(utes?)?)?)?\s*$",
    )
    .expect("time expression pattern is valid")
});

static DURATION_EXPR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(\s*(?P<sign>-|\+))?",
        r"(\s*(?P<years>\d+)\s*y((ears?)|r)?)?",
        r"(\s*(?P<months>\d+)\s*mo(nths?)?)?",
        r"(\s*(?P<weeks>\d+)\s*w((eeks?)|k)?)?",
        r"(\s*(?P<days>\d+)\s*d(ays?)?)?",
        r"(\s*(?P<hours>\d+)\s*h((ours?)|r)?)?",
        r"(\s*(?P<minutes>\d+)\s*m(in(utes?)?)?)?",
        r"(\s*(?P<seconds>\d+)\s*s(ec(onds?)?)?)?",
        r"\s*$"
    ))
    .expect("duration pattern is valid")
});

const MS_PER_MINUTE: i64 = 60_000;
const MS_PER_HOUR: i64 = 3_600_000;
const MS_PER_DAY: i64 = 86_400_000;

/// A non-negative offset made of days, hours and minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeOffset {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
}

impl RelativeOffset {
    pub fn new(days: u64, hours: u64, minutes: u64) -> Self {
        Self {
            days,
            hours,
            minutes,
        }
    }

    /// Total length of the offset in milliseconds, `None` on overflow.
    pub fn as_millis(&self) -> Option<i64> {
        let part = |count: u64, unit: i64| i64::try_from(count).ok()?.checked_mul(unit);
        part(self.days, MS_PER_DAY)?
            .checked_add(part(self.hours, MS_PER_HOUR)?)?
            .checked_add(part(self.minutes, MS_PER_MINUTE)?)
    }
}

/// Parse `"X days Y hours Z minutes"`; every component is optional.
pub fn parse_time(text: &str) -> Result<RelativeOffset> {
    let caps = TIME_EXPR
        .captures(text)
        .ok_or_else(|| Error::MalformedTimeExpression(text.to_string()))?;

    let component = |idx: usize| -> Result<u64> {
        match caps.get(idx) {
            Some(m) => m
                .as_str()
                .parse()
                .map_err(|_| Error::MalformedTimeExpression(text.to_string())),
            None => Ok(0),
        }
    };

    Ok(RelativeOffset {
        days: component(2)?,
        hours: component(5)?,
        minutes: component(8)?,
    })
}

/// Add `offset` to `to`. `None` when the result is out of range.
pub fn relative_time(offset: RelativeOffset, to: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let delta = TimeDelta::try_milliseconds(offset.as_millis()?)?;
    to.checked_add_signed(delta)
}

/// Parse the expression-language duration grammar into a signed duration.
///
/// A year counts as 365 days and a month as 30 days.
pub fn parse_duration(text: &str) -> Result<Duration> {
    let caps = DURATION_EXPR
        .captures(text)
        .ok_or_else(|| Error::MalformedTimeExpression(text.to_string()))?;

    let component = |name: &str| -> Result<i64> {
        match caps.name(name) {
            Some(m) => m
                .as_str()
                .parse()
                .map_err(|_| Error::MalformedTimeExpression(text.to_string())),
            None => Ok(0),
        }
    };

    let mut millis: i64 = 0;
    for (name, unit) in [
        ("years", 365 * MS_PER_DAY),
        ("months", 30 * MS_PER_DAY),
        ("weeks", 7 * MS_PER_DAY),
        ("days", MS_PER_DAY),
        ("hours", MS_PER_HOUR),
        ("minutes", MS_PER_MINUTE),
        ("seconds", 1000),
    ] {
        millis = component(name)?
            .checked_mul(unit)
            .and_then(|ms| millis.checked_add(ms))
            .ok_or_else(|| Error::MalformedTimeExpression(text.to_string()))?;
    }

    let negative = caps.name("sign").is_some_and(|m| m.as_str() == "-");
    TimeDelta::try_milliseconds(if negative { -millis } else { millis })
        .ok_or_else(|| Error::MalformedTimeExpression(text.to_string()))
}

/// Format an instant the way task definitions expect it:
/// `2017-07-11T20:36:23.123Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
