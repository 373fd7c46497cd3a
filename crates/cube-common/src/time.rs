//! Calendar-aware timestamps and durations.
//!
//! A [`DateTime`] carries the calendar unit it was expressed in, so that
//! "2018-03" and "2018-03-01T00:00:00" are distinguishable and subtraction
//! can count whole months or years instead of seconds.

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Mul;
use std::str::FromStr;

type ChronoDuration = chrono::Duration;

/// Calendar units, ordered from finest to coarsest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DateUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl DateUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateUnit::Second => "second",
            DateUnit::Minute => "minute",
            DateUnit::Hour => "hour",
            DateUnit::Day => "day",
            DateUnit::Week => "week",
            DateUnit::Month => "month",
            DateUnit::Year => "year",
        }
    }
}

impl fmt::Display for DateUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateUnit {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s" | "second" | "seconds" => Ok(DateUnit::Second),
            "min" | "minute" | "minutes" => Ok(DateUnit::Minute),
            "h" | "hour" | "hours" => Ok(DateUnit::Hour),
            "d" | "day" | "days" => Ok(DateUnit::Day),
            "w" | "week" | "weeks" => Ok(DateUnit::Week),
            "m" | "month" | "months" => Ok(DateUnit::Month),
            "y" | "year" | "years" => Ok(DateUnit::Year),
            _ => Err(TimeError::InvalidUnit(s.to_string())),
        }
    }
}

/// A timestamp at a given calendar precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DateTime {
    value: NaiveDateTime,
    unit: DateUnit,
}

impl DateTime {
    /// Create from a naive timestamp, truncating it to `unit`.
    pub fn new(value: NaiveDateTime, unit: DateUnit) -> Self {
        Self { value, unit }.with_unit(unit)
    }

    /// Parse a timestamp, inferring its unit from the precision of the string.
    ///
    /// Supported forms: `YYYY`, `YYYY-MM`, `YYYYMMDD`, `YYYY-MM-DD`,
    /// `YYYY-MM-DDTHH`, `YYYY-MM-DDTHH:MM`, `YYYY-MM-DDTHH:MM:SS` (space
    /// separator and trailing `Z` allowed) and RFC 3339.
    pub fn parse(s: &str) -> Result<Self, TimeError> {
        let trimmed = s.trim();
        let invalid = || TimeError::InvalidFormat(s.to_string());

        let mut text = trimmed.replacen(' ', "T", 1);
        if text.len() > 10 && (text.ends_with('Z') || text.ends_with('z')) {
            text.pop();
        }

        let all_digits = text.chars().all(|c| c.is_ascii_digit());
        let parsed = match text.len() {
            4 if all_digits => {
                let year: i32 = text.parse().map_err(|_| invalid())?;
                NaiveDate::from_ymd_opt(year, 1, 1)
                    .map(midnight)
                    .map(|v| (v, DateUnit::Year))
            }
            7 => NaiveDate::parse_from_str(&format!("{}-01", text), "%Y-%m-%d")
                .ok()
                .map(|d| (midnight(d), DateUnit::Month)),
            8 if all_digits => NaiveDate::parse_from_str(&text, "%Y%m%d")
                .ok()
                .map(|d| (midnight(d), DateUnit::Day)),
            10 => NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                .ok()
                .map(|d| (midnight(d), DateUnit::Day)),
            13 => NaiveDateTime::parse_from_str(&format!("{}:00", text), "%Y-%m-%dT%H:%M")
                .ok()
                .map(|v| (v, DateUnit::Hour)),
            16 => NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M")
                .ok()
                .map(|v| (v, DateUnit::Minute)),
            19 => NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|v| (v, DateUnit::Second)),
            _ => None,
        };

        let (value, unit) = match parsed {
            Some(p) => p,
            None => {
                // Offsets and fractional seconds
                if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
                    (dt.naive_utc(), DateUnit::Second)
                } else if let Ok(v) = NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f")
                {
                    (v, DateUnit::Second)
                } else {
                    return Err(invalid());
                }
            }
        };

        Ok(Self::new(value, unit))
    }

    pub fn unit(&self) -> DateUnit {
        self.unit
    }

    pub fn naive(&self) -> NaiveDateTime {
        self.value
    }

    /// Re-express at another unit. Fields finer than `unit` are truncated;
    /// a week starts on Monday.
    pub fn with_unit(&self, unit: DateUnit) -> Self {
        let date = self.value.date();
        let time = self.value.time();
        let at = |h: u32, m: u32, s: u32| {
            midnight(date) + ChronoDuration::seconds(i64::from(h * 3600 + m * 60 + s))
        };

        let value = match unit {
            DateUnit::Second => at(time.hour(), time.minute(), time.second()),
            DateUnit::Minute => at(time.hour(), time.minute(), 0),
            DateUnit::Hour => at(time.hour(), 0, 0),
            DateUnit::Day => midnight(date),
            DateUnit::Week => midnight(
                date - ChronoDuration::days(i64::from(date.weekday().num_days_from_monday())),
            ),
            DateUnit::Month => midnight(date - ChronoDuration::days(i64::from(date.day0()))),
            DateUnit::Year => midnight(date - ChronoDuration::days(i64::from(date.ordinal0()))),
        };

        Self { value, unit }
    }

    /// Number of whole `unit`s from `other` to `self` (negative if `self` is earlier).
    pub fn diff(&self, other: &DateTime, unit: DateUnit) -> i64 {
        let a = self.with_unit(unit).value;
        let b = other.with_unit(unit).value;
        match unit {
            DateUnit::Year => i64::from(a.year() - b.year()),
            DateUnit::Month => {
                12 * i64::from(a.year() - b.year()) + i64::from(a.month()) - i64::from(b.month())
            }
            DateUnit::Week => (a - b).num_days() / 7,
            DateUnit::Day => (a - b).num_days(),
            DateUnit::Hour => (a - b).num_hours(),
            DateUnit::Minute => (a - b).num_minutes(),
            DateUnit::Second => (a - b).num_seconds(),
        }
    }

    /// Add a calendar duration. Months and years use calendar arithmetic
    /// (days past the end of the target month are clamped).
    pub fn add(&self, duration: &Duration) -> Result<DateTime, TimeError> {
        let count = i64::from(duration.count);
        let value = match duration.unit {
            DateUnit::Year | DateUnit::Month => {
                let months = if duration.unit == DateUnit::Year {
                    count * 12
                } else {
                    count
                };
                let magnitude =
                    u32::try_from(months.unsigned_abs()).map_err(|_| TimeError::Overflow)?;
                if months >= 0 {
                    self.value.checked_add_months(Months::new(magnitude))
                } else {
                    self.value.checked_sub_months(Months::new(magnitude))
                }
            }
            DateUnit::Week => self.value.checked_add_signed(ChronoDuration::weeks(count)),
            DateUnit::Day => self.value.checked_add_signed(ChronoDuration::days(count)),
            DateUnit::Hour => self.value.checked_add_signed(ChronoDuration::hours(count)),
            DateUnit::Minute => self.value.checked_add_signed(ChronoDuration::minutes(count)),
            DateUnit::Second => self.value.checked_add_signed(ChronoDuration::seconds(count)),
        }
        .ok_or(TimeError::Overflow)?;

        Ok(Self {
            value,
            unit: self.unit,
        })
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::default())
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pattern = match self.unit {
            DateUnit::Year => "%Y",
            DateUnit::Month => "%Y-%m",
            DateUnit::Week | DateUnit::Day => "%Y-%m-%d",
            DateUnit::Hour => "%Y-%m-%dT%H",
            DateUnit::Minute => "%Y-%m-%dT%H:%M",
            DateUnit::Second => "%Y-%m-%dT%H:%M:%S",
        };
        write!(f, "{}", self.value.format(pattern))
    }
}

impl PartialOrd for DateTime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DateTime {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value
            .cmp(&other.value)
            .then_with(|| self.unit.cmp(&other.unit))
    }
}

impl FromStr for DateTime {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateTime::parse(s)
    }
}

impl TryFrom<String> for DateTime {
    type Error = TimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DateTime::parse(&value)
    }
}

impl From<DateTime> for String {
    fn from(value: DateTime) -> Self {
        value.to_string()
    }
}

/// A calendar duration: `count` steps of `unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Duration {
    pub count: i32,
    pub unit: DateUnit,
}

impl Duration {
    pub fn new(count: i32, unit: DateUnit) -> Self {
        Self { count, unit }
    }

    /// Parse a single-component ISO 8601 duration such as `P1D`, `P16D`,
    /// `P1M`, `P1Y`, `P2W`, `PT6H`, `PT30M` or `PT10S`.
    pub fn parse(s: &str) -> Result<Self, TimeError> {
        let invalid = || TimeError::InvalidDuration(s.to_string());
        let upper = s.trim().to_uppercase();
        let body = upper.strip_prefix('P').ok_or_else(invalid)?;

        let (body, in_time) = match body.strip_prefix('T') {
            Some(rest) => (rest, true),
            None => (body, false),
        };

        let designator = body.chars().last().ok_or_else(invalid)?;
        let digits = &body[..body.len() - designator.len_utf8()];
        let count: i32 = digits.parse().map_err(|_| invalid())?;

        let unit = match (in_time, designator) {
            (false, 'Y') => DateUnit::Year,
            (false, 'M') => DateUnit::Month,
            (false, 'W') => DateUnit::Week,
            (false, 'D') => DateUnit::Day,
            (true, 'H') => DateUnit::Hour,
            (true, 'M') => DateUnit::Minute,
            (true, 'S') => DateUnit::Second,
            _ => return Err(invalid()),
        };

        if count <= 0 {
            return Err(invalid());
        }

        Ok(Self { count, unit })
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            DateUnit::Year => write!(f, "P{}Y", self.count),
            DateUnit::Month => write!(f, "P{}M", self.count),
            DateUnit::Week => write!(f, "P{}W", self.count),
            DateUnit::Day => write!(f, "P{}D", self.count),
            DateUnit::Hour => write!(f, "PT{}H", self.count),
            DateUnit::Minute => write!(f, "PT{}M", self.count),
            DateUnit::Second => write!(f, "PT{}S", self.count),
        }
    }
}

impl Mul<i32> for Duration {
    type Output = Duration;

    fn mul(self, rhs: i32) -> Duration {
        Duration {
            count: self.count * rhs,
            unit: self.unit,
        }
    }
}

impl FromStr for Duration {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Duration::parse(s)
    }
}

impl TryFrom<String> for Duration {
    type Error = TimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Duration::parse(&value)
    }
}

impl From<Duration> for String {
    fn from(value: Duration) -> Self {
        value.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeError {
    #[error("Invalid timestamp: {0}")]
    InvalidFormat(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid date unit: {0}")]
    InvalidUnit(String),

    #[error("Date arithmetic overflow")]
    Overflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_infers_unit() {
        assert_eq!(DateTime::parse("2018").unwrap().unit(), DateUnit::Year);
        assert_eq!(DateTime::parse("2018-03").unwrap().unit(), DateUnit::Month);
        assert_eq!(DateTime::parse("2018-03-01").unwrap().unit(), DateUnit::Day);
        assert_eq!(DateTime::parse("20180301").unwrap().unit(), DateUnit::Day);
        assert_eq!(DateTime::parse("2018-03-01T10").unwrap().unit(), DateUnit::Hour);
        assert_eq!(
            DateTime::parse("2018-03-01 10:30").unwrap().unit(),
            DateUnit::Minute
        );
        assert_eq!(
            DateTime::parse("2018-03-01T10:30:05Z").unwrap().unit(),
            DateUnit::Second
        );
        assert_eq!(
            DateTime::parse("2018-03-01T10:30:05+02:00")
                .unwrap()
                .to_string(),
            "2018-03-01T08:30:05"
        );
        assert!(DateTime::parse("yesterday").is_err());
        assert!(DateTime::parse("2018-13").is_err());
    }

    #[test]
    fn test_format_at_unit_precision() {
        for s in [
            "2018",
            "2018-03",
            "2018-03-01",
            "2018-03-01T10",
            "2018-03-01T10:30",
            "2018-03-01T10:30:05",
        ] {
            assert_eq!(DateTime::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn test_with_unit_truncates() {
        let t = DateTime::parse("2018-03-15T10:30:05").unwrap();
        assert_eq!(t.with_unit(DateUnit::Month).to_string(), "2018-03");
        assert_eq!(t.with_unit(DateUnit::Hour).to_string(), "2018-03-15T10");
        // 2018-03-15 is a Thursday
        assert_eq!(t.with_unit(DateUnit::Week).to_string(), "2018-03-12");
        assert_eq!(
            t.with_unit(DateUnit::Year).with_unit(DateUnit::Second).to_string(),
            "2018-01-01T00:00:00"
        );
    }

    #[test]
    fn test_diff_counts_calendar_units() {
        let a = DateTime::parse("2018-01-31").unwrap();
        let b = DateTime::parse("2019-03-01").unwrap();
        assert_eq!(b.diff(&a, DateUnit::Month), 14);
        assert_eq!(b.diff(&a, DateUnit::Year), 1);
        assert_eq!(b.diff(&a, DateUnit::Day), 394);
        assert_eq!(a.diff(&b, DateUnit::Day), -394);

        let c = DateTime::parse("2018-01-01T06").unwrap();
        let d = DateTime::parse("2018-01-02T00").unwrap();
        assert_eq!(d.diff(&c, DateUnit::Hour), 18);
    }

    #[test]
    fn test_add_duration() {
        let t = DateTime::parse("2018-01-31").unwrap();
        assert_eq!(
            t.add(&Duration::parse("P1M").unwrap()).unwrap().to_string(),
            "2018-02-28"
        );
        assert_eq!(
            t.add(&Duration::parse("P16D").unwrap()).unwrap().to_string(),
            "2018-02-16"
        );
        assert_eq!(
            t.add(&(Duration::parse("P1Y").unwrap() * 2))
                .unwrap()
                .to_string(),
            "2020-01-31"
        );
        assert_eq!(
            t.add(&Duration::new(-1, DateUnit::Month)).unwrap().to_string(),
            "2017-12-31"
        );
    }

    #[test]
    fn test_duration_parse_and_format() {
        for s in ["P1D", "P1M", "P1Y", "P2W", "PT6H", "PT30M", "PT10S"] {
            assert_eq!(Duration::parse(s).unwrap().to_string(), s);
        }
        assert_eq!(
            Duration::parse("PT30M").unwrap(),
            Duration::new(30, DateUnit::Minute)
        );
        assert!(Duration::parse("P").is_err());
        assert!(Duration::parse("1D").is_err());
        assert!(Duration::parse("P0D").is_err());
        assert!(Duration::parse("PT1D").is_err());
    }

    #[test]
    fn test_serde_as_strings() {
        let t = DateTime::parse("2018-03").unwrap();
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"2018-03\"");
        let back: DateTime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);

        let d: Duration = serde_json::from_str("\"P16D\"").unwrap();
        assert_eq!(d, Duration::new(16, DateUnit::Day));
    }

    #[test]
    fn test_unit_ordering() {
        assert!(DateUnit::Year > DateUnit::Month);
        assert!(DateUnit::Week > DateUnit::Day);
        assert!(DateUnit::Second < DateUnit::Minute);
    }
}
