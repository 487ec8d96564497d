//! Scheduled-task schedule validation
//!
//! Schedules are checked client-side before a task is created or updated,
//! using the same rules the platform enforces:
//!
//! - `cron`: standard 5-field expression (minute hour day month weekday)
//! - `interval`: integer seconds, at least 10
//! - `once`: ISO 8601 datetime (naive values are taken as UTC)
//!
//! Field syntax for cron: `*`, lists (`1,3,5`), ranges (`1-5`), steps
//! (`*/15`, `0-30/5`). Month and weekday fields also accept three-letter
//! names (`JAN`, `MON`) and weekday `7` as Sunday.

use crate::error::{ClientError, Result};
use crate::types::parse_utc_datetime;
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Minimum interval accepted for `interval` schedules
pub const MIN_INTERVAL_SECS: u64 = 10;

/// Schedule kind of a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    Cron,
    Interval,
    Once,
}

impl std::str::FromStr for ScheduleType {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cron" => Ok(Self::Cron),
            "interval" => Ok(Self::Interval),
            "once" => Ok(Self::Once),
            other => Err(ClientError::Validation(format!(
                "Invalid schedule_type: {}. Must be cron, interval, or once.",
                other
            ))),
        }
    }
}

/// A validated schedule
#[derive(Debug, Clone)]
pub enum Schedule {
    Cron(CronExpression),
    Interval(Duration),
    Once(DateTime<Utc>),
}

impl Schedule {
    /// Parse and validate a schedule value for the given type
    pub fn parse(schedule_type: ScheduleType, value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ClientError::Validation(
                "schedule_value must not be empty".to_string(),
            ));
        }

        match schedule_type {
            ScheduleType::Cron => CronExpression::parse(value).map(Self::Cron),
            ScheduleType::Interval => {
                let secs: u64 = value.parse().map_err(|_| {
                    ClientError::Validation("Interval must be an integer (seconds)".to_string())
                })?;
                if secs < MIN_INTERVAL_SECS {
                    return Err(ClientError::Validation(format!(
                        "Interval must be at least {} seconds",
                        MIN_INTERVAL_SECS
                    )));
                }
                i64::try_from(secs)
                    .ok()
                    .and_then(Duration::try_seconds)
                    .map(Self::Interval)
                    .ok_or_else(|| {
                        ClientError::Validation("Interval is too large".to_string())
                    })
            }
            ScheduleType::Once => parse_utc_datetime(value).map(Self::Once).ok_or_else(|| {
                ClientError::Validation("Invalid ISO datetime for once schedule".to_string())
            }),
        }
    }

    /// Next run strictly after `from`, if any remains
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron(expr) => expr.next_after(from),
            Self::Interval(every) => from.checked_add_signed(*every),
            Self::Once(at) => (*at > from).then_some(*at),
        }
    }
}

/// Validate a schedule given as raw strings
pub fn validate_schedule(schedule_type: &str, value: &str) -> Result<()> {
    Schedule::parse(schedule_type.parse()?, value).map(|_| ())
}

/// A parsed 5-field cron expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    source: String,
    minutes: BTreeSet<u32>,
    hours: BTreeSet<u32>,
    days: BTreeSet<u32>,
    months: BTreeSet<u32>,
    weekdays: BTreeSet<u32>,
    // Both day fields restricted: a date matches on either one
    day_or_weekday: bool,
}

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
}

const FIELDS: [FieldSpec; 5] = [
    FieldSpec { name: "minute", min: 0, max: 59, names: &[] },
    FieldSpec { name: "hour", min: 0, max: 23, names: &[] },
    FieldSpec { name: "day", min: 1, max: 31, names: &[] },
    FieldSpec { name: "month", min: 1, max: 12, names: &MONTH_NAMES },
    // 7 is accepted as an alias for Sunday and folded to 0 after parsing
    FieldSpec { name: "weekday", min: 0, max: 7, names: &WEEKDAY_NAMES },
];

impl CronExpression {
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(invalid(format!("Expected 5 fields, got {}", parts.len())));
        }

        let day_or_weekday = parts[2] != "*" && parts[4] != "*";

        let mut sets = Vec::with_capacity(5);
        for (part, spec) in parts.iter().zip(FIELDS.iter()) {
            sets.push(parse_field(part, spec)?);
        }

        let mut weekdays = sets.pop().unwrap_or_default();
        if weekdays.remove(&7) {
            weekdays.insert(0);
        }
        let months = sets.pop().unwrap_or_default();
        let days = sets.pop().unwrap_or_default();
        let hours = sets.pop().unwrap_or_default();
        let minutes = sets.pop().unwrap_or_default();

        Ok(Self {
            source: expression.trim().to_string(),
            minutes,
            hours,
            days,
            months,
            weekdays,
            day_or_weekday,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether a datetime falls on this schedule (minute resolution)
    pub fn matches(&self, dt: &DateTime<Utc>) -> bool {
        self.minutes.contains(&dt.minute())
            && self.hours.contains(&dt.hour())
            && self.months.contains(&dt.month())
            && self.day_matches(dt)
    }

    /// First matching minute strictly after `after`
    ///
    /// Searches up to four years ahead; impossible dates such as
    /// `0 0 31 2 *` yield `None`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after + Duration::minutes(1);
        let mut current = Utc
            .with_ymd_and_hms(
                start.year(),
                start.month(),
                start.day(),
                start.hour(),
                start.minute(),
                0,
            )
            .single()?;

        let limit = current + Duration::days(4 * 366);
        while current <= limit {
            if !self.months.contains(&current.month()) || !self.day_matches(&current) {
                current = next_midnight(current)?;
                continue;
            }
            if !self.hours.contains(&current.hour()) {
                current = next_hour(current)?;
                continue;
            }
            if self.minutes.contains(&current.minute()) {
                return Some(current);
            }
            current += Duration::minutes(1);
        }
        None
    }

    fn day_matches(&self, dt: &DateTime<Utc>) -> bool {
        let day = self.days.contains(&dt.day());
        let weekday = self.weekdays.contains(&dt.weekday().num_days_from_sunday());
        if self.day_or_weekday {
            day || weekday
        } else {
            day && weekday
        }
    }
}

impl std::fmt::Display for CronExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

fn next_midnight(dt: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let date = dt.date_naive().succ_opt()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

fn next_hour(dt: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let truncated = dt.with_minute(0)?;
    Some(truncated + Duration::hours(1))
}

fn invalid(reason: String) -> ClientError {
    ClientError::Validation(format!("Invalid cron expression: {}", reason))
}

fn parse_value(token: &str, spec: &FieldSpec) -> Result<u32> {
    if let Ok(v) = token.parse::<u32>() {
        return Ok(v);
    }
    let lower = token.to_ascii_lowercase();
    spec.names
        .iter()
        .position(|n| *n == lower)
        .map(|idx| idx as u32 + if spec.name == "month" { 1 } else { 0 })
        .ok_or_else(|| invalid(format!("Invalid value '{}' in {}", token, spec.name)))
}

fn parse_field(field: &str, spec: &FieldSpec) -> Result<BTreeSet<u32>> {
    let mut values = BTreeSet::new();

    for part in field.split(',') {
        if part.is_empty() {
            return Err(invalid(format!("Empty list item in {}", spec.name)));
        }

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| {
                    invalid(format!("Invalid step value '{}' in {}", step, spec.name))
                })?;
                if step == 0 {
                    return Err(invalid(format!("Step value cannot be 0 in {}", spec.name)));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            (parse_value(lo, spec)?, parse_value(hi, spec)?)
        } else {
            let v = parse_value(range, spec)?;
            // `5/15` means "from 5 to the end, every 15"
            if step > 1 {
                (v, spec.max)
            } else {
                (v, v)
            }
        };

        for v in [start, end] {
            if v < spec.min || v > spec.max {
                return Err(invalid(format!(
                    "Value {} out of range ({}-{}) in {}",
                    v, spec.min, spec.max, spec.name
                )));
            }
        }
        if start > end {
            return Err(invalid(format!(
                "Invalid range {}-{} in {}",
                start, end, spec.name
            )));
        }

        values.extend((start..=end).step_by(step as usize));
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_interval_validation() {
        assert!(validate_schedule("interval", "10").is_ok());
        assert!(validate_schedule("interval", "3600").is_ok());

        let err = validate_schedule("interval", "5").unwrap_err();
        assert!(err.to_string().contains("at least 10 seconds"));

        let err = validate_schedule("interval", "ten").unwrap_err();
        assert!(err.to_string().contains("must be an integer"));
    }

    #[test]
    fn test_interval_too_large() {
        let err = validate_schedule("interval", "99999999999999999").unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert!(validate_schedule("interval", "18446744073709551615").is_err());
    }

    #[test]
    fn test_interval_next_after_overflow() {
        let every = Schedule::parse(ScheduleType::Interval, "9000000000000").unwrap();
        assert!(every.next_after(at(2030, 1, 1, 0, 0)).is_none());
    }

    #[test]
    fn test_once_validation() {
        assert!(validate_schedule("once", "2030-01-15T09:30:00").is_ok());
        assert!(validate_schedule("once", "2030-01-15T09:30:00Z").is_ok());
        assert!(validate_schedule("once", "2030-01-15T09:30:00+08:00").is_ok());
        assert!(validate_schedule("once", "2030-01-15").is_ok());
        assert!(validate_schedule("once", "next tuesday").is_err());
    }

    #[test]
    fn test_unknown_schedule_type() {
        let err = validate_schedule("weekly", "1").unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert!(err.to_string().contains("Must be cron, interval, or once"));
    }

    #[test]
    fn test_empty_value() {
        assert!(validate_schedule("cron", "   ").is_err());
    }

    #[test]
    fn test_cron_validation() {
        assert!(validate_schedule("cron", "*/5 * * * *").is_ok());
        assert!(validate_schedule("cron", "30 2 * * MON-FRI").is_ok());
        assert!(validate_schedule("cron", "0 9 1 JAN,JUL *").is_ok());
        assert!(validate_schedule("cron", "* * * *").is_err());
        assert!(validate_schedule("cron", "60 * * * *").is_err());
        assert!(validate_schedule("cron", "*/0 * * * *").is_err());
        assert!(validate_schedule("cron", "5-1 * * * *").is_err());
        assert!(validate_schedule("cron", "1,,2 * * * *").is_err());
    }

    #[test]
    fn test_cron_weekday_seven_is_sunday() {
        let a = CronExpression::parse("0 0 * * 7").unwrap();
        let b = CronExpression::parse("0 0 * * 0").unwrap();
        assert_eq!(a.weekdays, b.weekdays);
    }

    #[test]
    fn test_cron_next_after() {
        let expr = CronExpression::parse("*/15 * * * *").unwrap();
        assert_eq!(expr.next_after(at(2030, 1, 1, 10, 7)), Some(at(2030, 1, 1, 10, 15)));
        assert_eq!(expr.next_after(at(2030, 1, 1, 10, 45)), Some(at(2030, 1, 1, 11, 0)));

        // 2030-01-07 is a Monday
        let expr = CronExpression::parse("0 9 * * 1").unwrap();
        assert_eq!(expr.next_after(at(2030, 1, 3, 12, 0)), Some(at(2030, 1, 7, 9, 0)));
    }

    #[test]
    fn test_cron_day_or_weekday() {
        // 1st of the month OR any Monday; 2030-01-07 is a Monday
        let expr = CronExpression::parse("0 0 1 * 1").unwrap();
        assert_eq!(expr.next_after(at(2030, 1, 2, 0, 0)), Some(at(2030, 1, 7, 0, 0)));
        assert_eq!(expr.next_after(at(2030, 1, 28, 0, 0)), Some(at(2030, 2, 1, 0, 0)));
        assert!(expr.matches(&at(2030, 1, 14, 0, 0)));

        // Only one day field restricted: plain intersection
        let expr = CronExpression::parse("0 0 * * 1").unwrap();
        assert!(!expr.matches(&at(2030, 2, 1, 0, 0)));
        let expr = CronExpression::parse("0 0 1 * *").unwrap();
        assert!(!expr.matches(&at(2030, 1, 7, 0, 0)));
    }

    #[test]
    fn test_cron_step_from_value() {
        let expr = CronExpression::parse("5/20 * * * *").unwrap();
        assert_eq!(
            expr.minutes.iter().copied().collect::<Vec<_>>(),
            vec![5, 25, 45]
        );
    }

    #[test]
    fn test_cron_impossible_date() {
        let expr = CronExpression::parse("0 0 31 2 *").unwrap();
        assert!(expr.next_after(at(2030, 1, 1, 0, 0)).is_none());
    }

    #[test]
    fn test_schedule_next_after() {
        let now = at(2030, 6, 1, 12, 0);

        let every = Schedule::parse(ScheduleType::Interval, "60").unwrap();
        assert_eq!(every.next_after(now), Some(at(2030, 6, 1, 12, 1)));

        let once = Schedule::parse(ScheduleType::Once, "2030-06-01T13:00:00").unwrap();
        assert_eq!(once.next_after(now), Some(at(2030, 6, 1, 13, 0)));

        let past = Schedule::parse(ScheduleType::Once, "2030-06-01T11:00:00").unwrap();
        assert!(past.next_after(now).is_none());
    }
}
