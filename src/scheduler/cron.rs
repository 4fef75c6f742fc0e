//! Cron expression parsing and evaluation.
//!
//! Supports the standard five-field format `minute hour day month weekday`,
//! an optional trailing seconds field (`minute hour day month weekday second`,
//! the layout the ingestion clients already emit), and `L` in the day-of-month
//! position for the last day of the month.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};

/// Iteration cap for the 24-hour fire count. Pathological expressions return
/// the partial count instead of looping.
pub const FIRE_COUNT_ITERATION_CAP: usize = 2000;

/// Search horizon for the next occurrence, in minutes (366 days).
const NEXT_OCCURRENCE_HORIZON_MINUTES: i64 = 366 * 24 * 60;

/// A parsed cron expression.
#[derive(Debug, Clone)]
pub struct CronExpression {
    /// Second (0-59), present only in six-field form.
    second: Option<CronField>,
    /// Minute (0-59).
    minute: CronField,
    /// Hour (0-23).
    hour: CronField,
    /// Day of month (1-31), or `L` for the last day.
    day: CronField,
    /// Month (1-12).
    month: CronField,
    /// Day of week (0-6, Sunday = 0).
    weekday: CronField,
}

/// A single field in a cron expression.
#[derive(Debug, Clone)]
enum CronField {
    /// Wildcard (*) - matches all values.
    Any,
    /// Specific value.
    Value(u32),
    /// List of values (e.g., 1,3,5).
    List(Vec<u32>),
    /// Range (e.g., 1-5).
    Range(u32, u32),
    /// Step (e.g., */5).
    Step(u32),
    /// Last day of the month (day field only).
    LastDay,
}

impl CronField {
    /// Check if the field matches the given value.
    fn matches(&self, value: u32) -> bool {
        match self {
            Self::Any => true,
            Self::Value(v) => *v == value,
            Self::List(values) => values.contains(&value),
            Self::Range(start, end) => value >= *start && value <= *end,
            Self::Step(step) => value % step == 0,
            Self::LastDay => false, // resolved against the calendar, not here
        }
    }
}

/// Cron expression parser.
#[derive(Debug)]
pub struct CronParser;

impl CronParser {
    /// Parse a cron expression string.
    ///
    /// # Format
    ///
    /// `minute hour day month weekday [second]`
    ///
    /// # Examples
    ///
    /// - `0 0 * * *` - Daily at midnight
    /// - `*/5 * * * *` - Every 5 minutes
    /// - `0 12 L * *` - Noon on the last day of each month
    /// - `* * * * * */30` - Every 30 seconds
    ///
    /// # Errors
    ///
    /// Returns an error if the expression is invalid.
    pub fn parse(expr: &str) -> Result<CronExpression> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        if parts.len() != 5 && parts.len() != 6 {
            anyhow::bail!("Cron expression must have 5 or 6 fields: {}", expr);
        }

        let second = if parts.len() == 6 {
            Some(Self::parse_field(parts[5], 0, 59).context("Invalid second field")?)
        } else {
            None
        };

        Ok(CronExpression {
            second,
            minute: Self::parse_field(parts[0], 0, 59).context("Invalid minute field")?,
            hour: Self::parse_field(parts[1], 0, 23).context("Invalid hour field")?,
            day: Self::parse_day_field(parts[2]).context("Invalid day field")?,
            month: Self::parse_field(parts[3], 1, 12).context("Invalid month field")?,
            weekday: Self::parse_field(parts[4], 0, 6).context("Invalid weekday field")?,
        })
    }

    fn parse_day_field(field: &str) -> Result<CronField> {
        if field.eq_ignore_ascii_case("l") {
            return Ok(CronField::LastDay);
        }
        Self::parse_field(field, 1, 31)
    }

    fn parse_field(field: &str, min: u32, max: u32) -> Result<CronField> {
        // Wildcard
        if field == "*" {
            return Ok(CronField::Any);
        }

        // Step (*/n)
        if let Some(step_str) = field.strip_prefix("*/") {
            let step: u32 = step_str.parse().context("Invalid step value")?;
            if step == 0 || step > max {
                anyhow::bail!("Step value must be 1-{}", max);
            }
            return Ok(CronField::Step(step));
        }

        // Range (n-m)
        if field.contains('-') {
            let range_parts: Vec<&str> = field.split('-').collect();
            if range_parts.len() != 2 {
                anyhow::bail!("Invalid range format: {}", field);
            }
            let start: u32 = range_parts[0].parse().context("Invalid range start")?;
            let end: u32 = range_parts[1].parse().context("Invalid range end")?;
            if start < min || start > max || end < min || end > max || start > end {
                anyhow::bail!("Range values must be {}-{} with start <= end", min, max);
            }
            return Ok(CronField::Range(start, end));
        }

        // List (n,m,...)
        if field.contains(',') {
            let values: Result<Vec<u32>> = field
                .split(',')
                .map(|v| {
                    let num: u32 = v.parse().context("Invalid list value")?;
                    if num < min || num > max {
                        anyhow::bail!("Value must be {}-{}", min, max);
                    }
                    Ok(num)
                })
                .collect();
            return Ok(CronField::List(values?));
        }

        // Single value
        let value: u32 = field.parse().context("Invalid numeric value")?;
        if value < min || value > max {
            anyhow::bail!("Value must be {}-{}", min, max);
        }
        Ok(CronField::Value(value))
    }
}

impl CronExpression {
    /// Check if the date and minute-of-day components match the given time.
    /// Seconds are handled separately by [`Self::next_after`].
    fn matches_minute(&self, time: &DateTime<Utc>) -> bool {
        self.minute.matches(time.minute())
            && self.hour.matches(time.hour())
            && self.day_matches(time)
            && self.month.matches(time.month())
            && self.weekday.matches(time.weekday().num_days_from_sunday())
    }

    fn day_matches(&self, time: &DateTime<Utc>) -> bool {
        match self.day {
            CronField::LastDay => time.day() == last_day_of_month(time.year(), time.month()),
            ref field => field.matches(time.day()),
        }
    }

    /// Seconds within a matching minute at which the expression fires.
    /// Five-field expressions fire at second zero.
    fn matching_seconds(&self) -> Vec<u32> {
        match &self.second {
            None => vec![0],
            Some(field) => (0..60).filter(|s| field.matches(*s)).collect(),
        }
    }

    /// Calculate the next occurrence strictly after the given time.
    ///
    /// Scans minute-by-minute up to 366 days ahead; returns `None` for
    /// expressions with no occurrence in that window.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        let seconds = self.matching_seconds();
        // Start at the current minute: a later second within it may still
        // be strictly after `after`.
        let mut minute = after
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(*after);

        for _ in 0..NEXT_OCCURRENCE_HORIZON_MINUTES {
            if self.matches_minute(&minute) {
                for &s in &seconds {
                    if let Some(candidate) = minute.with_second(s) {
                        if candidate > *after {
                            return Some(candidate);
                        }
                    }
                }
            }
            minute += Duration::minutes(1);
        }
        None
    }

    /// Count occurrences in the 24 hours following `reference`.
    ///
    /// Iteration is capped at [`FIRE_COUNT_ITERATION_CAP`]; on hitting the
    /// cap the partial count is returned rather than hanging.
    pub fn fires_within_24h(&self, reference: &DateTime<Utc>) -> usize {
        let end = *reference + Duration::hours(24);
        let mut count = 0;
        let mut cursor = *reference;

        while count < FIRE_COUNT_ITERATION_CAP {
            match self.next_after(&cursor) {
                Some(next) if next <= end => {
                    count += 1;
                    cursor = next;
                }
                _ => break,
            }
        }
        count
    }

    /// Seconds between the first two occurrences after `reference`, when
    /// both exist.
    pub fn first_gap_seconds(&self, reference: &DateTime<Utc>) -> Option<i64> {
        let first = self.next_after(reference)?;
        let second = self.next_after(&first)?;
        Some((second - first).num_seconds())
    }
}

/// Last day number of the given month.
fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map_or(28, |d| d.day())
}
