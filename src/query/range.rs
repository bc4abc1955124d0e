//! Date-range tokens
//!
//! | token    | meaning                                  |
//! |----------|------------------------------------------|
//! | absent   | current versions only                    |
//! | `""` `~` | all time                                 |
//! | `d`      | versions alive at `d`                    |
//! | `~d`     | versions started at or before `d`        |
//! | `d~`     | versions still alive after `d`           |
//! | `d1~d2`  | versions alive at some point in `[d1,d2]`|

use std::fmt;

use chrono::SecondsFormat;

use crate::errors::{TimelineError, TimelineResult};
use crate::model::{parse_timestamp, Timestamp};
use crate::port::ScanFilter;

const SEPARATOR: char = '~';

/// A parsed date-range token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRange {
    /// Only open versions; no bounds
    Current,
    /// Inclusive window, each side optionally open
    Window {
        lower: Option<Timestamp>,
        upper: Option<Timestamp>,
    },
}

impl Default for DateRange {
    fn default() -> Self {
        DateRange::Current
    }
}

impl DateRange {
    /// Everything ever stored.
    pub fn all_time() -> Self {
        DateRange::Window {
            lower: None,
            upper: None,
        }
    }

    /// A single instant.
    pub fn at(date: Timestamp) -> Self {
        DateRange::Window {
            lower: Some(date),
            upper: Some(date),
        }
    }

    /// Parses an optional token.
    ///
    /// # Errors
    ///
    /// `TL_FORMAT_INVALID` for more than one `~`, an unparsable date, or a
    /// window whose left side is after its right side.
    pub fn parse(token: Option<&str>) -> TimelineResult<Self> {
        let token = match token {
            None => return Ok(DateRange::Current),
            Some(t) => t.trim(),
        };
        if token.is_empty() {
            return Ok(Self::all_time());
        }

        let parts: Vec<&str> = token.split(SEPARATOR).collect();
        let (lower, upper) = match parts.as_slice() {
            [point] => {
                let date = parse_timestamp(point)?;
                (Some(date), Some(date))
            }
            [left, right] => (parse_side(left)?, parse_side(right)?),
            _ => {
                return Err(TimelineError::format(format!(
                    "date {} is not in the correct format",
                    token
                )))
            }
        };

        if let (Some(l), Some(u)) = (lower, upper) {
            if l > u {
                return Err(TimelineError::format(format!(
                    "date range {} starts after it ends",
                    token
                )));
            }
        }
        Ok(DateRange::Window { lower, upper })
    }

    /// Left bound, if any
    pub fn lbound(&self) -> Option<Timestamp> {
        match self {
            DateRange::Current => None,
            DateRange::Window { lower, .. } => *lower,
        }
    }

    /// Right bound, if any
    pub fn rbound(&self) -> Option<Timestamp> {
        match self {
            DateRange::Current => None,
            DateRange::Window { upper, .. } => *upper,
        }
    }

    pub fn is_current(&self) -> bool {
        matches!(self, DateRange::Current)
    }

    /// Returns true if `date` lies within both bounds (inclusive).
    pub fn contains(&self, date: Timestamp) -> bool {
        self.lbound().map_or(true, |l| date >= l) && self.rbound().map_or(true, |u| date <= u)
    }

    /// Fails with `TL_OUT_OF_RANGE` unless `date` lies within the bounds.
    pub fn check(&self, date: Timestamp) -> TimelineResult<()> {
        if self.contains(date) {
            Ok(())
        } else {
            Err(TimelineError::out_of_range(format_date(date)))
        }
    }

    /// Clamps `date` into the bounds.
    pub fn clamp(&self, date: Timestamp) -> Timestamp {
        let date = self.lbound().map_or(date, |l| date.max(l));
        self.rbound().map_or(date, |u| date.min(u))
    }

    /// Backend scan selecting the rows this range covers.
    pub fn scan_filter(&self) -> ScanFilter {
        match self {
            DateRange::Current => ScanFilter::current(),
            DateRange::Window { lower, upper } => ScanFilter {
                started_by: *upper,
                alive_after: *lower,
                ..ScanFilter::default()
            },
        }
    }
}

fn parse_side(side: &str) -> TimelineResult<Option<Timestamp>> {
    if side.trim().is_empty() {
        Ok(None)
    } else {
        parse_timestamp(side).map(Some)
    }
}

fn format_date(date: Timestamp) -> String {
    date.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateRange::Current => write!(f, "current"),
            DateRange::Window { lower, upper } if lower == upper && lower.is_some() => {
                write!(f, "{}", lower.map(format_date).unwrap_or_default())
            }
            DateRange::Window { lower, upper } => write!(
                f,
                "{}~{}",
                lower.map(format_date).unwrap_or_default(),
                upper.map(format_date).unwrap_or_default()
            ),
        }
    }
}
