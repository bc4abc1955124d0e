//! Sampled date axes
//!
//! Builds ascending, duplicate-free sample dates over a version set. Fixed
//! scales anchor on calendar boundaries: days from the start, Sundays,
//! month ends, quarter ends and year ends.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, Weekday};

use super::range::DateRange;
use crate::errors::TimelineError;
use crate::model::{Timestamp, VersionRecord};

/// Sampling granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Auto,
    Maximum,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Scale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scale::Auto => "auto",
            Scale::Maximum => "maximum",
            Scale::Daily => "daily",
            Scale::Weekly => "weekly",
            Scale::Monthly => "monthly",
            Scale::Quarterly => "quarterly",
            Scale::Yearly => "yearly",
        }
    }
}

impl FromStr for Scale {
    type Err = TimelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Scale::Auto),
            "maximum" => Ok(Scale::Maximum),
            "daily" => Ok(Scale::Daily),
            "weekly" => Ok(Scale::Weekly),
            "monthly" => Ok(Scale::Monthly),
            "quarterly" => Ok(Scale::Quarterly),
            "yearly" => Ok(Scale::Yearly),
            other => Err(TimelineError::format(format!("Incorrect scale: {}", other))),
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Picks the coarsest-needed scale for `distinct` observed timestamps
/// spread over `[start, end]`.
///
/// `maximum` when the observed points already fit the target, otherwise
/// the first of daily, weekly, monthly, quarterly whose projected count
/// fits, else yearly.
pub fn auto_select(distinct: usize, start: Timestamp, end: Timestamp, target: usize) -> Scale {
    if distinct <= target {
        return Scale::Maximum;
    }
    let days = (end - start).num_days().max(0) as usize;
    if days <= target {
        Scale::Daily
    } else if days / 7 <= target {
        Scale::Weekly
    } else if days / 30 <= target {
        Scale::Monthly
    } else if days / 91 <= target {
        Scale::Quarterly
    } else {
        Scale::Yearly
    }
}

/// Builds the sample axis for `records`.
///
/// Without explicit bounds the axis runs from the earliest start to the
/// latest of (latest end, latest start). Both ends are clamped into
/// `range`. Returns an empty axis when there is nothing to sample.
pub fn sampled_axis(
    records: &[VersionRecord],
    range: &DateRange,
    scale: Scale,
    start: Option<Timestamp>,
    end: Option<Timestamp>,
    target: usize,
) -> Vec<Timestamp> {
    let start = match start.or_else(|| records.iter().map(VersionRecord::start).min()) {
        Some(s) => range.clamp(s),
        None => return Vec::new(),
    };
    let end = match end.or_else(|| default_end(records)) {
        Some(e) => range.clamp(e),
        None => return Vec::new(),
    };
    if start > end {
        return Vec::new();
    }

    let scale = match scale {
        Scale::Auto | Scale::Maximum => {
            let observed = observed_points(records, range, start, end);
            let chosen = if scale == Scale::Auto {
                auto_select(observed.len(), start, end, target)
            } else {
                Scale::Maximum
            };
            if chosen == Scale::Maximum {
                return observed;
            }
            chosen
        }
        fixed => fixed,
    };

    let mut points = BTreeSet::new();
    points.insert(start);
    points.extend(periodic_points(scale, start, end));
    points.insert(end);
    points.into_iter().filter(|p| range.contains(*p)).collect()
}

fn default_end(records: &[VersionRecord]) -> Option<Timestamp> {
    let max_end = records.iter().filter_map(VersionRecord::end).max();
    let max_start = records.iter().map(VersionRecord::start).max();
    max_end.max(max_start)
}

/// Distinct starts and bounded ends within `[start, end]` and `range`.
fn observed_points(
    records: &[VersionRecord],
    range: &DateRange,
    start: Timestamp,
    end: Timestamp,
) -> Vec<Timestamp> {
    records
        .iter()
        .flat_map(|r| std::iter::once(r.start()).chain(r.end()))
        .filter(|t| *t >= start && *t <= end && range.contains(*t))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Calendar points strictly after `start` (on the anchored grid) up to `end`.
fn periodic_points(scale: Scale, start: Timestamp, end: Timestamp) -> Vec<Timestamp> {
    match scale {
        Scale::Daily => stepped(start + Duration::days(1), end, Duration::days(1)),
        Scale::Weekly => {
            let mut first = start + Duration::days(7);
            while first.weekday() != Weekday::Sun {
                first += Duration::days(1);
            }
            stepped(first, end, Duration::days(7))
        }
        Scale::Monthly => period_ends(start, end, 1),
        Scale::Quarterly => period_ends(start, end, 3),
        Scale::Yearly => period_ends(start, end, 12),
        Scale::Auto | Scale::Maximum => Vec::new(),
    }
}

fn stepped(first: Timestamp, end: Timestamp, step: Duration) -> Vec<Timestamp> {
    let mut out = Vec::new();
    let mut t = first;
    while t <= end {
        out.push(t);
        t += step;
    }
    out
}

/// Month ends whose month is a multiple of `every`, keeping the time of day
/// of `start`.
fn period_ends(start: Timestamp, end: Timestamp, every: u32) -> Vec<Timestamp> {
    let time_of_day = start.time();
    let start_date = start.date_naive();
    let (mut year, mut month) = (start_date.year(), start_date.month());
    let mut out = Vec::new();

    loop {
        let Some(last_day) = month_end(year, month) else {
            break;
        };
        let point = last_day.and_time(time_of_day).and_utc();
        if point > end {
            break;
        }
        if month % every == 0 && last_day > start_date {
            out.push(point);
        }
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    out
}

fn month_end(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldMap, Oid};
    use chrono::{TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> Timestamp {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn record(oid: i64, start: Timestamp, end: Option<Timestamp>) -> VersionRecord {
        VersionRecord::new(
            format!("{}-{}", oid, start.timestamp()),
            Oid::Int(oid),
            "h",
            start,
            end,
            0,
            FieldMap::new(),
        )
    }

    #[test]
    fn test_scale_parse() {
        assert_eq!("weekly".parse::<Scale>().unwrap(), Scale::Weekly);
        let err = "hourly".parse::<Scale>().unwrap_err();
        assert_eq!(err.code().code(), "TL_FORMAT_INVALID");
    }

    #[test]
    fn test_auto_select_thresholds() {
        let start = date(2020, 1, 1);
        assert_eq!(auto_select(300, start, start + Duration::days(5000), 300), Scale::Maximum);
        assert_eq!(auto_select(301, start, start + Duration::days(300), 300), Scale::Daily);
        assert_eq!(auto_select(301, start, start + Duration::days(1000), 300), Scale::Weekly);
        assert_eq!(auto_select(301, start, start + Duration::days(9000), 300), Scale::Monthly);
        assert_eq!(auto_select(301, start, start + Duration::days(27_000), 300), Scale::Quarterly);
        assert_eq!(auto_select(301, start, start + Duration::days(40_000), 300), Scale::Yearly);
    }

    #[test]
    fn test_maximum_axis_uses_observed_points() {
        let records = vec![
            record(1, date(2024, 1, 1), Some(date(2024, 1, 5))),
            record(1, date(2024, 1, 5), None),
            record(2, date(2024, 1, 3), None),
        ];
        let axis = sampled_axis(&records, &DateRange::all_time(), Scale::Auto, None, None, 300);
        assert_eq!(axis, vec![date(2024, 1, 1), date(2024, 1, 3), date(2024, 1, 5)]);
    }

    #[test]
    fn test_daily_axis_includes_both_ends() {
        let records = vec![record(1, date(2024, 1, 1), Some(date(2024, 1, 4)))];
        let axis = sampled_axis(&records, &DateRange::all_time(), Scale::Daily, None, None, 300);
        assert_eq!(
            axis,
            vec![date(2024, 1, 1), date(2024, 1, 2), date(2024, 1, 3), date(2024, 1, 4)]
        );
    }

    #[test]
    fn test_monthly_axis_anchors_on_month_ends() {
        let axis = sampled_axis(
            &[],
            &DateRange::all_time(),
            Scale::Monthly,
            Some(date(2024, 1, 31)),
            Some(date(2024, 4, 10)),
            300,
        );
        assert_eq!(
            axis,
            vec![
                date(2024, 1, 31),
                date(2024, 2, 29),
                date(2024, 3, 31),
                date(2024, 4, 10)
            ]
        );
    }

    #[test]
    fn test_quarterly_and_yearly_axis() {
        let quarterly = periodic_points(Scale::Quarterly, date(2023, 2, 10), date(2023, 12, 31));
        assert_eq!(
            quarterly,
            vec![date(2023, 3, 31), date(2023, 6, 30), date(2023, 9, 30), date(2023, 12, 31)]
        );
        let yearly = periodic_points(Scale::Yearly, date(2021, 12, 31), date(2023, 6, 1));
        assert_eq!(yearly, vec![date(2022, 12, 31)]);
    }

    #[test]
    fn test_weekly_axis_lands_on_sundays() {
        let points = periodic_points(Scale::Weekly, date(2024, 1, 1), date(2024, 1, 31));
        assert!(points.iter().all(|p| p.weekday() == Weekday::Sun));
        assert_eq!(points.first(), Some(&date(2024, 1, 14)));
    }

    #[test]
    fn test_axis_clamped_to_range() {
        let records = vec![record(1, date(2024, 1, 1), Some(date(2024, 1, 10)))];
        let range = DateRange::parse(Some("2024-01-03~2024-01-05")).unwrap();
        let axis = sampled_axis(&records, &range, Scale::Daily, None, None, 300);
        assert_eq!(axis, vec![date(2024, 1, 3), date(2024, 1, 4), date(2024, 1, 5)]);
    }

    #[test]
    fn test_empty_records_empty_axis() {
        assert!(sampled_axis(&[], &DateRange::all_time(), Scale::Auto, None, None, 300).is_empty());
    }
}
