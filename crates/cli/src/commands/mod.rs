//! CLI command implementations

pub mod model;
pub mod sample;
pub mod score;
pub mod train;

use crate::RangeArgs;
use anyhow::Result;
use chrono::{Local, NaiveDate};
use hostwatch_lib::DateRange;

// The store prefilters on timestamp text, so open bounds stay within
// four-digit years
fn earliest_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn latest_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(9999, 12, 30).unwrap_or(NaiveDate::MAX)
}

/// Turn optional day bounds into a store query range.
///
/// Days are taken in the host's local time zone. A missing bound leaves
/// that side of the range open.
pub fn date_range(args: &RangeArgs) -> Result<Option<DateRange>> {
    if args.start.is_none() && args.end.is_none() {
        return Ok(None);
    }

    let start = args.start.unwrap_or_else(earliest_day);
    let end = args.end.unwrap_or_else(latest_day);
    if start > end {
        anyhow::bail!("--start {} is after --end {}", start, end);
    }

    Ok(Some(DateRange::from_days_in(start, end, &Local)))
}
