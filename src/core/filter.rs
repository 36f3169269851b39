//! The per-file predicate applied by the scanner.

use super::ScanCriteria;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime};

/// Returns `true` if a file with the given name, size and modification time
/// satisfies every bound in `criteria`.
///
/// Date bounds are compared against local midnight of the given day, on both
/// ends. A file modified during the afternoon of `end_date` is therefore
/// outside the range.
pub fn matches(
    file_name: &str,
    size_bytes: u64,
    modified_time: &DateTime<Local>,
    criteria: &ScanCriteria,
) -> bool {
    matches_extension(file_name, criteria.extension_filter.as_deref())
        && matches_size(size_bytes, criteria.min_size, criteria.max_size)
        && matches_date(modified_time, criteria.start_date, criteria.end_date)
}

fn matches_extension(file_name: &str, extension_filter: Option<&str>) -> bool {
    extension_filter.map_or(true, |suffix| file_name.ends_with(suffix))
}

fn matches_size(size_bytes: u64, min_size: Option<u64>, max_size: Option<u64>) -> bool {
    size_bytes >= min_size.unwrap_or(0) && max_size.map_or(true, |max| size_bytes <= max)
}

fn matches_date(
    modified_time: &DateTime<Local>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> bool {
    // Naive comparison sidesteps midnights that fall into a DST gap.
    let modified = modified_time.naive_local();
    start_date.map_or(true, |start| modified >= midnight(start))
        && end_date.map_or(true, |end| modified <= midnight(end))
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}
