//! Calendar-date availability checks for scans.
//!
//! Backing event tables are loaded a day at a time, so a scan window may
//! straddle days that have no data yet. If none of the requested days
//! are present the query is refused outright; a partial gap is only
//! logged, since a half-loaded week is routine during ingestion.

use chrono::{NaiveDate, Timelike};
use tracing::warn;

use eventide_error::{ErrorCode, ErrorContext, EventideError, Result};

use crate::node::scan::ScanParams;

/// Calendar dates a scan window touches. A stop timestamp at exactly
/// midnight does not reach into its own day.
pub fn requested_dates(scan: &ScanParams) -> Vec<NaiveDate> {
    let last = if scan.stop.time().num_seconds_from_midnight() == 0 {
        scan.stop.date().pred_opt()
    } else {
        Some(scan.stop.date())
    };
    let Some(last) = last else {
        return Vec::new();
    };
    let mut dates = Vec::new();
    let mut day = scan.start.date();
    while day <= last {
        dates.push(day);
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    dates
}

/// Check a scan's window against the dates actually present in its
/// backing table.
pub fn check_dates(scan: &ScanParams, available: &[NaiveDate]) -> Result<()> {
    let requested = requested_dates(scan);
    let present: Vec<NaiveDate> = requested
        .iter()
        .copied()
        .filter(|d| available.contains(d))
        .collect();

    if present.is_empty() {
        return Err(EventideError::new(
            ErrorCode::MissingDates,
            format!(
                "None of the {} requested calendar dates are present in '{}'",
                requested.len(),
                scan.table
            ),
        )
        .with_context(ErrorContext::MissingDates {
            table: scan.table.clone(),
            requested: requested.len(),
            present: 0,
            earliest_present: None,
            latest_present: None,
        })
        .with_hint("Check that data for the window has been loaded"));
    }

    if present.len() < requested.len() {
        warn!(
            table = %scan.table,
            requested = requested.len(),
            present = present.len(),
            earliest_present = %present[0],
            latest_present = %present[present.len() - 1],
            "scan window has missing calendar dates"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2016, 1, d).unwrap()
    }

    fn scan(start_day: u32, stop_day: u32, stop_hour: u32) -> ScanParams {
        ScanParams::new(
            "events",
            day(start_day).and_hms_opt(0, 0, 0).unwrap(),
            day(stop_day).and_hms_opt(stop_hour, 0, 0).unwrap(),
            vec!["msisdn".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn midnight_stop_excludes_its_day() {
        let dates = requested_dates(&scan(1, 8, 0));
        assert_eq!(dates.len(), 7);
        assert_eq!(*dates.last().unwrap(), day(7));
    }

    #[test]
    fn non_midnight_stop_includes_its_day() {
        let dates = requested_dates(&scan(1, 8, 12));
        assert_eq!(dates.len(), 8);
        assert_eq!(*dates.last().unwrap(), day(8));
    }

    #[test]
    fn all_dates_missing_is_fatal() {
        let err = check_dates(&scan(1, 8, 0), &[day(20), day(21)]).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingDates);
    }

    #[test]
    fn partial_gap_is_permitted() {
        assert!(check_dates(&scan(1, 8, 0), &[day(1), day(2), day(3)]).is_ok());
    }

    #[test]
    fn full_coverage_is_permitted() {
        let available: Vec<NaiveDate> = (1..=7).map(day).collect();
        assert!(check_dates(&scan(1, 8, 0), &available).is_ok());
    }
}
