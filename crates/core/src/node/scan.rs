//! Raw event table scans.
//!
//! A scan is the only node that touches backing event data directly. It
//! selects a window of rows between two timestamps, optionally filtered
//! to certain hours of the day and to a fixed subscriber subset, and
//! aliases the configured subscriber identifier column to `subscriber`
//! so every downstream node sees a uniform name.

use chrono::NaiveDateTime;
use serde_json::json;

use eventide_error::{ErrorCode, EventideError, Result};

use crate::sanitize::{quote_literal, validate_identifier, validate_table_name};

pub const DEFAULT_SUBSCRIBER_IDENTIFIER: &str = "msisdn";

#[derive(Debug, Clone)]
pub struct ScanParams {
    pub table: String,
    pub start: NaiveDateTime,
    /// Exclusive upper bound.
    pub stop: NaiveDateTime,
    /// Inclusive-from, exclusive-to hour-of-day filter. May wrap
    /// midnight, e.g. `(22, 4)`.
    pub hours: Option<(u8, u8)>,
    /// Column in the backing table that identifies a subscriber.
    pub subscriber_identifier: String,
    /// Sorted, deduplicated subscriber whitelist.
    pub subscriber_subset: Option<Vec<String>>,
    /// Columns pulled from the backing table, in output order.
    pub columns: Vec<String>,
}

impl ScanParams {
    pub fn new(
        table: impl Into<String>,
        start: NaiveDateTime,
        stop: NaiveDateTime,
        columns: Vec<String>,
    ) -> Result<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        if start >= stop {
            return Err(EventideError::new(
                ErrorCode::InvalidParameter,
                format!("Scan window start '{}' is not before stop '{}'", start, stop),
            )
            .with_hint("The stop timestamp is exclusive and must be after start"));
        }
        if columns.is_empty() {
            return Err(EventideError::new(
                ErrorCode::InvalidParameter,
                "Scan must select at least one column",
            ));
        }
        for column in &columns {
            validate_identifier(column)?;
        }
        Ok(Self {
            table,
            start,
            stop,
            hours: None,
            subscriber_identifier: DEFAULT_SUBSCRIBER_IDENTIFIER.to_string(),
            subscriber_subset: None,
            columns,
        })
    }

    pub fn with_hours(mut self, from: u8, to: u8) -> Result<Self> {
        if from > 23 || to > 23 || from == to {
            return Err(EventideError::new(
                ErrorCode::InvalidParameter,
                format!("Hour window ({}, {}) is not valid", from, to),
            )
            .with_hint("Hours run 0..=23; the window is from-inclusive, to-exclusive"));
        }
        self.hours = Some((from, to));
        Ok(self)
    }

    pub fn with_subscriber_identifier(mut self, identifier: impl Into<String>) -> Result<Self> {
        let identifier = identifier.into();
        validate_identifier(&identifier)?;
        self.subscriber_identifier = identifier;
        Ok(self)
    }

    /// Restrict the scan to a fixed set of subscribers. The set is
    /// sorted and deduplicated here so permutations of the same subset
    /// fingerprint identically.
    pub fn with_subscriber_subset(mut self, mut subset: Vec<String>) -> Result<Self> {
        if subset.is_empty() {
            return Err(EventideError::new(
                ErrorCode::EmptySubscriberSet,
                "Subscriber subset must not be empty",
            )
            .with_hint("Omit the subset entirely to include all subscribers"));
        }
        subset.sort();
        subset.dedup();
        self.subscriber_subset = Some(subset);
        Ok(self)
    }

    /// Output columns, with the subscriber identifier renamed to its
    /// uniform downstream alias.
    pub fn output_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| {
                if *c == self.subscriber_identifier {
                    "subscriber".to_string()
                } else {
                    c.clone()
                }
            })
            .collect()
    }

    pub(crate) fn canonical_params(&self) -> serde_json::Value {
        json!({
            "table": self.table,
            "start": self.start.to_string(),
            "stop": self.stop.to_string(),
            "hours": self.hours,
            "subscriber_identifier": self.subscriber_identifier,
            "subscriber_subset": self.subscriber_subset,
            "columns": self.columns,
        })
    }

    pub(crate) fn render(&self) -> String {
        let select: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                if *c == self.subscriber_identifier {
                    format!("{} AS subscriber", c)
                } else {
                    c.clone()
                }
            })
            .collect();
        let mut sql = format!(
            "SELECT {} FROM {} WHERE datetime >= '{}' AND datetime < '{}'",
            select.join(", "),
            self.table,
            self.start,
            self.stop
        );
        if let Some((from, to)) = self.hours {
            if from < to {
                sql.push_str(&format!(
                    " AND EXTRACT(hour FROM datetime) >= {} AND EXTRACT(hour FROM datetime) < {}",
                    from, to
                ));
            } else {
                // Window wraps midnight.
                sql.push_str(&format!(
                    " AND (EXTRACT(hour FROM datetime) >= {} OR EXTRACT(hour FROM datetime) < {})",
                    from, to
                ));
            }
        }
        if let Some(subset) = &self.subscriber_subset {
            let literals: Vec<String> = subset.iter().map(|s| quote_literal(s)).collect();
            sql.push_str(&format!(
                " AND {} IN ({})",
                self.subscriber_identifier,
                literals.join(", ")
            ));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn window() -> (NaiveDateTime, NaiveDateTime) {
        (
            NaiveDate::from_ymd_opt(2016, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            NaiveDate::from_ymd_opt(2016, 1, 8)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        )
    }

    fn cols() -> Vec<String> {
        vec![
            "msisdn".to_string(),
            "datetime".to_string(),
            "location_id".to_string(),
        ]
    }

    #[test]
    fn renders_window_and_alias() {
        let (start, stop) = window();
        let scan = ScanParams::new("events", start, stop, cols()).unwrap();
        assert_eq!(
            scan.render(),
            "SELECT msisdn AS subscriber, datetime, location_id FROM events \
             WHERE datetime >= '2016-01-01 00:00:00' AND datetime < '2016-01-08 00:00:00'"
        );
        assert_eq!(
            scan.output_columns(),
            vec!["subscriber", "datetime", "location_id"]
        );
    }

    #[test]
    fn renders_subset_and_hours() {
        let (start, stop) = window();
        let scan = ScanParams::new("events", start, stop, cols())
            .unwrap()
            .with_hours(9, 17)
            .unwrap()
            .with_subscriber_subset(vec!["b".to_string(), "a".to_string()])
            .unwrap();
        let sql = scan.render();
        assert!(sql.contains("EXTRACT(hour FROM datetime) >= 9"));
        assert!(sql.contains("EXTRACT(hour FROM datetime) < 17"));
        assert!(sql.ends_with("AND msisdn IN ('a', 'b')"));
    }

    #[test]
    fn wrapping_hours_use_disjunction() {
        let (start, stop) = window();
        let scan = ScanParams::new("events", start, stop, cols())
            .unwrap()
            .with_hours(22, 4)
            .unwrap();
        assert!(scan
            .render()
            .contains("(EXTRACT(hour FROM datetime) >= 22 OR EXTRACT(hour FROM datetime) < 4)"));
    }

    #[test]
    fn subset_is_sorted_and_deduplicated() {
        let (start, stop) = window();
        let scan = ScanParams::new("events", start, stop, cols())
            .unwrap()
            .with_subscriber_subset(vec![
                "c".to_string(),
                "a".to_string(),
                "c".to_string(),
                "b".to_string(),
            ])
            .unwrap();
        assert_eq!(
            scan.subscriber_subset.as_deref().unwrap(),
            &["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn rejects_bad_windows_and_subsets() {
        let (start, stop) = window();
        assert_eq!(
            ScanParams::new("events", stop, start, cols())
                .unwrap_err()
                .code,
            ErrorCode::InvalidParameter
        );
        assert_eq!(
            ScanParams::new("events", start, stop, cols())
                .unwrap()
                .with_subscriber_subset(vec![])
                .unwrap_err()
                .code,
            ErrorCode::EmptySubscriberSet
        );
        assert!(ScanParams::new("events", start, stop, vec![]).is_err());
        assert!(ScanParams::new("bad;table", start, stop, cols()).is_err());
    }
}
