use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::filters::subset::SubsetOptions;
use crate::filters::timerange::TimeFilterStats;
use crate::filters::trips::trip_bounds;
use crate::table::TableStore;
use crate::time::{GtfsTime, format_gtfs_date};

/// One row of the run report: what a subset run did to one feed.
#[derive(Debug, Default, Serialize)]
pub struct SubsetStats {
    pub timestamp: DateTime<Utc>,
    pub feed: String,

    // requested window
    pub date_start: Option<String>,
    pub date_end: Option<String>,
    pub time_start: Option<String>,
    pub time_end: Option<String>,
    pub trim_trips: bool,
    pub remove_exception_calendars: bool,

    // row counts
    pub trips_before: usize,
    pub trips_after: usize,
    pub stop_times_before: usize,
    pub stop_times_after: usize,
    pub frequencies_before: usize,
    pub frequencies_after: usize,
    pub stops_before: usize,
    pub stops_after: usize,
    pub routes_before: usize,
    pub routes_after: usize,
    pub calendar_before: usize,
    pub calendar_after: usize,
    pub calendar_dates_before: usize,
    pub calendar_dates_after: usize,

    // repeating trips
    pub materialized_trips: usize,
    pub split_templates: usize,
    pub dropped_templates: usize,

    // error tracking
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

impl SubsetStats {
    pub fn new(feed: &str, options: &SubsetOptions) -> Self {
        SubsetStats {
            timestamp: Utc::now(),
            feed: feed.to_string(),
            date_start: options.date_range.map(|r| format_gtfs_date(r.start)),
            date_end: options.date_range.map(|r| format_gtfs_date(r.end)),
            time_start: options.time_range.map(|r| r.start.to_string()),
            time_end: options.time_range.map(|r| r.end.to_string()),
            trim_trips: options.trim_trips,
            remove_exception_calendars: options.remove_exception_calendars,
            ..Default::default()
        }
    }

    /// Captures row counts of the loaded feed.
    pub fn record_before(&mut self, store: &TableStore) {
        self.trips_before = store.row_count("trips");
        self.stop_times_before = store.row_count("stop_times");
        self.frequencies_before = store.row_count("frequencies");
        self.stops_before = store.row_count("stops");
        self.routes_before = store.row_count("routes");
        self.calendar_before = store.row_count("calendar");
        self.calendar_dates_before = store.row_count("calendar_dates");
    }

    /// Captures row counts of the reduced feed.
    pub fn record_after(&mut self, store: &TableStore, time: TimeFilterStats) {
        self.trips_after = store.row_count("trips");
        self.stop_times_after = store.row_count("stop_times");
        self.frequencies_after = store.row_count("frequencies");
        self.stops_after = store.row_count("stops");
        self.routes_after = store.row_count("routes");
        self.calendar_after = store.row_count("calendar");
        self.calendar_dates_after = store.row_count("calendar_dates");
        self.materialized_trips = time.materialized_trips;
        self.split_templates = time.split_templates;
        self.dropped_templates = time.dropped_templates;
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    pub fn trips_kept_pct(&self) -> f64 {
        Self::pct(self.trips_after, self.trips_before)
    }

    /// Create an error record with timestamp and error information
    pub fn from_error(feed: &str, error_type: &str, error_message: &str) -> Self {
        SubsetStats {
            timestamp: Utc::now(),
            feed: feed.to_string(),
            error_type: Some(error_type.to_string()),
            error_message: Some(error_message.to_string()),
            ..Default::default()
        }
    }
}

/// Row counts per table.
#[derive(Debug, Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: usize,
}

/// What a feed covers, to help choose date and time windows.
#[derive(Debug, Serialize)]
pub struct FeedProfile {
    pub tables: Vec<TableCount>,
    pub service_start: Option<NaiveDate>,
    pub service_end: Option<NaiveDate>,
    pub first_stop_time: Option<String>,
    pub last_stop_time: Option<String>,
}

impl FeedProfile {
    pub fn from_store(store: &TableStore) -> Result<Self> {
        let tables = store
            .tables()
            .map(|t| TableCount {
                table: t.name().to_string(),
                rows: t.len(),
            })
            .collect();

        let mut service_start: Option<NaiveDate> = None;
        let mut service_end: Option<NaiveDate> = None;
        let mut widen = |date: NaiveDate| {
            service_start = Some(service_start.map_or(date, |d| d.min(date)));
            service_end = Some(service_end.map_or(date, |d| d.max(date)));
        };

        if store.has_table("calendar") {
            let calendar = store.get_table("calendar")?;
            let start_idx = calendar.column_index("start_date")?;
            let end_idx = calendar.column_index("end_date")?;
            for i in 0..calendar.len() {
                widen(calendar.parse_date(i, start_idx)?);
                widen(calendar.parse_date(i, end_idx)?);
            }
        }
        if store.has_table("calendar_dates") {
            let calendar_dates = store.get_table("calendar_dates")?;
            let date_idx = calendar_dates.column_index("date")?;
            for i in 0..calendar_dates.len() {
                widen(calendar_dates.parse_date(i, date_idx)?);
            }
        }

        let (first, last) = if store.has_table("stop_times") {
            let bounds = trip_bounds(store.get_table("stop_times")?)?;
            (
                bounds.values().map(|b| b.start).min(),
                bounds.values().map(|b| b.end).max(),
            )
        } else {
            (None, None)
        };

        Ok(FeedProfile {
            tables,
            service_start,
            service_end,
            first_stop_time: first.map(|t: GtfsTime| t.to_string()),
            last_stop_time: last.map(|t: GtfsTime| t.to_string()),
        })
    }
}
