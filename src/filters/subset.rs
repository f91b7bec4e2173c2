//! The full subsetting pipeline for one feed.

use serde::Serialize;
use tracing::{info, instrument};

use crate::error::Result;
use crate::filters::daterange::{filter_by_date_range, remove_exception_calendars};
use crate::filters::prune::{prune_feed, prune_trips_by_service};
use crate::filters::timerange::{TimeFilterStats, filter_by_time_range};
use crate::table::TableStore;
use crate::time::{DateRange, TimeRange};

/// Validated ranges for one run. A stage runs only when its range is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubsetOptions {
    pub date_range: Option<DateRange>,
    pub time_range: Option<TimeRange>,
    pub trim_trips: bool,
    /// Drop `calendar_dates` amendments of weekly services before any range
    /// is applied.
    pub remove_exception_calendars: bool,
}

/// Reduces `store` in place: exception dates (when asked), date window,
/// prune, time window, prune.
///
/// # Errors
///
/// Fails if `trips` or `stop_times` is missing, or if any stage fails. Stages
/// committed before the failure stay applied.
#[instrument(skip_all)]
pub fn subset_feed(store: &mut TableStore, options: &SubsetOptions) -> Result<TimeFilterStats> {
    store.get_table("trips")?;
    store.get_table("stop_times")?;

    if options.remove_exception_calendars {
        remove_exception_calendars(store)?;
    }
    if let Some(range) = &options.date_range {
        filter_by_date_range(store, range)?;
        prune_trips_by_service(store)?;
        info!(start = %range.start, end = %range.end, "Date range applied");
    }
    prune_feed(store)?;

    let stats = match &options.time_range {
        Some(range) => {
            let stats = filter_by_time_range(store, range, options.trim_trips)?;
            prune_feed(store)?;
            stats
        }
        None => TimeFilterStats::default(),
    };

    Ok(stats)
}
