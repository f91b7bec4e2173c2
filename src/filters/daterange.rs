//! Narrows the calendar tables to a date window.

use tracing::{debug, instrument};

use crate::error::Result;
use crate::table::TableStore;
use crate::time::{DateRange, format_gtfs_date};

/// Keeps the `calendar` rows whose validity period overlaps `range`.
#[instrument(skip(store))]
pub fn filter_calendars_by_date_range(store: &mut TableStore, range: &DateRange) -> Result<()> {
    if !store.has_table("calendar") {
        return Ok(());
    }

    let calendar = store.get_table("calendar")?;
    let start_idx = calendar.column_index("start_date")?;
    let end_idx = calendar.column_index("end_date")?;

    let filtered = calendar.filter_rows(|i, _| {
        let validity = DateRange {
            start: calendar.parse_date(i, start_idx)?,
            end: calendar.parse_date(i, end_idx)?,
        };
        Ok(range.overlaps(&validity))
    })?;

    debug!(kept = filtered.len(), "Calendars filtered");
    store.update_table("calendar", filtered, false)
}

/// Keeps the `calendar_dates` rows whose date falls inside `range`.
#[instrument(skip(store))]
pub fn filter_calendar_dates_by_date_range(
    store: &mut TableStore,
    range: &DateRange,
) -> Result<()> {
    if !store.has_table("calendar_dates") {
        return Ok(());
    }

    let calendar_dates = store.get_table("calendar_dates")?;
    let date_idx = calendar_dates.column_index("date")?;

    let filtered =
        calendar_dates.filter_rows(|i, _| Ok(range.includes(calendar_dates.parse_date(i, date_idx)?)))?;

    debug!(kept = filtered.len(), "Calendar dates filtered");
    store.update_table("calendar_dates", filtered, false)
}

/// Declares `range` as the validity of the reduced feed in `feed_info`.
#[instrument(skip(store))]
pub fn reset_feed_dates(store: &mut TableStore, range: &DateRange) -> Result<()> {
    if !store.has_table("feed_info") {
        return Ok(());
    }

    let mut feed_info = store.get_table("feed_info")?.clone();
    let mut schema_changed = false;
    for column in ["feed_start_date", "feed_end_date"] {
        if !feed_info.has_column(column) {
            feed_info.add_column(column, "");
            schema_changed = true;
        }
    }

    let start_idx = feed_info.column_index("feed_start_date")?;
    let end_idx = feed_info.column_index("feed_end_date")?;
    let start = format_gtfs_date(range.start);
    let end = format_gtfs_date(range.end);

    let rows = feed_info
        .rows()
        .iter()
        .cloned()
        .map(|mut row| {
            row[start_idx] = start.clone();
            row[end_idx] = end.clone();
            row
        })
        .collect();

    store.update_table("feed_info", feed_info.with_rows(rows), schema_changed)
}

/// Drops the `calendar_dates` rows that amend a `calendar` service, leaving
/// the regular weekly pattern as the only description of that service.
///
/// Services defined only through `calendar_dates` keep their rows. No-op
/// when either table is absent.
#[instrument(skip(store))]
pub fn remove_exception_calendars(store: &mut TableStore) -> Result<()> {
    if !store.has_table("calendar") || !store.has_table("calendar_dates") {
        return Ok(());
    }

    let weekly = store.get_table("calendar")?.key_set("service_id")?;
    let calendar_dates = store.get_table("calendar_dates")?;
    let service_idx = calendar_dates.column_index("service_id")?;
    let kept = calendar_dates.filter_rows(|_, row| Ok(!weekly.contains(row[service_idx].as_str())))?;

    debug!(removed = calendar_dates.len() - kept.len(), "Exception dates removed");
    store.update_table("calendar_dates", kept, false)
}

/// Runs the three date stages in order.
pub fn filter_by_date_range(store: &mut TableStore, range: &DateRange) -> Result<()> {
    filter_calendars_by_date_range(store, range)?;
    filter_calendar_dates_by_date_range(store, range)?;
    reset_feed_dates(store, range)
}
