//! Restricts trips to a daily time window.
//!
//! Fixed trips are kept or dropped by their span. Frequency templates are
//! unwrapped into occurrences, and the occurrences wholly inside the window
//! are folded back into one frequency row per contiguous run. In trim mode,
//! trips that only cross the window are kept with their out-of-window stops
//! removed, and occurrences that only cross it become standalone trips.
//!
//! Stop times without any time are dropped when trimming: keeping them would
//! mean guessing when the stop is served.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::filters::trips::{Occurrence, Template, extend_trips, trip_bounds, unwrap_frequencies};
use crate::table::{Row, Table, TableStore};
use crate::time::{GtfsTime, TimeRange};

/// What the repeating-trip pass did to the feed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeFilterStats {
    pub materialized_trips: usize,
    pub split_templates: usize,
    pub dropped_templates: usize,
}

/// How a span relates to the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    Whole,
    Partial,
    Outside,
}

impl Coverage {
    pub fn of(range: &TimeRange, start: GtfsTime, end: GtfsTime) -> Self {
        if range.wholly_contains(start, end) {
            Coverage::Whole
        } else if range.overlaps(start, end) {
            Coverage::Partial
        } else {
            Coverage::Outside
        }
    }
}

/// Id given to the standalone trip built from occurrence `ordinal`.
pub fn materialized_trip_id(trip_id: &str, ordinal: usize) -> String {
    format!("{trip_id}_freq_{ordinal}")
}

/// Maximal runs of consecutive `true` flags, as inclusive index pairs.
pub fn contiguous_runs(flags: &[bool]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut run_start = None;
    for (i, &flag) in flags.iter().enumerate() {
        match (flag, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                runs.push((start, i - 1));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        runs.push((start, flags.len() - 1));
    }
    runs
}

/// Frequency rows replacing `row` once only the `kept` occurrences remain.
///
/// Run boundaries are computed first; each run then yields a copy of `row`
/// whose `start_time`/`end_time` cover exactly the run's occurrences.
pub fn reshape_template(
    row: &Row,
    occurrences: &[Occurrence],
    kept: &[bool],
    start_idx: usize,
    end_idx: usize,
) -> Vec<Row> {
    if !kept.is_empty() && kept.iter().all(|&k| k) {
        return vec![row.clone()];
    }

    contiguous_runs(kept)
        .into_iter()
        .map(|(first, last)| {
            let mut reshaped = row.clone();
            reshaped[start_idx] = occurrences[first].start.to_string();
            reshaped[end_idx] = occurrences[last].end.to_string();
            reshaped
        })
        .collect()
}

/// Keeps the stop times served inside `range`, plus every stop time of the
/// trips `exempt` accepts.
fn trim_stop_times<F>(stop_times: &Table, range: &TimeRange, exempt: F) -> Result<Table>
where
    F: Fn(&str) -> bool,
{
    let trip_idx = stop_times.column_index("trip_id")?;
    let arrival_idx = stop_times.column_index("arrival_time")?;
    let departure_idx = stop_times.column_index("departure_time")?;

    stop_times.filter_rows(|i, row| {
        if exempt(row[trip_idx].as_str()) {
            return Ok(true);
        }
        Ok(range.serves(
            stop_times.parse_time(i, arrival_idx)?,
            stop_times.parse_time(i, departure_idx)?,
        ))
    })
}

/// Row indices of each wanted trip's stop times, by ascending `stop_sequence`.
fn stop_times_by_trip<'a>(
    stop_times: &'a Table,
    wanted: &HashSet<&str>,
) -> Result<HashMap<&'a str, Vec<usize>>> {
    let trip_idx = stop_times.column_index("trip_id")?;
    let sequence_idx = stop_times.column_index("stop_sequence")?;

    let mut by_trip: HashMap<&str, Vec<(u32, usize)>> = HashMap::new();
    for (i, row) in stop_times.rows().iter().enumerate() {
        let trip_id = row[trip_idx].as_str();
        if wanted.contains(trip_id) {
            by_trip
                .entry(trip_id)
                .or_default()
                .push((stop_times.parse_u32(i, sequence_idx)?, i));
        }
    }

    Ok(by_trip
        .into_iter()
        .map(|(trip_id, mut rows)| {
            rows.sort_unstable();
            (trip_id, rows.into_iter().map(|(_, i)| i).collect())
        })
        .collect())
}

/// Filters trips by their span; repeating trips are left to
/// [`filter_repeating_trips_by_time_range`].
#[instrument(skip(store))]
pub fn filter_single_trips_by_time_range(
    store: &mut TableStore,
    range: &TimeRange,
    trim_trips: bool,
) -> Result<()> {
    let trips = store.get_table("trips")?;
    let stop_times = store.get_table("stop_times")?;
    let frequencies = if store.has_table("frequencies") {
        Some(store.get_table("frequencies")?)
    } else {
        None
    };
    let extended = extend_trips(trips, stop_times, frequencies)?;

    let filtered_trips = trips.filter_rows(|i, _| {
        let trip = &extended[i];
        let in_range = trip.bounds.is_some_and(|b| {
            if trim_trips {
                range.overlaps(b.start, b.end)
            } else {
                range.wholly_contains(b.start, b.end)
            }
        });
        Ok(trip.is_repeating || in_range)
    })?;

    let untimed = extended
        .iter()
        .filter(|t| !t.is_repeating && t.bounds.is_none())
        .count();
    if untimed > 0 {
        warn!(count = untimed, "Dropping trips without any stop time");
    }

    let trimmed_stop_times = if trim_trips {
        let repeating: HashSet<&str> = extended
            .iter()
            .filter(|t| t.is_repeating)
            .map(|t| t.trip_id.as_str())
            .collect();
        Some(trim_stop_times(stop_times, range, |trip_id| {
            repeating.contains(trip_id)
        })?)
    } else {
        None
    };

    debug!(
        trips_before = trips.len(),
        trips_after = filtered_trips.len(),
        "Single trips filtered"
    );
    store.update_table("trips", filtered_trips, false)?;
    if let Some(stop_times) = trimmed_stop_times {
        store.update_table("stop_times", stop_times, false)?;
    }
    Ok(())
}

/// Reshapes `frequencies` around the occurrences wholly inside `range` and,
/// when trimming, materializes the occurrences only partially inside it.
#[instrument(skip(store))]
pub fn filter_repeating_trips_by_time_range(
    store: &mut TableStore,
    range: &TimeRange,
    trim_trips: bool,
) -> Result<TimeFilterStats> {
    let mut stats = TimeFilterStats::default();
    if !store.has_table("frequencies") {
        return Ok(stats);
    }

    let trips = store.get_table("trips")?;
    let stop_times = store.get_table("stop_times")?;
    let frequencies = store.get_table("frequencies")?;

    let bounds = trip_bounds(stop_times)?;
    let templates = unwrap_frequencies(frequencies, &bounds)?;
    let start_idx = frequencies.column_index("start_time")?;
    let end_idx = frequencies.column_index("end_time")?;

    let mut frequency_rows = Vec::new();
    let mut kept_trips: HashSet<&str> = HashSet::new();
    let mut partial: Vec<(&Template, Occurrence)> = Vec::new();

    for template in &templates {
        let coverage: Vec<Coverage> = template
            .occurrences
            .iter()
            .map(|o| Coverage::of(range, o.start, o.end))
            .collect();
        let whole: Vec<bool> = coverage.iter().map(|c| *c == Coverage::Whole).collect();

        let reshaped = reshape_template(
            &frequencies.rows()[template.row],
            &template.occurrences,
            &whole,
            start_idx,
            end_idx,
        );
        match reshaped.len() {
            0 => stats.dropped_templates += 1,
            1 => {}
            _ => stats.split_templates += 1,
        }
        if !reshaped.is_empty() {
            kept_trips.insert(template.trip_id.as_str());
        }
        frequency_rows.extend(reshaped);

        if trim_trips {
            partial.extend(
                template
                    .occurrences
                    .iter()
                    .zip(&coverage)
                    .filter(|(_, c)| **c == Coverage::Partial)
                    .map(|(o, _)| (template, *o)),
            );
        }
    }

    let repeating: HashSet<&str> = templates.iter().map(|t| t.trip_id.as_str()).collect();
    let trip_idx = trips.column_index("trip_id")?;
    let mut trip_rows: Vec<Row> = trips
        .rows()
        .iter()
        .filter(|row| {
            let trip_id = row[trip_idx].as_str();
            !repeating.contains(trip_id) || kept_trips.contains(trip_id)
        })
        .cloned()
        .collect();

    let mut stop_time_rows: Option<Vec<Row>> = None;
    if trim_trips && !partial.is_empty() {
        let wanted: HashSet<&str> = partial.iter().map(|(t, _)| t.trip_id.as_str()).collect();
        let template_trips: HashMap<&str, &Row> = trips
            .rows()
            .iter()
            .filter(|row| wanted.contains(row[trip_idx].as_str()))
            .map(|row| (row[trip_idx].as_str(), row))
            .collect();
        let template_stops = stop_times_by_trip(stop_times, &wanted)?;

        let st_trip_idx = stop_times.column_index("trip_id")?;
        let arrival_idx = stop_times.column_index("arrival_time")?;
        let departure_idx = stop_times.column_index("departure_time")?;
        let mut new_stop_rows = Vec::new();

        for (template, occurrence) in &partial {
            let trip_id = template.trip_id.as_str();
            let Some(template_trip) = template_trips.get(trip_id) else {
                warn!(trip_id, "Frequency template has no trips row, not materializing");
                continue;
            };
            let Some(first) = bounds.get(trip_id).map(|b| b.start) else {
                continue;
            };

            let new_trip_id = materialized_trip_id(trip_id, occurrence.ordinal);
            let mut trip_row = (*template_trip).clone();
            trip_row[trip_idx] = new_trip_id.clone();
            trip_rows.push(trip_row);

            let offset = occurrence.start.seconds() as i64 - first.seconds() as i64;
            for &i in template_stops.get(trip_id).into_iter().flatten() {
                let arrival = stop_times.parse_time(i, arrival_idx)?.map(|t| t.offset(offset));
                let departure = stop_times
                    .parse_time(i, departure_idx)?
                    .map(|t| t.offset(offset));
                if !range.serves(arrival, departure) {
                    continue;
                }

                let mut row = stop_times.rows()[i].clone();
                row[st_trip_idx] = new_trip_id.clone();
                row[arrival_idx] = arrival.map(|t| t.to_string()).unwrap_or_default();
                row[departure_idx] = departure.map(|t| t.to_string()).unwrap_or_default();
                new_stop_rows.push(row);
            }
            stats.materialized_trips += 1;
        }

        let mut rows = stop_times.rows().to_vec();
        rows.extend(new_stop_rows);
        stop_time_rows = Some(rows);
    }

    let new_frequencies = frequencies.with_rows(frequency_rows);
    let new_trips = trips.with_rows(trip_rows);
    let new_stop_times = stop_time_rows.map(|rows| stop_times.with_rows(rows));

    debug!(
        templates = templates.len(),
        frequencies_after = new_frequencies.len(),
        materialized = stats.materialized_trips,
        "Repeating trips filtered"
    );
    store.update_table("frequencies", new_frequencies, false)?;
    store.update_table("trips", new_trips, false)?;
    if let Some(stop_times) = new_stop_times {
        store.update_table("stop_times", stop_times, false)?;
    }
    Ok(stats)
}

/// Runs the fixed-trip pass, then the repeating-trip pass.
pub fn filter_by_time_range(
    store: &mut TableStore,
    range: &TimeRange,
    trim_trips: bool,
) -> Result<TimeFilterStats> {
    filter_single_trips_by_time_range(store, range, trim_trips)?;
    let stats = filter_repeating_trips_by_time_range(store, range, trim_trips)?;
    info!(
        start = %range.start,
        end = %range.end,
        trim_trips,
        materialized = stats.materialized_trips,
        split = stats.split_templates,
        dropped = stats.dropped_templates,
        "Time range applied"
    );
    Ok(stats)
}
