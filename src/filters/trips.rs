//! Pure derivations over the trip tables: per-trip time spans and the
//! occurrences generated by frequency templates.

use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::error::{Error, Result};
use crate::table::Table;
use crate::time::GtfsTime;

/// Earliest and latest service time of one trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripBounds {
    pub start: GtfsTime,
    pub end: GtfsTime,
}

impl TripBounds {
    pub fn duration(&self) -> u32 {
        self.end.seconds() - self.start.seconds()
    }
}

/// A `trips` row together with its span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedTrip {
    pub trip_id: String,
    /// `None` when none of the trip's stop times carries a time.
    pub bounds: Option<TripBounds>,
    pub is_repeating: bool,
}

/// One timed run of a frequency template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    /// Position within its template, starting at 0.
    pub index: usize,
    /// Position among all occurrences of the trip, templates taken by
    /// ascending `start_time`.
    pub ordinal: usize,
    pub start: GtfsTime,
    pub end: GtfsTime,
}

/// A `frequencies` row unwrapped into its occurrences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Row index in the `frequencies` table.
    pub row: usize,
    pub trip_id: String,
    pub start_time: GtfsTime,
    pub end_time: GtfsTime,
    pub headway_secs: u32,
    pub occurrences: Vec<Occurrence>,
}

/// Span of every trip that has at least one timed stop time.
pub fn trip_bounds(stop_times: &Table) -> Result<HashMap<String, TripBounds>> {
    let trip_idx = stop_times.column_index("trip_id")?;
    let arrival_idx = stop_times.column_index("arrival_time")?;
    let departure_idx = stop_times.column_index("departure_time")?;

    let mut bounds: HashMap<String, TripBounds> = HashMap::new();
    for (i, row) in stop_times.rows().iter().enumerate() {
        let times = [
            stop_times.parse_time(i, arrival_idx)?,
            stop_times.parse_time(i, departure_idx)?,
        ];
        for time in times.into_iter().flatten() {
            bounds
                .entry(row[trip_idx].clone())
                .and_modify(|b| {
                    b.start = b.start.min(time);
                    b.end = b.end.max(time);
                })
                .or_insert(TripBounds {
                    start: time,
                    end: time,
                });
        }
    }

    Ok(bounds)
}

/// Joins `trips` with the span of each trip, in `trips` row order.
pub fn extend_trips(
    trips: &Table,
    stop_times: &Table,
    frequencies: Option<&Table>,
) -> Result<Vec<ExtendedTrip>> {
    let bounds = trip_bounds(stop_times)?;
    let repeating: HashSet<&str> = match frequencies {
        Some(frequencies) => frequencies.key_set("trip_id")?,
        None => HashSet::new(),
    };

    let trip_idx = trips.column_index("trip_id")?;
    Ok(trips
        .rows()
        .iter()
        .map(|row| {
            let trip_id = row[trip_idx].as_str();
            ExtendedTrip {
                trip_id: trip_id.to_string(),
                bounds: bounds.get(trip_id).copied(),
                is_repeating: repeating.contains(trip_id),
            }
        })
        .collect())
}

/// Occurrence starts run from `start_time` in steps of `headway_secs` while
/// strictly before `end_time`.
pub fn occurrence_starts(
    start_time: GtfsTime,
    end_time: GtfsTime,
    headway_secs: u32,
) -> impl Iterator<Item = GtfsTime> {
    debug_assert!(headway_secs > 0);
    (start_time.seconds()..end_time.seconds())
        .step_by(headway_secs.max(1) as usize)
        .map(GtfsTime)
}

/// Unwraps every `frequencies` row, in table order.
///
/// A template whose trip has no timed stop time cannot be placed on the clock
/// and gets no occurrences.
pub fn unwrap_frequencies(
    frequencies: &Table,
    bounds: &HashMap<String, TripBounds>,
) -> Result<Vec<Template>> {
    let trip_idx = frequencies.column_index("trip_id")?;
    let start_idx = frequencies.column_index("start_time")?;
    let end_idx = frequencies.column_index("end_time")?;
    let headway_idx = frequencies.column_index("headway_secs")?;

    let mut templates = Vec::with_capacity(frequencies.len());
    for (i, row) in frequencies.rows().iter().enumerate() {
        let headway_secs = frequencies.parse_u32(i, headway_idx)?;
        if headway_secs == 0 {
            return Err(Error::InvalidField {
                table: frequencies.name().to_string(),
                column: "headway_secs".to_string(),
                row: i,
                value: row[headway_idx].clone(),
                reason: "must be positive".to_string(),
            });
        }

        templates.push(Template {
            row: i,
            trip_id: row[trip_idx].clone(),
            start_time: frequencies.parse_required_time(i, start_idx)?,
            end_time: frequencies.parse_required_time(i, end_idx)?,
            headway_secs,
            occurrences: Vec::new(),
        });
    }

    // Ordinals are numbered per trip across its templates in time order.
    let mut order: Vec<usize> = (0..templates.len()).collect();
    order.sort_by(|&a, &b| {
        (&templates[a].trip_id, templates[a].start_time, a)
            .cmp(&(&templates[b].trip_id, templates[b].start_time, b))
    });

    let mut next_ordinal: HashMap<String, usize> = HashMap::new();
    for t in order {
        let template = &mut templates[t];
        let Some(trip) = bounds.get(&template.trip_id) else {
            warn!(
                trip_id = %template.trip_id,
                "Frequency template references a trip without stop times, skipping"
            );
            continue;
        };

        let ordinal = next_ordinal.entry(template.trip_id.clone()).or_default();
        template.occurrences = occurrence_starts(
            template.start_time,
            template.end_time,
            template.headway_secs,
        )
        .enumerate()
        .map(|(index, start)| Occurrence {
            index,
            ordinal: *ordinal + index,
            start,
            end: start + trip.duration(),
        })
        .collect();
        *ordinal += template.occurrences.len();
    }

    Ok(templates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::from_rows(
            name,
            columns.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }

    fn stop_times() -> Table {
        table(
            "stop_times",
            &["trip_id", "arrival_time", "departure_time", "stop_id", "stop_sequence"],
            &[
                &["t1", "", "08:00:00", "a", "1"],
                &["t1", "08:04:00", "", "b", "2"],
                &["t1", "08:05:00", "08:05:00", "c", "3"],
                &["t2", "", "", "a", "1"],
                &["loop", "00:00:00", "00:00:00", "a", "1"],
                &["loop", "00:05:00", "00:05:00", "b", "2"],
            ],
        )
    }

    #[test]
    fn test_trip_bounds_use_any_present_time() {
        let bounds = trip_bounds(&stop_times()).unwrap();

        let t1 = bounds["t1"];
        assert_eq!(t1.start, GtfsTime(8 * 3600));
        assert_eq!(t1.end, GtfsTime(8 * 3600 + 300));
        assert_eq!(t1.duration(), 300);
        assert!(!bounds.contains_key("t2"));
    }

    #[test]
    fn test_extend_trips_flags_repeating() {
        let trips = table(
            "trips",
            &["trip_id", "service_id", "route_id"],
            &[&["t1", "s", "r"], &["t2", "s", "r"], &["loop", "s", "r"]],
        );
        let frequencies = table(
            "frequencies",
            &["trip_id", "start_time", "end_time", "headway_secs"],
            &[&["loop", "06:00:00", "07:00:00", "600"]],
        );

        let extended = extend_trips(&trips, &stop_times(), Some(&frequencies)).unwrap();

        assert_eq!(extended.len(), 3);
        assert!(!extended[0].is_repeating);
        assert!(extended[1].bounds.is_none());
        assert!(extended[2].is_repeating);
    }

    #[test]
    fn test_occurrence_starts_are_increasing_and_bounded() {
        let starts: Vec<u32> = occurrence_starts(GtfsTime(0), GtfsTime(3600), 600)
            .map(GtfsTime::seconds)
            .collect();
        assert_eq!(starts, vec![0, 600, 1200, 1800, 2400, 3000]);
        assert!(starts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_unwrap_numbers_ordinals_across_templates() {
        let frequencies = table(
            "frequencies",
            &["trip_id", "start_time", "end_time", "headway_secs"],
            &[
                &["loop", "01:00:00", "01:20:00", "600"],
                &["loop", "00:00:00", "00:30:00", "600"],
            ],
        );
        let bounds = trip_bounds(&stop_times()).unwrap();

        let templates = unwrap_frequencies(&frequencies, &bounds).unwrap();

        assert_eq!(templates[0].row, 0);
        let later: Vec<usize> = templates[0].occurrences.iter().map(|o| o.ordinal).collect();
        let earlier: Vec<usize> = templates[1].occurrences.iter().map(|o| o.ordinal).collect();
        assert_eq!(earlier, vec![0, 1, 2]);
        assert_eq!(later, vec![3, 4]);

        let first = templates[1].occurrences[1];
        assert_eq!(first.index, 1);
        assert_eq!(first.start, GtfsTime(600));
        assert_eq!(first.end, GtfsTime(900));
    }

    #[test]
    fn test_unwrap_skips_trip_without_times() {
        let frequencies = table(
            "frequencies",
            &["trip_id", "start_time", "end_time", "headway_secs"],
            &[&["t2", "06:00:00", "07:00:00", "600"]],
        );
        let bounds = trip_bounds(&stop_times()).unwrap();

        let templates = unwrap_frequencies(&frequencies, &bounds).unwrap();

        assert_eq!(templates.len(), 1);
        assert!(templates[0].occurrences.is_empty());
    }

    #[test]
    fn test_occurrence_end_saturates_at_last_second() {
        let frequencies = table(
            "frequencies",
            &["trip_id", "start_time", "end_time", "headway_secs"],
            &[&["loop", "1193046:28:00", "1193046:28:15", "600"]],
        );
        let bounds = trip_bounds(&stop_times()).unwrap();

        let templates = unwrap_frequencies(&frequencies, &bounds).unwrap();

        let occurrence = templates[0].occurrences[0];
        assert_eq!(occurrence.start, GtfsTime(u32::MAX - 15));
        assert_eq!(occurrence.end, GtfsTime(u32::MAX));
    }

    #[test]
    fn test_unwrap_rejects_zero_headway() {
        let frequencies = table(
            "frequencies",
            &["trip_id", "start_time", "end_time", "headway_secs"],
            &[&["loop", "06:00:00", "07:00:00", "0"]],
        );
        let bounds = trip_bounds(&stop_times()).unwrap();

        let err = unwrap_frequencies(&frequencies, &bounds).unwrap_err();
        assert!(matches!(err, Error::InvalidField { .. }));
    }
}
