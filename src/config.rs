use serde::Deserialize;
use std::path::Path;

use crate::error::{Error, Result};
use crate::filters::subset::SubsetOptions;
use crate::time::{DateRange, GtfsTime, TimeRange, parse_user_date};

/// Unvalidated `start`/`end` pair as written in a settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RangeSetting {
    pub start: String,
    pub end: String,
}

/// Run settings, stored as JSON on disk:
/// ```json
/// {
///   "feeds": ["gtfs.zip", "https://example.org/gtfs.zip"],
///   "date_range": { "start": "2024-03-01", "end": "2024-03-31" },
///   "time_range": { "start": "07:00:00", "end": "25:00:00" },
///   "trim_trips": true,
///   "remove_exception_calendars": false,
///   "output_dir": "subset",
///   "report": "report.csv"
/// }
/// ```
/// Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub feeds: Vec<String>,
    pub date_range: Option<RangeSetting>,
    pub time_range: Option<RangeSetting>,
    pub trim_trips: bool,
    pub remove_exception_calendars: bool,
    pub output_dir: Option<String>,
    pub report: Option<String>,
}

impl Settings {
    /// Loads settings from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Validates the ranges into the options the pipeline runs with.
    pub fn options(&self) -> Result<SubsetOptions> {
        let date_range = self
            .date_range
            .as_ref()
            .map(|r| DateRange::new(parse_user_date(&r.start)?, parse_user_date(&r.end)?))
            .transpose()?;
        let time_range = self
            .time_range
            .as_ref()
            .map(|r| TimeRange::new(GtfsTime::parse(&r.start)?, GtfsTime::parse(&r.end)?))
            .transpose()?;

        if self.trim_trips && time_range.is_none() {
            return Err(Error::Configuration(
                "trimming trips requires a time range".to_string(),
            ));
        }

        Ok(SubsetOptions {
            date_range,
            time_range,
            trim_trips: self.trim_trips,
            remove_exception_calendars: self.remove_exception_calendars,
        })
    }
}

/// Builds a range from a pair of optional flags; both or neither must be set.
pub fn range_from_flags(
    what: &str,
    start: Option<String>,
    end: Option<String>,
) -> Result<Option<RangeSetting>> {
    match (start, end) {
        (Some(start), Some(end)) => Ok(Some(RangeSetting { start, end })),
        (None, None) => Ok(None),
        _ => Err(Error::Configuration(format!(
            "{what} range needs both a start and an end"
        ))),
    }
}
