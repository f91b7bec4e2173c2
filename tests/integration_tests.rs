use gtfs_subset::filters::subset::{SubsetOptions, subset_feed};
use gtfs_subset::filters::timerange::TimeFilterStats;
use gtfs_subset::output::write_feed;
use gtfs_subset::parser::{load_feed, read_feed};
use gtfs_subset::stats::{FeedProfile, SubsetStats};
use gtfs_subset::time::{DateRange, GtfsTime, TimeRange, parse_gtfs_date};
use gtfs_subset::{Error, Table, TableStore};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/basic")
}

fn load_fixture() -> TableStore {
    load_feed(fixture().to_str().unwrap()).expect("Failed to load fixture feed")
}

fn column(store: &TableStore, table: &str, column: &str) -> Vec<String> {
    let t = store.get_table(table).unwrap();
    let idx = t.column_index(column).unwrap();
    t.rows().iter().map(|r| r[idx].clone()).collect()
}

fn time(s: &str) -> GtfsTime {
    GtfsTime::parse(s).unwrap()
}

fn keys<'a>(store: &'a TableStore, table: &str, column: &str) -> HashSet<&'a str> {
    store.get_table(table).unwrap().key_set(column).unwrap()
}

/// Every foreign key of the reduced feed resolves.
fn assert_closed(store: &TableStore) {
    let trip_ids = keys(store, "trips", "trip_id");
    assert!(keys(store, "stop_times", "trip_id").is_subset(&trip_ids));
    assert!(keys(store, "frequencies", "trip_id").is_subset(&trip_ids));

    let stop_ids = keys(store, "stops", "stop_id");
    assert!(keys(store, "stop_times", "stop_id").is_subset(&stop_ids));
    assert!(keys(store, "stops", "parent_station").is_subset(&stop_ids));

    let route_ids = keys(store, "routes", "route_id");
    assert!(keys(store, "trips", "route_id").is_subset(&route_ids));

    let mut services = keys(store, "calendar", "service_id");
    services.extend(keys(store, "calendar_dates", "service_id"));
    assert!(keys(store, "trips", "service_id").is_subset(&services));
}

#[test]
fn test_full_pipeline() {
    let mut store = load_fixture();
    let options = SubsetOptions {
        date_range: Some(
            DateRange::new(
                parse_gtfs_date("20240301").unwrap(),
                parse_gtfs_date("20240331").unwrap(),
            )
            .unwrap(),
        ),
        time_range: Some(TimeRange::new(time("07:00:00"), time("09:00:00")).unwrap()),
        trim_trips: false,
        remove_exception_calendars: false,
    };

    let mut stats = SubsetStats::new("basic", &options);
    stats.record_before(&store);
    let time_stats = subset_feed(&mut store, &options).expect("Failed to subset feed");
    stats.record_after(&store, time_stats);

    assert_eq!(column(&store, "calendar", "service_id"), vec!["weekday"]);
    assert_eq!(column(&store, "calendar_dates", "date"), vec!["20240315"]);
    assert_eq!(column(&store, "feed_info", "feed_start_date"), vec!["20240301"]);
    assert_eq!(column(&store, "feed_info", "feed_end_date"), vec!["20240331"]);

    assert_eq!(column(&store, "trips", "trip_id"), vec!["morning", "loop"]);
    assert_eq!(
        column(&store, "stop_times", "trip_id"),
        vec!["morning", "morning", "morning", "loop", "loop"]
    );
    assert_eq!(column(&store, "frequencies", "start_time"), vec!["07:00:00"]);
    assert_eq!(column(&store, "frequencies", "end_time"), vec!["08:40:00"]);
    assert_eq!(column(&store, "frequencies", "exact_times"), vec!["1"]);
    assert_eq!(column(&store, "stops", "stop_id"), vec!["S", "A", "B", "C", "G"]);
    assert_eq!(column(&store, "routes", "route_id"), vec!["r1", "r3"]);
    assert_eq!(store.row_count("agency"), 1);
    assert_closed(&store);

    assert_eq!(stats.trips_before, 4);
    assert_eq!(stats.trips_after, 2);
    assert_eq!(stats.stops_before, 9);
    assert_eq!(stats.stops_after, 5);
    assert_eq!(stats.materialized_trips, 0);
    assert_eq!(stats.date_start.as_deref(), Some("20240301"));
}

#[test]
fn test_trim_materializes_partial_occurrences() {
    let mut store = load_fixture();
    let options = SubsetOptions {
        time_range: Some(TimeRange::new(time("07:05:00"), time("09:05:00")).unwrap()),
        trim_trips: true,
        ..Default::default()
    };

    let stats = subset_feed(&mut store, &options).unwrap();

    assert_eq!(stats.materialized_trips, 2);
    assert_eq!(stats.dropped_templates, 0);
    assert_eq!(
        column(&store, "trips", "trip_id"),
        vec!["morning", "old", "loop", "loop_freq_2", "loop_freq_6"]
    );
    assert_eq!(column(&store, "frequencies", "start_time"), vec!["07:30:00"]);
    assert_eq!(column(&store, "frequencies", "end_time"), vec!["08:40:00"]);

    // morning lost its 07:00 stop, the template trip keeps all of its own
    let stop_times = store.get_table("stop_times").unwrap();
    let rows: Vec<(&str, &str, &str)> = stop_times
        .rows()
        .iter()
        .map(|r| (r[0].as_str(), r[1].as_str(), r[3].as_str()))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("morning", "07:10:00", "B"),
            ("morning", "07:20:00", "C"),
            ("old", "08:00:00", "E"),
            ("old", "08:10:00", "F"),
            ("loop", "00:00:00", "A"),
            ("loop", "00:10:00", "G"),
            ("loop_freq_2", "07:10:00", "G"),
            ("loop_freq_6", "09:00:00", "A"),
        ]
    );

    let materialized = store.get_table("trips").unwrap().rows()[3].clone();
    assert_eq!(materialized, vec!["r3", "weekday", "loop_freq_2", "Loop"]);

    assert_eq!(
        column(&store, "stops", "stop_id"),
        vec!["S", "A", "B", "C", "E", "F", "G", "T"]
    );
    assert_closed(&store);
}

#[test]
fn test_trimmed_stop_times_are_in_range() {
    let mut store = load_fixture();
    let range = TimeRange::new(time("07:05:00"), time("09:05:00")).unwrap();
    let options = SubsetOptions {
        time_range: Some(range),
        trim_trips: true,
        ..Default::default()
    };
    subset_feed(&mut store, &options).unwrap();

    // Template stop times are relative to the template, everything else must
    // be served inside the window.
    let stop_times = store.get_table("stop_times").unwrap();
    for (i, row) in stop_times.rows().iter().enumerate() {
        if row[0] == "loop" {
            continue;
        }
        assert!(range.serves(
            stop_times.parse_time(i, 1).unwrap(),
            stop_times.parse_time(i, 2).unwrap()
        ));
    }
}

#[test]
fn test_round_trip_without_ranges_is_noop() {
    let original = load_fixture();
    let mut store = original.clone();

    let stats = subset_feed(&mut store, &SubsetOptions::default()).unwrap();
    assert_eq!(stats, TimeFilterStats::default());

    let dir = std::env::temp_dir().join("gtfs_subset_it_round_trip");
    let _ = std::fs::remove_dir_all(&dir);
    write_feed(&store, &dir).unwrap();
    let reread = read_feed(&dir).unwrap();

    let before: Vec<&Table> = original.tables().collect();
    let after: Vec<&Table> = reread.tables().collect();
    assert_eq!(before, after);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_round_trip_with_covering_ranges() {
    let original = load_fixture();

    for trim_trips in [false, true] {
        let mut store = original.clone();
        let options = SubsetOptions {
            date_range: Some(
                DateRange::new(
                    parse_gtfs_date("20221201").unwrap(),
                    parse_gtfs_date("20250131").unwrap(),
                )
                .unwrap(),
            ),
            time_range: Some(TimeRange::new(time("00:00:00"), time("24:00:00")).unwrap()),
            trim_trips,
            remove_exception_calendars: false,
        };
        let stats = subset_feed(&mut store, &options).unwrap();
        assert_eq!(stats, TimeFilterStats::default());

        let dir = std::env::temp_dir().join(format!("gtfs_subset_it_covering_{trim_trips}"));
        let _ = std::fs::remove_dir_all(&dir);
        write_feed(&store, &dir).unwrap();
        let reread = read_feed(&dir).unwrap();

        for table in original.tables().filter(|t| t.name() != "feed_info") {
            assert_eq!(reread.get_table(table.name()).unwrap(), table);
        }
        assert_eq!(column(&reread, "feed_info", "feed_start_date"), vec!["20221201"]);
        assert_eq!(column(&reread, "feed_info", "feed_end_date"), vec!["20250131"]);
        assert_eq!(
            column(&reread, "feed_info", "feed_publisher_name"),
            column(&original, "feed_info", "feed_publisher_name")
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }
}

#[test]
fn test_zip_output_is_closed() {
    let mut store = load_fixture();
    let options = SubsetOptions {
        date_range: Some(
            DateRange::new(
                parse_gtfs_date("20230101").unwrap(),
                parse_gtfs_date("20230201").unwrap(),
            )
            .unwrap(),
        ),
        ..Default::default()
    };
    subset_feed(&mut store, &options).unwrap();

    let path = std::env::temp_dir().join("gtfs_subset_it_winter.zip");
    let _ = std::fs::remove_file(&path);
    write_feed(&store, &path).unwrap();
    let reread = read_feed(&path).unwrap();

    assert_eq!(column(&reread, "trips", "trip_id"), vec!["old"]);
    assert_eq!(column(&reread, "stops", "stop_id"), vec!["E", "F", "T"]);
    assert_eq!(store.row_count("frequencies"), 0);
    assert_closed(&reread);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_feed_without_trips_fails() {
    let dir = std::env::temp_dir().join("gtfs_subset_it_no_trips");
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::copy(fixture().join("stops.txt"), dir.join("stops.txt")).unwrap();

    let mut store = read_feed(&dir).unwrap();
    let err = subset_feed(&mut store, &SubsetOptions::default()).unwrap_err();
    assert!(matches!(err, Error::MissingTable(ref t) if t == "trips"));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_profile_of_fixture() {
    let profile = FeedProfile::from_store(&load_fixture()).unwrap();

    assert_eq!(profile.tables.len(), 9);
    assert_eq!(profile.service_start, parse_gtfs_date("20230101").ok());
    assert_eq!(profile.service_end, parse_gtfs_date("20241231").ok());
    assert_eq!(profile.first_stop_time.as_deref(), Some("00:00:00"));
    assert_eq!(profile.last_stop_time.as_deref(), Some("18:10:00"));
}
