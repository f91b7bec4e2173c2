//! Referential pruning: drops rows whose foreign key no longer resolves.
//!
//! The composite prunes run in a fixed order because each one reads the
//! output of the previous one: trips drive stop times and frequencies, trips
//! drive calendars, stop times drive stops, trips drive routes.

use std::collections::HashSet;
use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::table::TableStore;

/// Removes rows of `target` whose `target_key` is not among the
/// `source_key` values of `source`. No-op when `target` is absent.
pub fn prune_table_by_column(
    store: &mut TableStore,
    target: &str,
    source: &str,
    target_key: &str,
    source_key: &str,
) -> Result<()> {
    if !store.has_table(target) {
        return Ok(());
    }

    let source_table = store.get_table(source)?;
    let keys: HashSet<String> = source_table
        .key_set(source_key)?
        .into_iter()
        .map(str::to_string)
        .collect();

    let target_table = store.get_table(target)?;
    let idx = target_table.column_index(target_key)?;
    let pruned = target_table.filter_rows(|_, row| Ok(keys.contains(&row[idx])))?;

    debug!(
        target,
        source,
        removed = target_table.len() - pruned.len(),
        "Pruned table"
    );
    store.update_table(target, pruned, false)
}

pub fn prune_unused_trips(store: &mut TableStore) -> Result<()> {
    prune_table_by_column(store, "frequencies", "trips", "trip_id", "trip_id")?;
    prune_table_by_column(store, "stop_times", "trips", "trip_id", "trip_id")
}

/// Service ids used by trips that only `calendar_dates` defines, in a feed
/// that also has `calendar`.
pub fn calendar_dates_only_services(store: &TableStore) -> Result<Vec<String>> {
    if !store.has_table("calendar") || !store.has_table("calendar_dates") {
        return Ok(Vec::new());
    }

    let weekly = store.get_table("calendar")?.key_set("service_id")?;
    let dated = store.get_table("calendar_dates")?.key_set("service_id")?;
    let mut services: Vec<String> = store
        .get_table("trips")?
        .key_set("service_id")?
        .into_iter()
        .filter(|s| dated.contains(s) && !weekly.contains(s))
        .map(str::to_string)
        .collect();
    services.sort();
    Ok(services)
}

/// Feeds without `calendar` describe service through `calendar_dates` alone.
///
/// When both tables exist, `calendar_dates` is pruned against `calendar`, so
/// a trip whose service lives only in `calendar_dates` loses its service rows
/// and is left with an unresolved `service_id`. That case is logged.
pub fn prune_unused_calendars(store: &mut TableStore) -> Result<()> {
    if store.has_table("calendar_dates") && !store.has_table("calendar") {
        prune_table_by_column(store, "calendar_dates", "trips", "service_id", "service_id")
    } else {
        prune_table_by_column(store, "calendar", "trips", "service_id", "service_id")?;
        if store.has_table("calendar") {
            let orphaned = calendar_dates_only_services(store)?;
            if !orphaned.is_empty() {
                warn!(
                    services = ?orphaned,
                    "Services defined only in calendar_dates lose their dates to the calendar prune"
                );
            }
            prune_table_by_column(store, "calendar_dates", "calendar", "service_id", "service_id")?;
        }
        Ok(())
    }
}

/// Keeps stops that are served or that parent a kept stop.
///
/// Applied twice: the second pass drops stations whose only children were
/// removed by the first.
pub fn prune_unused_stops(store: &mut TableStore) -> Result<()> {
    if !store.has_table("stops") {
        return Ok(());
    }

    let served: HashSet<String> = store
        .get_table("stop_times")?
        .key_set("stop_id")?
        .into_iter()
        .map(str::to_string)
        .collect();

    for _ in 0..2 {
        let stops = store.get_table("stops")?;
        let id_idx = stops.column_index("stop_id")?;
        let parents: HashSet<&str> = if stops.has_column("parent_station") {
            stops.key_set("parent_station")?
        } else {
            HashSet::new()
        };

        let pruned = stops.filter_rows(|_, row| {
            let id = row[id_idx].as_str();
            Ok(served.contains(id) || parents.contains(id))
        })?;
        store.update_table("stops", pruned, false)?;
    }

    Ok(())
}

pub fn prune_unused_routes(store: &mut TableStore) -> Result<()> {
    prune_table_by_column(store, "routes", "trips", "route_id", "route_id")
}

/// Drops trips whose `service_id` no longer has any calendar entry.
///
/// A service counts as present when it has a `calendar` row or a
/// `calendar_dates` row adding service (`exception_type` 1). No-op when the
/// feed has neither table.
pub fn prune_trips_by_service(store: &mut TableStore) -> Result<()> {
    if !store.has_table("calendar") && !store.has_table("calendar_dates") {
        return Ok(());
    }

    let mut services: HashSet<String> = HashSet::new();
    if store.has_table("calendar") {
        let calendar = store.get_table("calendar")?;
        services.extend(calendar.key_set("service_id")?.into_iter().map(str::to_string));
    }
    if store.has_table("calendar_dates") {
        let calendar_dates = store.get_table("calendar_dates")?;
        let service_idx = calendar_dates.column_index("service_id")?;
        let exception_idx = calendar_dates.column_index("exception_type").ok();
        services.extend(
            calendar_dates
                .rows()
                .iter()
                .filter(|row| exception_idx.is_none_or(|i| row[i].trim() == "1"))
                .map(|row| row[service_idx].clone()),
        );
    }

    let trips = store.get_table("trips")?;
    let service_idx = trips.column_index("service_id")?;
    let pruned = trips.filter_rows(|_, row| Ok(services.contains(&row[service_idx])))?;

    debug!(removed = trips.len() - pruned.len(), "Pruned trips without service");
    store.update_table("trips", pruned, false)
}

/// Runs every prune in dependency order. Idempotent.
#[instrument(skip(store))]
pub fn prune_feed(store: &mut TableStore) -> Result<()> {
    prune_unused_trips(store)?;
    prune_unused_calendars(store)?;
    prune_unused_stops(store)?;
    prune_unused_routes(store)
}
