//! Feed loader: CSV `.txt` files, from a zip archive or a directory, into a
//! [`TableStore`].
//!
//! Each file's header order becomes the table schema. Values are kept
//! verbatim; parsing happens in the filters that need it.

use std::fs::{self, File};
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::fetch::fetch_bytes;
use crate::table::{Table, TableStore};

/// Table name for an archive entry or file, or `None` for entries that are
/// not feed tables (hidden files, macOS metadata, non-`.txt` files).
fn table_name(path: &str) -> Option<String> {
    if path.split('/').any(|part| part == "__MACOSX") {
        return None;
    }
    let file_name = Path::new(path).file_name()?.to_str()?;
    if file_name.starts_with('.') {
        return None;
    }
    file_name.strip_suffix(".txt").map(str::to_string)
}

/// Parses one CSV file. Files without a header row yield `None`.
pub fn parse_table<R: Read>(name: &str, reader: R) -> Result<Option<Table>> {
    let csv_error = |source| Error::Csv {
        file: format!("{name}.txt"),
        source,
    };

    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let columns: Vec<String> = rdr
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    if columns.iter().all(String::is_empty) {
        warn!(table = name, "File has no header, skipping");
        return Ok(None);
    }

    let mut table = Table::new(name, columns);
    for record in rdr.records() {
        let record = record.map_err(csv_error)?;
        table.push_row(record.iter().map(str::to_string).collect());
    }

    debug!(table = name, rows = table.len(), "Table parsed");
    Ok(Some(table))
}

/// Reads every table of a zipped feed.
pub fn read_feed_archive<R: Read + Seek>(reader: R) -> Result<TableStore> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let mut store = TableStore::new();

    for i in 0..archive.len() {
        let file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let Some(name) = table_name(file.name()) else {
            continue;
        };
        if let Some(table) = parse_table(&name, file)? {
            store.insert_table(table);
        }
    }

    Ok(store)
}

/// Decodes a zipped feed held in memory.
pub fn parse_feed(bytes: &[u8]) -> Result<TableStore> {
    read_feed_archive(Cursor::new(bytes))
}

/// Reads every `.txt` table of an unzipped feed directory.
pub fn read_feed_directory(dir: &Path) -> Result<TableStore> {
    let mut store = TableStore::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.to_str().and_then(table_name) else {
            continue;
        };
        if let Some(table) = parse_table(&name, File::open(&path)?)? {
            store.insert_table(table);
        }
    }

    Ok(store)
}

/// Reads a feed from a zip file or a directory.
pub fn read_feed(path: &Path) -> Result<TableStore> {
    if path.is_dir() {
        read_feed_directory(path)
    } else if path.is_file() {
        read_feed_archive(File::open(path)?)
    } else {
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is neither a file nor a directory", path.display()),
        )))
    }
}

/// Loads a feed from a local path or fetches it over HTTP.
#[instrument]
pub fn load_feed(source: &str) -> Result<TableStore> {
    let store = if source.starts_with("http") {
        let bytes = fetch_bytes(source)?;
        debug!(bytes = bytes.len(), "Feed archive downloaded");
        parse_feed(&bytes)?
    } else {
        read_feed(Path::new(source))?
    };

    info!(tables = store.table_names().count(), "Feed loaded");
    Ok(store)
}
