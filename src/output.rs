//! Feed writer and run report persistence.
//!
//! Tables are written back with their stored column order, either into a
//! directory of `.txt` files or into a zip archive.

use csv::WriterBuilder;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::stats::SubsetStats;
use crate::table::{Table, TableStore};

fn csv_error(table: &Table) -> impl Fn(csv::Error) -> Error + '_ {
    move |source| Error::Csv {
        file: format!("{}.txt", table.name()),
        source,
    }
}

/// Writes one table as CSV, header first.
pub fn write_table<W: Write>(table: &Table, writer: W) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(writer);
    writer
        .write_record(table.columns())
        .map_err(csv_error(table))?;
    for row in table.rows() {
        writer.write_record(row).map_err(csv_error(table))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes every table of `store`. A path ending in `.zip` produces an
/// archive, anything else a directory.
#[instrument(skip(store), fields(path = %path.display()))]
pub fn write_feed(store: &TableStore, path: &Path) -> Result<()> {
    let is_zip = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));

    if is_zip {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut zip = zip::ZipWriter::new(File::create(path)?);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for table in store.tables() {
            zip.start_file(format!("{}.txt", table.name()), options)?;
            write_table(table, &mut zip)?;
        }
        zip.finish()?;
    } else {
        fs::create_dir_all(path)?;
        for table in store.tables() {
            let file = File::create(path.join(format!("{}.txt", table.name())))?;
            write_table(table, file)?;
        }
    }

    info!(tables = store.table_names().count(), "Feed written");
    Ok(())
}

/// Logs run statistics as pretty-printed JSON.
pub fn print_json(stats: &impl serde::Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(stats)?);
    Ok(())
}

/// Appends a [`SubsetStats`] record as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record(path: &Path, stats: &SubsetStats) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending CSV record");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let report_error = |source| Error::Csv {
        file: path.display().to_string(),
        source,
    };
    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(stats).map_err(report_error)?;
    writer.flush()?;

    Ok(())
}
