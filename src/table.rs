//! In-memory relational store holding one feed.
//!
//! Each feed file becomes a [`Table`]: its header order is the schema and its
//! records are rows of string values aligned with that schema. Filters never
//! mutate a table in place; they build a replacement and commit it through
//! [`TableStore::update_table`], which guards the schema.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::error::{Error, Result};
use crate::time::{GtfsTime, parse_gtfs_date};

/// One record, one value per schema column.
pub type Row = Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a table from header and rows; short rows are padded with blanks.
    pub fn from_rows(name: impl Into<String>, columns: Vec<String>, rows: Vec<Row>) -> Self {
        let mut table = Self::new(name, columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, mut row: Row) {
        row.resize(self.columns.len(), String::new());
        self.rows.push(row);
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn column_index(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| Error::MissingColumn {
                table: self.name.clone(),
                column: column.to_string(),
            })
    }

    /// Appends a column filled with `default`. This changes the schema, so
    /// the result must be committed with `allow_schema_change`.
    pub fn add_column(&mut self, column: &str, default: &str) {
        self.columns.push(column.to_string());
        for row in &mut self.rows {
            row.push(default.to_string());
        }
    }

    /// Distinct non-blank values of `column`.
    pub fn key_set(&self, column: &str) -> Result<HashSet<&str>> {
        let idx = self.column_index(column)?;
        Ok(self
            .rows
            .iter()
            .map(|row| row[idx].as_str())
            .filter(|v| !v.is_empty())
            .collect())
    }

    /// Same schema, different rows.
    pub fn with_rows(&self, rows: Vec<Row>) -> Table {
        Table::from_rows(self.name.clone(), self.columns.clone(), rows)
    }

    /// Row-filter primitive: a new table with the same schema holding the
    /// rows `keep` accepts, in their original order.
    pub fn filter_rows<F>(&self, mut keep: F) -> Result<Table>
    where
        F: FnMut(usize, &Row) -> Result<bool>,
    {
        let mut rows = Vec::with_capacity(self.rows.len());
        for (i, row) in self.rows.iter().enumerate() {
            if keep(i, row)? {
                rows.push(row.clone());
            }
        }
        Ok(self.with_rows(rows))
    }

    fn invalid(&self, row: usize, column: usize, reason: &str) -> Error {
        Error::InvalidField {
            table: self.name.clone(),
            column: self.columns[column].clone(),
            row,
            value: self.rows[row][column].clone(),
            reason: reason.to_string(),
        }
    }

    /// Optional service time; blank yields `None`.
    pub fn parse_time(&self, row: usize, column: usize) -> Result<Option<GtfsTime>> {
        GtfsTime::parse_optional(&self.rows[row][column])
            .map_err(|_| self.invalid(row, column, "is not a valid time"))
    }

    /// Mandatory service time.
    pub fn parse_required_time(&self, row: usize, column: usize) -> Result<GtfsTime> {
        self.parse_time(row, column)?
            .ok_or_else(|| self.invalid(row, column, "is required"))
    }

    pub fn parse_date(&self, row: usize, column: usize) -> Result<NaiveDate> {
        parse_gtfs_date(&self.rows[row][column])
            .map_err(|_| self.invalid(row, column, "is not a valid YYYYMMDD date"))
    }

    pub fn parse_u32(&self, row: usize, column: usize) -> Result<u32> {
        self.rows[row][column]
            .trim()
            .parse()
            .map_err(|_| self.invalid(row, column, "is not a non-negative integer"))
    }
}

/// All tables of one feed, keyed by table name (file name without `.txt`).
#[derive(Debug, Clone, Default)]
pub struct TableStore {
    tables: BTreeMap<String, Table>,
}

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly loaded table, replacing any table of the same name.
    pub fn insert_table(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::MissingTable(name.to_string()))
    }

    pub fn get_columns(&self, name: &str) -> Result<&[String]> {
        Ok(self.get_table(name)?.columns())
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Row count of `name`, zero when the table is absent.
    pub fn row_count(&self, name: &str) -> usize {
        self.tables.get(name).map_or(0, Table::len)
    }

    /// Replaces the stored table. The column set must stay the same unless
    /// `allow_schema_change` is set.
    pub fn update_table(
        &mut self,
        name: &str,
        mut table: Table,
        allow_schema_change: bool,
    ) -> Result<()> {
        let stored = self
            .tables
            .get_mut(name)
            .ok_or_else(|| Error::MissingTable(name.to_string()))?;

        if !allow_schema_change {
            let expected: HashSet<&String> = stored.columns.iter().collect();
            let found: HashSet<&String> = table.columns.iter().collect();
            if expected != found {
                return Err(Error::SchemaViolation {
                    table: name.to_string(),
                    expected: stored.columns.clone(),
                    found: table.columns.clone(),
                });
            }
        }

        debug!(
            table = name,
            before = stored.len(),
            after = table.len(),
            "Table updated"
        );
        table.name = name.to_string();
        *stored = table;
        Ok(())
    }
}
