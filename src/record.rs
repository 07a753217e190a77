use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::info;

use crate::catalog::{has_key_header, FilterKey};
use crate::error::RecordError;
use crate::merge::{self, ReconcileReport, ScrapeResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub cells: Vec<String>,
}

impl Row {
    pub fn new(cells: Vec<String>) -> Self {
        Row { cells }
    }

    pub fn key(&self) -> FilterKey {
        FilterKey::new(self.cell(0), self.cell(1))
    }

    /// Cell text, or `""` past the end of a short row.
    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn set_cell(&mut self, index: usize, value: String) {
        self.pad_to(index + 1);
        self.cells[index] = value;
    }

    fn pad_to(&mut self, len: usize) {
        if self.cells.len() < len {
            self.cells.resize(len, String::new());
        }
    }
}

/// The persisted per-filter table. Columns other than the key and the
/// identifier column are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterRecord {
    pub header: Vec<String>,
    pub rows: Vec<Row>,
}

/// Cell contents of a column added by [`RecordStore::add_column`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSeed {
    /// Copy each row's latest identifier cell.
    Carry,
    Empty,
}

#[derive(Debug)]
pub struct UpdateOutcome {
    pub column: String,
    pub backup: Option<PathBuf>,
    pub report: ReconcileReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSummary {
    pub key: FilterKey,
    pub sku_count: usize,
}

pub struct RecordStore {
    path: PathBuf,
    backup_suffix: String,
    column_prefix: String,
}

impl RecordStore {
    pub fn new(
        path: impl Into<PathBuf>,
        backup_suffix: impl Into<String>,
        column_prefix: impl Into<String>,
    ) -> Self {
        RecordStore {
            path: path.into(),
            backup_suffix: backup_suffix.into(),
            column_prefix: column_prefix.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut p: OsString = self.path.as_os_str().to_owned();
        p.push(&self.backup_suffix);
        PathBuf::from(p)
    }

    pub fn load(&self) -> Result<MasterRecord, RecordError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|source| self.csv_error(source))?;

        let mut records = reader.records();
        let header: Vec<String> = match records.next() {
            Some(record) => record
                .map_err(|source| self.csv_error(source))?
                .iter()
                .map(str::to_string)
                .collect(),
            None => return Err(self.schema_error("file is empty")),
        };
        let names: Vec<&str> = header.iter().map(String::as_str).collect();
        if !has_key_header(&names) {
            return Err(self.schema_error(
                "unexpected header format, expected 'Group' and 'Filter' as first columns",
            ));
        }

        let rows = records
            .map(|record| {
                record
                    .map(|r| Row::new(r.iter().map(str::to_string).collect()))
                    .map_err(|source| self.csv_error(source))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MasterRecord { header, rows })
    }

    /// Rightmost header column whose name starts with the identifier prefix.
    pub fn locate_identifier_column(&self, header: &[String]) -> Result<usize, RecordError> {
        header
            .iter()
            .rposition(|name| name.trim().starts_with(&self.column_prefix))
            .ok_or_else(|| {
                self.schema_error(&format!("no '{}' column found", self.column_prefix))
            })
    }

    /// Copy the record to its backup path, replacing any earlier backup.
    pub fn backup(&self) -> Result<PathBuf, RecordError> {
        let backup = self.backup_path();
        if backup == self.path {
            return Err(RecordError::Io {
                path: backup,
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "backup path is the record itself; set a non-empty backup suffix",
                ),
            });
        }
        info!("Backing up {} to {}", self.path.display(), backup.display());
        fs::copy(&self.path, &backup).map_err(|source| RecordError::Io {
            path: backup.clone(),
            source,
        })?;
        Ok(backup)
    }

    /// Rewrite the whole file. Rows shorter than `column` are padded through it.
    /// Written beside the record and renamed over it.
    pub fn save(&self, record: &MasterRecord, column: usize) -> Result<(), RecordError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let tmp = NamedTempFile::new_in(dir).map_err(|source| self.io_error(source))?;

        {
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .from_writer(tmp.as_file());
            writer
                .write_record(&record.header)
                .map_err(|source| self.csv_error(source))?;
            for row in &record.rows {
                let mut row = row.clone();
                row.pad_to(column + 1);
                writer
                    .write_record(&row.cells)
                    .map_err(|source| self.csv_error(source))?;
            }
            writer.flush().map_err(|source| self.io_error(source))?;
        }

        if let Ok(meta) = fs::metadata(&self.path) {
            fs::set_permissions(tmp.path(), meta.permissions())
                .map_err(|source| self.io_error(source))?;
        }
        tmp.persist(&self.path)
            .map_err(|e| self.io_error(e.error))?;
        Ok(())
    }

    /// Back up, merge `scrape` into the latest identifier column, and save.
    pub fn update(&self, scrape: &ScrapeResult) -> Result<UpdateOutcome, RecordError> {
        info!("Updating {}", self.path.display());
        let backup = self.backup()?;
        let mut record = self.load()?;
        let column = self.locate_identifier_column(&record.header)?;
        info!("Found SKU column '{}' at index {}", record.header[column], column);

        let report = merge::reconcile(&mut record, column, scrape);
        self.save(&record, column)?;
        Ok(UpdateOutcome {
            column: record.header[column].clone(),
            backup: Some(backup),
            report,
        })
    }

    /// Same merge as [`update`](Self::update) without touching the disk.
    pub fn preview(&self, scrape: &ScrapeResult) -> Result<UpdateOutcome, RecordError> {
        let mut record = self.load()?;
        let column = self.locate_identifier_column(&record.header)?;
        let report = merge::reconcile(&mut record, column, scrape);
        Ok(UpdateOutcome {
            column: record.header[column].clone(),
            backup: None,
            report,
        })
    }

    /// Append a new identifier column named `"{prefix} ({label})"`.
    /// Returns the new column's name.
    pub fn add_column(&self, label: &str, seed: ColumnSeed) -> Result<String, RecordError> {
        let mut record = self.load()?;
        let name = format!("{} ({})", self.column_prefix, label);
        if record.header.iter().any(|h| h.trim() == name) {
            return Err(self.schema_error(&format!("column '{name}' already exists")));
        }
        let previous = self.locate_identifier_column(&record.header).ok();
        // Rows wider than the header carry unnamed cells; append past them.
        let widest = record.rows.iter().map(|r| r.cells.len()).max().unwrap_or(0);
        let column = record.header.len().max(widest);
        record.header.resize(column, String::new());

        for row in record.rows.iter_mut() {
            let cell = match (seed, previous) {
                (ColumnSeed::Carry, Some(prev)) => merge::merge::<String>(row.cell(prev), &[]).cell,
                _ => String::new(),
            };
            row.set_cell(column, cell);
        }
        record.header.push(name.clone());

        self.backup()?;
        self.save(&record, column)?;
        info!("Added column '{}' at index {}", name, column);
        Ok(name)
    }

    /// Identifier counts of the authoritative column, in record order.
    pub fn summary(&self) -> Result<(String, Vec<RowSummary>), RecordError> {
        let record = self.load()?;
        let column = self.locate_identifier_column(&record.header)?;
        let rows = record
            .rows
            .iter()
            .map(|row| RowSummary {
                key: row.key(),
                sku_count: merge::split_cell(row.cell(column)).count(),
            })
            .collect();
        Ok((record.header[column].clone(), rows))
    }

    fn schema_error(&self, detail: &str) -> RecordError {
        RecordError::Schema {
            path: self.path.clone(),
            detail: detail.to_string(),
        }
    }

    fn io_error(&self, source: io::Error) -> RecordError {
        RecordError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_error(&self, source: csv::Error) -> RecordError {
        RecordError::Csv {
            path: self.path.clone(),
            source,
        }
    }
}
