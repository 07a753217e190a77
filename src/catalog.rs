use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::CatalogError;

/// Row identity in both the filter-site input and the master record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterKey {
    pub group: String,
    pub filter: String,
}

impl FilterKey {
    pub fn new(group: &str, filter: &str) -> Self {
        FilterKey {
            group: group.trim().to_string(),
            filter: filter.trim().to_string(),
        }
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {}", self.group, self.filter)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDefinition {
    pub key: FilterKey,
    pub url: String,
}

/// Loads filter definitions from the filter-site CSV.
pub struct FilterCatalog {
    path: PathBuf,
    page_size_suffix: String,
}

impl FilterCatalog {
    pub fn new(path: impl Into<PathBuf>, page_size_suffix: impl Into<String>) -> Self {
        FilterCatalog {
            path: path.into(),
            page_size_suffix: page_size_suffix.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Definitions in input order. A repeated key keeps its first position and
    /// takes the URL of its last occurrence.
    pub fn load(&self) -> Result<Vec<FilterDefinition>, CatalogError> {
        info!("Reading filter links from {}", self.path.display());
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|source| self.read_error(source))?;

        let mut records = reader.records();
        let header = match records.next() {
            Some(record) => record.map_err(|source| self.read_error(source))?,
            None => return Err(self.format_error("file is empty")),
        };
        let header: Vec<&str> = header.iter().collect();
        if !has_key_header(&header) {
            return Err(self.format_error("expected 'Group' and 'Filter' as first columns"));
        }

        let mut definitions: Vec<FilterDefinition> = Vec::new();
        for (line, record) in records.enumerate() {
            let record = record.map_err(|source| self.read_error(source))?;
            if record.len() < 3 {
                debug!(line = line + 2, "skipping short filter row");
                continue;
            }
            let key = FilterKey::new(&record[0], &record[1]);
            let url = self.query_url(&record[2]);
            match definitions.iter_mut().find(|d| d.key == key) {
                Some(existing) => existing.url = url,
                None => definitions.push(FilterDefinition { key, url }),
            }
        }

        info!("Loaded {} filters", definitions.len());
        Ok(definitions)
    }

    fn query_url(&self, base: &str) -> String {
        format!("{}{}", base.trim(), self.page_size_suffix)
    }

    fn format_error(&self, detail: &str) -> CatalogError {
        CatalogError::Format {
            path: self.path.clone(),
            detail: detail.to_string(),
        }
    }

    fn read_error(&self, source: csv::Error) -> CatalogError {
        CatalogError::Read {
            path: self.path.clone(),
            source,
        }
    }
}

/// `Group` and `Filter` (trimmed, any case) in the first two columns.
pub fn has_key_header(header: &[&str]) -> bool {
    header.len() >= 2
        && header[0].trim().eq_ignore_ascii_case("Group")
        && header[1].trim().eq_ignore_ascii_case("Filter")
}
