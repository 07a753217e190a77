use std::path::PathBuf;

use thiserror::Error;

/// Failure to retrieve one filter page. Never fatal for a run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid selector '{selector}': {detail}")]
    Selector { selector: String, detail: String },
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{}: unexpected header format ({detail})", path.display())]
    Format { path: PathBuf, detail: String },
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("{}: {detail}", path.display())]
    Schema { path: PathBuf, detail: String },
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error on {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}
