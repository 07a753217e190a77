use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const DEFAULT_CONFIG_FILE: &str = "sku_scraper";
const ENV_PREFIX: &str = "SKU";

/// Runtime settings. Resolved from defaults, then an optional TOML file,
/// then `SKU_*` environment variables; CLI flags are applied on top by `main`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub filter_sites: PathBuf,
    pub master_record: PathBuf,
    pub backup_suffix: String,
    /// Appended verbatim to every filter URL to request a larger result page.
    pub page_size_suffix: String,
    pub selector: String,
    pub sku_column_prefix: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Settings {
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match config_file {
            Some(path) => File::from(path.to_path_buf()).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        Config::builder()
            .set_default("filter_sites", "FilterSites.csv")?
            .set_default("master_record", "Filters.csv")?
            .set_default("backup_suffix", ".bak")?
            .set_default("page_size_suffix", "&page=30")?
            .set_default("selector", "article div div span")?
            .set_default("sku_column_prefix", "SKUs")?
            .set_default("timeout_secs", 30)?
            .set_default("user_agent", concat!("sku_scraper/", env!("CARGO_PKG_VERSION")))?
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
