use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::catalog::{FilterDefinition, FilterKey};
use crate::extract::Extractor;
use crate::fetch::Fetcher;
use crate::merge::ScrapeResult;
use crate::record::{RecordStore, UpdateOutcome};

/// Per-run counts for the final report.
#[derive(Debug, Default)]
pub struct ScrapeStats {
    pub total: usize,
    pub failed: Vec<FilterKey>,
    pub empty: Vec<FilterKey>,
}

#[derive(Debug)]
pub struct RunSummary {
    pub scrape: ScrapeStats,
    pub update: UpdateOutcome,
}

pub struct Runner<F, E> {
    fetcher: F,
    extractor: E,
    show_progress: bool,
}

impl<F: Fetcher, E: Extractor> Runner<F, E> {
    pub fn new(fetcher: F, extractor: E) -> Self {
        Runner {
            fetcher,
            extractor,
            show_progress: true,
        }
    }

    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// Fetch and extract every filter in order. A failed fetch counts as zero
    /// identifiers for that filter and never stops the run.
    pub async fn scrape(&self, filters: &[FilterDefinition]) -> Result<(ScrapeResult, ScrapeStats)> {
        let total = filters.len();
        let pb = if self.show_progress {
            ProgressBar::new(total as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
                .progress_chars("=> "),
        );

        let mut result = ScrapeResult::new();
        let mut stats = ScrapeStats {
            total,
            ..Default::default()
        };

        for (i, def) in filters.iter().enumerate() {
            info!("({}/{}) Scraping {}...", i + 1, total, def.key);
            let skus = match self.fetcher.fetch(&def.url).await {
                Ok(document) => self.extractor.extract(&document),
                Err(e) => {
                    warn!("Failed to fetch {}: {}", def.key, e);
                    stats.failed.push(def.key.clone());
                    Vec::new()
                }
            };

            if skus.is_empty() {
                warn!("No SKUs found for {}", def.key);
                stats.empty.push(def.key.clone());
            } else {
                info!("Total SKUs for {}: {}", def.key, skus.len());
            }
            result.insert(def.key.clone(), skus);
            pb.inc(1);
        }

        pb.finish_and_clear();
        info!(
            "Scraped {} filters ({} failed, {} empty)",
            total,
            stats.failed.len(),
            stats.empty.len()
        );
        Ok((result, stats))
    }

    /// Scrape, then merge into the record once. `dry_run` skips backup and write.
    pub async fn run(
        &self,
        filters: &[FilterDefinition],
        store: &RecordStore,
        dry_run: bool,
    ) -> Result<RunSummary> {
        let (result, scrape) = self.scrape(filters).await?;

        let update = if dry_run {
            store.preview(&result)
        } else {
            store.update(&result)
        }
        .with_context(|| format!("Failed to update {}", store.path().display()))?;

        Ok(RunSummary { scrape, update })
    }
}
