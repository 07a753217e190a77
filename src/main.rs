mod catalog;
mod error;
mod extract;
mod fetch;
mod merge;
mod record;
mod runner;
mod settings;

use std::path::PathBuf;
use std::borrow::Cow;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::catalog::FilterCatalog;
use crate::extract::SkuExtractor;
use crate::fetch::HttpFetcher;
use crate::record::{ColumnSeed, RecordStore};
use crate::runner::{RunSummary, Runner};
use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "sku_scraper", about = "Scrape catalog filter pages and merge SKUs into the master record")]
struct Cli {
    /// Settings file (default: ./sku_scraper.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Filter-site CSV (Group, Filter, URL)
    #[arg(long, global = true)]
    filters: Option<PathBuf>,
    /// Master record CSV
    #[arg(long, global = true)]
    record: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every filter and merge new SKUs into the master record
    Run {
        /// Merge in memory and report, without backup or write
        #[arg(long)]
        dry_run: bool,
        /// Only scrape the first N filters
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Log only, no progress bar
        #[arg(long)]
        no_progress: bool,
    },
    /// List filters and the URLs that will be fetched
    Catalog,
    /// SKU counts per filter in the latest SKU column
    Status,
    /// Append a new dated SKU column to the master record
    AddColumn {
        /// Column label (default: current month, e.g. "Oct '26")
        #[arg(long)]
        label: Option<String>,
        /// Start the column empty instead of copying the previous one
        #[arg(long)]
        empty: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(path) = cli.filters {
        settings.filter_sites = path;
    }
    if let Some(path) = cli.record {
        settings.master_record = path;
    }

    let catalog = FilterCatalog::new(&settings.filter_sites, &settings.page_size_suffix);
    let store = RecordStore::new(
        &settings.master_record,
        &settings.backup_suffix,
        &settings.sku_column_prefix,
    );

    let result = match cli.command {
        Commands::Run {
            dry_run,
            limit,
            no_progress,
        } => {
            let mut filters = catalog.load()?;
            if let Some(n) = limit {
                filters.truncate(n);
            }
            if filters.is_empty() {
                println!("No filters in {}.", catalog.path().display());
                return Ok(());
            }

            let fetcher = HttpFetcher::new(settings.timeout(), &settings.user_agent)
                .context("Failed to build HTTP client")?;
            let extractor = SkuExtractor::new(&settings.selector)?;
            let mut runner = Runner::new(fetcher, extractor);
            if no_progress {
                runner = runner.without_progress();
            }

            println!("Scraping {} filters...", filters.len());
            let summary = runner.run(&filters, &store, dry_run).await?;
            print_summary(&summary, dry_run);
            Ok(())
        }
        Commands::Catalog => {
            let filters = catalog.load()?;
            if filters.is_empty() {
                println!("No filters in {}.", catalog.path().display());
                return Ok(());
            }
            println!("{:>3} | {:<20} | {:<28} | URL", "#", "Group", "Filter");
            println!("{}", "-".repeat(100));
            for (i, def) in filters.iter().enumerate() {
                println!(
                    "{:>3} | {:<20} | {:<28} | {}",
                    i + 1,
                    clip(&def.key.group, 20),
                    clip(&def.key.filter, 28),
                    def.url
                );
            }
            println!("\n{} filters", filters.len());
            Ok(())
        }
        Commands::Status => {
            let (column, rows) = store.summary()?;
            println!("{:>3} | {:<20} | {:<28} | {:>5}", "#", "Group", "Filter", "SKUs");
            println!("{}", "-".repeat(66));
            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<20} | {:<28} | {:>5}",
                    i + 1,
                    clip(&r.key.group, 20),
                    clip(&r.key.filter, 28),
                    r.sku_count
                );
            }
            let total: usize = rows.iter().map(|r| r.sku_count).sum();
            println!("\n{} filters | {} SKUs | column: {}", rows.len(), total, column);
            Ok(())
        }
        Commands::AddColumn { label, empty } => {
            let label = label.unwrap_or_else(|| chrono::Local::now().format("%b '%y").to_string());
            let seed = if empty { ColumnSeed::Empty } else { ColumnSeed::Carry };
            let name = store.add_column(&label, seed)?;
            println!("Added column '{}' to {}.", name, store.path().display());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", elapsed_label(elapsed));
    }

    result
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    let scrape = &summary.scrape;
    let report = &summary.update.report;

    println!(
        "Processed {} filters ({} failed, {} with no SKUs).",
        scrape.total,
        scrape.failed.len(),
        scrape.empty.len()
    );
    for key in &scrape.failed {
        println!("  fetch failed: {}", key);
    }
    for key in &report.unmatched {
        println!("  no master row: {}", key);
    }

    let verb = if dry_run { "would change" } else { "changed" };
    println!(
        "{} row(s) {} in '{}' ({} SKUs added).",
        report.rows_changed(),
        verb,
        summary.update.column,
        report.identifiers_added
    );
    if let Some(backup) = &summary.update.backup {
        println!("Backup: {}", backup.display());
    }
}

/// Fit a cell into a fixed-width column; a clipped value ends in `~`.
fn clip(s: &str, width: usize) -> Cow<'_, str> {
    match s.char_indices().nth(width) {
        None => Cow::Borrowed(s),
        Some(_) => {
            let cut = s.char_indices().nth(width.saturating_sub(1)).map_or(0, |(i, _)| i);
            Cow::Owned(format!("{}~", &s[..cut]))
        }
    }
}

fn elapsed_label(d: Duration) -> String {
    let secs = d.as_secs();
    match (secs / 3600, secs % 3600 / 60, secs % 60) {
        (0, 0, _) => format!("{:.1}s", d.as_secs_f64()),
        (0, m, s) => format!("{m}m{s:02}s"),
        (h, m, s) => format!("{h}h{m:02}m{s:02}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_keeps_column_width() {
        assert_eq!(clip("Trousers", 20), "Trousers");
        assert_eq!(clip("Holster", 7), "Holster");
        assert_eq!(clip("Holster Trousers", 7), "Holste~");
        assert_eq!(clip("Holster Trousers", 7).chars().count(), 7);
        assert_eq!(clip("Überhosen", 3), "Üb~");
    }

    #[test]
    fn elapsed_label_units() {
        assert_eq!(elapsed_label(Duration::from_millis(4_300)), "4.3s");
        assert_eq!(elapsed_label(Duration::from_secs(65)), "1m05s");
        assert_eq!(elapsed_label(Duration::from_secs(3_600 + 120 + 7)), "1h02m07s");
    }
}
