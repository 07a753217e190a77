//! Reconciliation of freshly scraped identifiers against the master record.
//!
//! Records are append-only per filter: an identifier that disappears from a
//! live page is never removed, and re-merging the same scrape is a no-op.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{info, warn};

use crate::catalog::FilterKey;
use crate::record::MasterRecord;

pub const CELL_DELIMITER: &str = ", ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub cell: String,
    pub changed: bool,
    pub added: usize,
}

/// Union `new` into the identifiers already in `existing`, sorted lexically.
pub fn merge<S: AsRef<str>>(existing: &str, new: &[S]) -> MergeOutcome {
    let mut set: BTreeSet<String> = split_cell(existing).collect();
    let original = set.len();

    for item in new {
        set.extend(split_cell(item.as_ref()));
    }

    let added = set.len() - original;
    let cell = set.into_iter().collect::<Vec<_>>().join(CELL_DELIMITER);
    MergeOutcome {
        cell,
        changed: added > 0,
        added,
    }
}

/// Identifiers in a delimited cell; empty pieces are dropped.
pub fn split_cell(cell: &str) -> impl Iterator<Item = String> + '_ {
    cell.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Identifiers found per filter during one run, in scrape order.
#[derive(Debug, Default, Clone)]
pub struct ScrapeResult {
    entries: Vec<(FilterKey, Vec<String>)>,
    index: HashMap<FilterKey, usize>,
}

impl ScrapeResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the identifiers of a key already present, keeping its position.
    pub fn insert(&mut self, key: FilterKey, skus: Vec<String>) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = skus,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, skus));
            }
        }
    }

    pub fn get(&self, key: &FilterKey) -> Option<&[String]> {
        self.index.get(key).map(|&i| self.entries[i].1.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &FilterKey> {
        self.entries.iter().map(|(k, _)| k)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Keys of rows that gained identifiers, in record order.
    pub changed: Vec<FilterKey>,
    pub identifiers_added: usize,
    /// Scraped keys with no row in the record. They are never inserted.
    pub unmatched: Vec<FilterKey>,
}

impl ReconcileReport {
    pub fn rows_changed(&self) -> usize {
        self.changed.len()
    }
}

/// Merge `scrape` into the identifier column `column` of `record`.
///
/// Rows without a scrape entry are left untouched. Rows sharing a key are
/// merged independently.
pub fn reconcile(record: &mut MasterRecord, column: usize, scrape: &ScrapeResult) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let mut matched: HashSet<FilterKey> = HashSet::new();

    for row in record.rows.iter_mut() {
        let key = row.key();
        let Some(new) = scrape.get(&key) else {
            continue;
        };
        matched.insert(key.clone());

        let existing = row.cell(column).trim().to_string();
        let outcome = merge(&existing, new);
        if outcome.changed {
            info!(
                group = %key.group,
                filter = %key.filter,
                added = outcome.added,
                "Added SKUs for row"
            );
            report.identifiers_added += outcome.added;
            report.changed.push(key);
        }
        row.set_cell(column, outcome.cell);
    }

    for key in scrape.keys() {
        if !matched.contains(key) {
            warn!("No master record row for {}", key);
            report.unmatched.push(key.clone());
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Row;

    fn skus(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn dedup() {
        let out = merge("1001, 1002", &skus(&["1002", "1003", "1002"]));
        assert_eq!(out.cell, "1001, 1002, 1003");
        assert!(out.changed);
        assert_eq!(out.added, 1);
    }

    #[test]
    fn no_new_identifiers() {
        let out = merge::<String>("1001, 1002", &[]);
        assert_eq!(out.cell, "1001, 1002");
        assert!(!out.changed);
    }

    #[test]
    fn lexical_not_numeric_order() {
        let out = merge("", &skus(&["2000", "100", "300"]));
        assert_eq!(out.cell, "100, 2000, 300");
        assert!(out.changed);
    }

    #[test]
    fn both_empty() {
        let out = merge::<String>("", &[]);
        assert_eq!(out.cell, "");
        assert!(!out.changed);
        assert_eq!(out.added, 0);
    }

    #[test]
    fn idempotent() {
        let cases: &[(&str, &[&str])] = &[
            ("", &["2000", "100", "300"]),
            ("1001, 1002", &["1002", "1003", "1002"]),
            ("9999,1000 ,  5000", &["5000", " 1234 "]),
            ("4000", &[]),
        ];
        for (existing, new) in cases {
            let new = skus(new);
            let first = merge(existing, &new);
            let second = merge(&first.cell, &new);
            assert_eq!(second.cell, first.cell, "case {existing:?}");
            assert!(!second.changed, "case {existing:?}");
        }
    }

    #[test]
    fn never_shrinks() {
        let existing = "3000, 1000, 2000";
        let out = merge(existing, &skus(&["2000"]));
        let result: BTreeSet<String> = split_cell(&out.cell).collect();
        for sku in split_cell(existing) {
            assert!(result.contains(&sku), "{sku} lost");
        }
        assert_eq!(out.cell, "1000, 2000, 3000");
        assert!(!out.changed);
    }

    #[test]
    fn messy_cells_normalised() {
        let out = merge(" 1002,,1001 ,", &skus(&["1003, 1004", ""]));
        assert_eq!(out.cell, "1001, 1002, 1003, 1004");
        assert_eq!(out.added, 2);
    }

    fn record(rows: &[&[&str]]) -> MasterRecord {
        MasterRecord {
            header: skus(&["Group", "Filter", "SKUs (Jan '24)"]),
            rows: rows.iter().map(|r| Row::new(skus(r))).collect(),
        }
    }

    #[test]
    fn reconcile_updates_matching_rows_only() {
        let mut rec = record(&[
            &["Trousers", "Holster", "1002,1001"],
            &["Jackets", "Shell", "2002,2001"],
        ]);
        let mut scrape = ScrapeResult::new();
        scrape.insert(FilterKey::new("Trousers", "Holster"), skus(&["1003"]));

        let report = reconcile(&mut rec, 2, &scrape);
        assert_eq!(report.changed, vec![FilterKey::new("Trousers", "Holster")]);
        assert_eq!(report.rows_changed(), 1);
        assert_eq!(report.identifiers_added, 1);
        assert_eq!(rec.rows[0].cell(2), "1001, 1002, 1003");
        // untouched, not even re-sorted
        assert_eq!(rec.rows[1].cell(2), "2002,2001");
    }

    #[test]
    fn reconcile_pads_short_rows() {
        let mut rec = record(&[&["Trousers", "Holster"]]);
        let mut scrape = ScrapeResult::new();
        scrape.insert(FilterKey::new("Trousers", "Holster"), skus(&["1001"]));

        let report = reconcile(&mut rec, 2, &scrape);
        assert_eq!(report.rows_changed(), 1);
        assert_eq!(rec.rows[0].cells, skus(&["Trousers", "Holster", "1001"]));
    }

    #[test]
    fn reconcile_matches_trimmed_keys() {
        let mut rec = record(&[&[" Trousers ", "Holster  ", "1001"]]);
        let mut scrape = ScrapeResult::new();
        scrape.insert(FilterKey::new("Trousers", "Holster"), skus(&["1001", "1005"]));

        let report = reconcile(&mut rec, 2, &scrape);
        assert_eq!(report.rows_changed(), 1);
        assert_eq!(rec.rows[0].cell(2), "1001, 1005");
        assert_eq!(rec.rows[0].cell(0), " Trousers ");
    }

    #[test]
    fn reconcile_reports_unmatched_keys() {
        let mut rec = record(&[&["Trousers", "Holster", "1001"]]);
        let mut scrape = ScrapeResult::new();
        scrape.insert(FilterKey::new("Gloves", "Winter"), skus(&["3001"]));

        let report = reconcile(&mut rec, 2, &scrape);
        assert_eq!(report.unmatched, vec![FilterKey::new("Gloves", "Winter")]);
        assert_eq!(rec.rows.len(), 1);
        assert_eq!(rec.rows[0].cell(2), "1001");
    }

    #[test]
    fn reconcile_twice_changes_nothing() {
        let mut rec = record(&[&["Trousers", "Holster", "1001"]]);
        let mut scrape = ScrapeResult::new();
        scrape.insert(FilterKey::new("Trousers", "Holster"), skus(&["1002"]));

        reconcile(&mut rec, 2, &scrape);
        let again = reconcile(&mut rec, 2, &scrape);
        assert_eq!(again.rows_changed(), 0);
        assert_eq!(rec.rows[0].cell(2), "1001, 1002");
    }

    #[test]
    fn scrape_result_insert_replaces_in_place() {
        let mut scrape = ScrapeResult::new();
        scrape.insert(FilterKey::new("A", "B"), skus(&["1"]));
        scrape.insert(FilterKey::new("C", "D"), skus(&["2"]));
        scrape.insert(FilterKey::new("A", "B"), skus(&["3"]));
        assert_eq!(scrape.keys().count(), 2);
        assert_eq!(scrape.get(&FilterKey::new("A", "B")).unwrap(), ["3".to_string()]);
        assert_eq!(scrape.keys().next(), Some(&FilterKey::new("A", "B")));
    }
}
