use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::error::ExtractError;

static SKU_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{4}$").unwrap());

/// Pulls identifier tokens out of a fetched document.
pub trait Extractor {
    /// Identifiers in document order, duplicates included.
    fn extract(&self, document: &str) -> Vec<String>;
}

/// Elements matching a CSS selector whose whole text is a four-digit SKU.
pub struct SkuExtractor {
    selector: Selector,
}

impl SkuExtractor {
    pub fn new(selector: &str) -> Result<Self, ExtractError> {
        let parsed = Selector::parse(selector).map_err(|e| ExtractError::Selector {
            selector: selector.to_string(),
            detail: e.to_string(),
        })?;
        Ok(SkuExtractor { selector: parsed })
    }
}

impl Extractor for SkuExtractor {
    fn extract(&self, document: &str) -> Vec<String> {
        let html = Html::parse_document(document);
        html.select(&self.selector)
            .map(|el| normalize_ws(&el.text().collect::<String>()))
            .filter(|text| SKU_RE.is_match(text))
            .collect()
    }
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
