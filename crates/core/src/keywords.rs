use crate::error::IngestError;
use crate::normalize::TextNormalizer;
use crate::table::Row;
use regex::Regex;
use std::collections::BTreeSet;

const SEPARATOR_PATTERN: &str = r"[,;]\s*|\[|\]|\s*;\s*";

/// Splits tag-like columns into a lower-cased, de-duplicated keyword set.
#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    separators: Regex,
    normalizer: TextNormalizer,
}

impl KeywordExtractor {
    pub fn new(normalizer: TextNormalizer) -> Result<Self, IngestError> {
        Ok(Self {
            separators: Regex::new(SEPARATOR_PATTERN)?,
            normalizer,
        })
    }

    pub fn extract(&self, row: &Row<'_>, columns: &[&str]) -> BTreeSet<String> {
        let mut keywords = BTreeSet::new();
        for column in columns {
            if let Some(value) = row.get(column) {
                self.extend_from(value, &mut keywords);
            }
        }
        keywords
    }

    pub fn extend_from(&self, value: &str, keywords: &mut BTreeSet<String>) {
        for fragment in self.separators.split(value) {
            let cleaned = self.normalizer.normalize(fragment);
            let cleaned = cleaned.trim();
            if !cleaned.is_empty() {
                keywords.insert(cleaned.to_lowercase());
            }
        }
    }
}
