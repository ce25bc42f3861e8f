use crate::error::IngestError;
use regex::Regex;

/// Markup spans are matched leftmost and non-greedy; `(?s)` lets a span cross
/// line breaks so a second pass never finds a tag the first one missed.
const MARKUP_PATTERN: &str = r"(?s)<.*?>";

/// Strips `<...>` markup and collapses whitespace in raw field values.
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    markup: Regex,
}

impl TextNormalizer {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            markup: Regex::new(MARKUP_PATTERN)?,
        })
    }

    pub fn normalize(&self, raw: &str) -> String {
        let stripped = self.markup.replace_all(raw, "");
        normalize_whitespace(&stripped)
    }

    /// Missing values (empty cells) normalize to an empty string.
    pub fn normalize_value(&self, raw: Option<&str>) -> String {
        raw.map(|value| self.normalize(value)).unwrap_or_default()
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
