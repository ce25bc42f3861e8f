use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// A normalized document as written to the JSON collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "texto")]
    pub body: String,
    #[serde(rename = "palavrasChave", default)]
    pub keywords: BTreeSet<String>,
}

impl DocumentRecord {
    pub fn embedding_input(&self) -> String {
        format!("{}: {}", self.title, self.body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub titulo: String,
    pub texto: String,
}

/// What the loader submits to the vector store for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorEntry {
    /// Position of the record in the load order.
    pub position: u64,
    pub id: String,
    pub document: String,
    pub metadata: EntryMetadata,
}

impl VectorEntry {
    pub fn from_record(position: u64, record: &DocumentRecord) -> Self {
        Self {
            position,
            id: record.id.clone(),
            document: record.embedding_input(),
            metadata: EntryMetadata {
                titulo: record.title.clone(),
                texto: record.body.clone(),
            },
        }
    }
}

/// A ranked match as returned by a vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreMatch {
    pub id: String,
    pub score: f64,
    pub titulo: Option<String>,
    pub texto: Option<String>,
}

/// One item of the `/search` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub titulo: Option<String>,
    pub texto: Option<String>,
}

impl From<StoreMatch> for SearchHit {
    fn from(value: StoreMatch) -> Self {
        Self {
            id: value.id,
            titulo: value.titulo,
            texto: value.texto,
        }
    }
}

pub const SPLIT_PART_MARKER: &str = "_parte_";

#[derive(Debug, Clone)]
pub struct SplitOptions {
    pub max_bytes: u64,
    pub rows_per_block: usize,
    pub delimiter: u8,
}

impl SplitOptions {
    pub fn from_megabytes(max_mb: u64) -> Self {
        Self {
            max_bytes: max_mb.saturating_mul(1024 * 1024),
            ..Self::default()
        }
    }
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            max_bytes: 90 * 1024 * 1024,
            rows_per_block: 1_000,
            delimiter: crate::table::DEFAULT_DELIMITER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub batch_size: usize,
    /// Applied after each batch only when the store embeds through a
    /// rate-limited remote API.
    pub pacing_delay: Duration,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: 256,
            pacing_delay: Duration::from_secs(1),
        }
    }
}

pub const DEFAULT_NUM_RESULTS: usize = 15;
