//! In-memory [`VectorIndex`] for tests and dry runs.
//!
//! Entries live in a `Vec` behind a `RwLock`; queries are brute-force cosine
//! similarity over every stored vector.

use crate::embeddings::Embedder;
use crate::traits::VectorIndex;
use crate::{SearchError, StoreMatch, VectorEntry};
use async_trait::async_trait;
use std::sync::RwLock;

struct StoredEntry {
    entry: VectorEntry,
    vector: Vec<f32>,
}

pub struct InMemoryCollection {
    embedder: Box<dyn Embedder>,
    entries: RwLock<Vec<StoredEntry>>,
}

impl InMemoryCollection {
    pub fn new(embedder: Box<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    fn poisoned() -> SearchError {
        SearchError::Request("in-memory collection lock poisoned".to_string())
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[async_trait]
impl VectorIndex for InMemoryCollection {
    async fn count(&self) -> Result<u64, SearchError> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries.len() as u64)
    }

    async fn add(&self, entries: &[VectorEntry]) -> Result<(), SearchError> {
        let documents: Vec<String> = entries.iter().map(|entry| entry.document.clone()).collect();
        let vectors = self.embedder.embed_batch(&documents).await?;

        let mut stored = self.entries.write().map_err(|_| Self::poisoned())?;
        for (entry, vector) in entries.iter().zip(vectors) {
            stored.push(StoredEntry {
                entry: entry.clone(),
                vector,
            });
        }
        Ok(())
    }

    async fn query(&self, text: &str, limit: usize) -> Result<Vec<StoreMatch>, SearchError> {
        let query_vector = self.embedder.embed_one(text).await?;
        let stored = self.entries.read().map_err(|_| Self::poisoned())?;

        let mut scored: Vec<(f32, &StoredEntry)> = stored
            .iter()
            .map(|item| (cosine_sim(&query_vector, &item.vector), item))
            .collect();
        scored.sort_by(|left, right| right.0.total_cmp(&left.0));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, item)| StoreMatch {
                id: item.entry.id.clone(),
                score: f64::from(score),
                titulo: Some(item.entry.metadata.titulo.clone()),
                texto: Some(item.entry.metadata.texto.clone()),
            })
            .collect())
    }

    fn is_rate_limited(&self) -> bool {
        self.embedder.is_rate_limited()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::{DocumentRecord, VectorEntry};

    fn record(id: &str, title: &str, body: &str) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            keywords: Default::default(),
        }
    }

    #[tokio::test]
    async fn closest_entry_ranks_first() -> Result<(), SearchError> {
        let collection = InMemoryCollection::new(Box::new(CharacterNgramEmbedder::default()));
        let entries = [
            VectorEntry::from_record(0, &record("1", "Pregão eletrônico", "Regras do pregão eletrônico")),
            VectorEntry::from_record(1, &record("2", "Aposentadoria", "Regime próprio de previdência")),
        ];
        collection.add(&entries).await?;

        let hits = collection.query("pregão eletrônico", 2).await?;

        assert_eq!(collection.count().await?, 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "1");
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(collection.query("pregão", 1).await?.len(), 1);
        Ok(())
    }
}
