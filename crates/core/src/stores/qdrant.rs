use crate::embeddings::Embedder;
use crate::traits::VectorIndex;
use crate::{SearchError, StoreMatch, VectorEntry};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use url::Url;

/// A Qdrant collection reached over REST, embedding through `embedder`.
///
/// Point ids are the entry positions, so the point count doubles as the next
/// load offset and records sharing an id are stored side by side.
pub struct QdrantCollection {
    endpoint: String,
    collection: String,
    client: Client,
    embedder: Box<dyn Embedder>,
}

impl QdrantCollection {
    pub fn new(
        endpoint: &str,
        collection: impl Into<String>,
        embedder: Box<dyn Embedder>,
    ) -> Result<Self, SearchError> {
        let parsed = Url::parse(endpoint)?;
        Ok(Self {
            endpoint: parsed.as_str().trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::new(),
            embedder,
        })
    }

    pub fn name(&self) -> &str {
        &self.collection
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.endpoint, self.collection, suffix)
    }

    /// Opens an existing collection whose vector size matches the embedder.
    pub async fn open(self) -> Result<Self, SearchError> {
        let response = self.client.get(self.url("")).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SearchError::NotReady(format!(
                "collection '{}' does not exist",
                self.collection
            )));
        }

        let info: Value = check(response).await?.json().await?;
        if let Some(size) = info
            .pointer("/result/config/params/vectors/size")
            .and_then(Value::as_u64)
        {
            if size as usize != self.embedder.dimensions() {
                return Err(SearchError::Request(format!(
                    "collection '{}' stores {}-dimensional vectors but {} produces {}",
                    self.collection,
                    size,
                    self.embedder.model_name(),
                    self.embedder.dimensions()
                )));
            }
        }

        Ok(self)
    }

    /// Opens the collection, creating it first when it does not exist.
    pub async fn open_or_create(self) -> Result<Self, SearchError> {
        let response = self.client.get(self.url("")).send().await?;
        if response.status() != StatusCode::NOT_FOUND {
            check(response).await?;
            return self.open().await;
        }

        let response = self
            .client
            .put(self.url(""))
            .json(&json!({
                "vectors": {
                    "size": self.embedder.dimensions(),
                    "distance": "Cosine",
                }
            }))
            .send()
            .await?;
        check(response).await?;

        Ok(self)
    }
}

async fn check(response: Response) -> Result<Response, SearchError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(SearchError::BackendResponse {
        backend: "qdrant".to_string(),
        details: format!("{status}: {body}"),
    })
}

fn build_points(entries: &[VectorEntry], embeddings: &[Vec<f32>]) -> Result<Vec<Value>, SearchError> {
    if entries.len() != embeddings.len() {
        return Err(SearchError::Request(format!(
            "embedding count {} doesn't match entry count {}",
            embeddings.len(),
            entries.len()
        )));
    }

    Ok(entries
        .iter()
        .zip(embeddings.iter())
        .map(|(entry, embedding)| {
            json!({
                "id": entry.position,
                "vector": embedding,
                "payload": {
                    "id": entry.id,
                    "titulo": entry.metadata.titulo,
                    "texto": entry.metadata.texto,
                    "document": entry.document,
                },
            })
        })
        .collect())
}

fn parse_search_hits(parsed: &Value) -> Vec<StoreMatch> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    hits.iter()
        .map(|hit| {
            let text_field = |field: &str| {
                hit.pointer(&format!("/payload/{field}"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };

            let id = text_field("id")
                .or_else(|| {
                    hit.pointer("/id").map(|id| match id {
                        Value::String(id) => id.clone(),
                        other => other.to_string(),
                    })
                })
                .unwrap_or_default();

            StoreMatch {
                id,
                score: hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0),
                titulo: text_field("titulo"),
                texto: text_field("texto"),
            }
        })
        .collect()
}

#[async_trait]
impl VectorIndex for QdrantCollection {
    async fn count(&self) -> Result<u64, SearchError> {
        let response = self
            .client
            .post(self.url("/points/count"))
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        let parsed: Value = check(response).await?.json().await?;
        parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .ok_or_else(|| SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: "count response missing result.count".to_string(),
            })
    }

    async fn add(&self, entries: &[VectorEntry]) -> Result<(), SearchError> {
        if entries.is_empty() {
            return Ok(());
        }

        let documents: Vec<String> = entries.iter().map(|entry| entry.document.clone()).collect();
        let embeddings = self.embedder.embed_batch(&documents).await?;
        let points = build_points(entries, &embeddings)?;

        let response = self
            .client
            .put(self.url("/points?wait=true"))
            .json(&json!({ "points": points }))
            .send()
            .await?;
        check(response).await?;

        Ok(())
    }

    async fn query(&self, text: &str, limit: usize) -> Result<Vec<StoreMatch>, SearchError> {
        let query_vector = self.embedder.embed_one(text).await?;

        let response = self
            .client
            .post(self.url("/points/search"))
            .json(&json!({
                "vector": query_vector,
                "limit": limit,
                "with_payload": true,
            }))
            .send()
            .await?;

        let parsed: Value = check(response).await?.json().await?;
        Ok(parse_search_hits(&parsed))
    }

    fn is_rate_limited(&self) -> bool {
        self.embedder.is_rate_limited()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::EntryMetadata;

    fn entry(position: u64, id: &str) -> VectorEntry {
        VectorEntry {
            position,
            id: id.to_string(),
            document: format!("Título {id}: Texto {id}"),
            metadata: EntryMetadata {
                titulo: format!("Título {id}"),
                texto: format!("Texto {id}"),
            },
        }
    }

    #[test]
    fn endpoint_is_validated() {
        let embedder = Box::new(CharacterNgramEmbedder::default());
        assert!(QdrantCollection::new("not a url", "c", embedder).is_err());

        let embedder = Box::new(CharacterNgramEmbedder::default());
        let collection = QdrantCollection::new("http://localhost:6333/", "normativos", embedder).unwrap();
        assert_eq!(
            collection.url("/points/count"),
            "http://localhost:6333/collections/normativos/points/count"
        );
    }

    #[test]
    fn points_use_positions_and_carry_metadata() -> Result<(), SearchError> {
        let entries = [entry(10, "A"), entry(11, "A")];
        let embeddings = vec![vec![0.1f32], vec![0.2f32]];

        let points = build_points(&entries, &embeddings)?;

        assert_eq!(points[0]["id"], 10);
        assert_eq!(points[1]["id"], 11);
        assert_eq!(points[1]["payload"]["id"], "A");
        assert_eq!(points[0]["payload"]["titulo"], "Título A");
        assert_eq!(points[0]["payload"]["document"], "Título A: Texto A");
        assert!(build_points(&entries, &embeddings[..1]).is_err());
        Ok(())
    }

    #[test]
    fn search_hits_keep_rank_order() {
        let parsed = json!({
            "result": [
                { "id": 4, "score": 0.9, "payload": { "id": "KEY-4", "titulo": "T4", "texto": "B4" } },
                { "id": 2, "score": 0.5, "payload": { "titulo": "T2" } }
            ]
        });

        let hits = parse_search_hits(&parsed);

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "KEY-4");
        assert_eq!(hits[0].texto.as_deref(), Some("B4"));
        assert_eq!(hits[1].id, "2");
        assert_eq!(hits[1].texto, None);
        assert!(parse_search_hits(&json!({})).is_empty());
    }
}
