//! Embedding functions used by the vector-store adapters.
//!
//! [`select_embedder`] picks the remote Google Generative AI model when an API
//! key is available and a local model otherwise. The local model is
//! all-MiniLM-L6-v2 when built with `local-embeddings-fastembed`, which the
//! `normativos` binary enables by default. Without the feature the hashed
//! trigram embedder stands in.

use crate::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    fn dimensions(&self) -> usize;

    /// True for remote APIs that throttle callers; the loader paces batches.
    fn is_rate_limited(&self) -> bool {
        false
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::Embedding("empty embedding response".to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model_name(&self) -> &str {
        "char-trigram"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

pub const GOOGLE_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const GOOGLE_EMBEDDING_DIMENSIONS: usize = 768;
const GOOGLE_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const GOOGLE_API_KEY_HEADER: &str = "x-goog-api-key";

/// Google Generative AI embeddings through `batchEmbedContents`.
pub struct GoogleEmbedder {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GoogleEmbedder {
    pub fn new(api_key: impl Into<String>) -> Result<Self, SearchError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: GOOGLE_EMBEDDING_MODEL.to_string(),
            base_url: GOOGLE_API_BASE.to_string(),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Embedder for GoogleEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        GOOGLE_EMBEDDING_DIMENSIONS
    }

    fn is_rate_limited(&self) -> bool {
        true
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = format!("models/{}", self.model);
        let requests: Vec<Value> = texts
            .iter()
            .map(|text| {
                json!({
                    "model": model,
                    "content": { "parts": [{ "text": text }] },
                })
            })
            .collect();

        let response = self
            .client
            .post(format!("{}/{model}:batchEmbedContents", self.base_url))
            .header(GOOGLE_API_KEY_HEADER, self.api_key.as_str())
            .json(&json!({ "requests": requests }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::BackendResponse {
                backend: "google-embeddings".to_string(),
                details: format!("{status}: {body}"),
            });
        }

        let parsed: Value = response.json().await?;
        let vectors = parse_google_embeddings(&parsed)?;
        if vectors.len() != texts.len() {
            return Err(SearchError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

fn parse_google_embeddings(parsed: &Value) -> Result<Vec<Vec<f32>>, SearchError> {
    let embeddings = parsed
        .pointer("/embeddings")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::Embedding("response missing embeddings array".to_string()))?;

    embeddings
        .iter()
        .map(|embedding| -> Result<Vec<f32>, SearchError> {
            embedding
                .pointer("/values")
                .and_then(Value::as_array)
                .ok_or_else(|| SearchError::Embedding("embedding missing values".to_string()))?
                .iter()
                .map(|value| {
                    value.as_f64().map(|number| number as f32).ok_or_else(|| {
                        SearchError::Embedding(format!("non-numeric embedding value: {value}"))
                    })
                })
                .collect()
        })
        .collect()
}

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::FastembedEmbedder;

#[cfg(feature = "local-embeddings-fastembed")]
mod local {
    use super::Embedder;
    use crate::SearchError;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    pub const MINILM_DIMENSIONS: usize = 384;

    /// all-MiniLM-L6-v2 run in-process through fastembed.
    pub struct FastembedEmbedder {
        model: Arc<Mutex<fastembed::TextEmbedding>>,
    }

    impl FastembedEmbedder {
        pub fn new() -> Result<Self, SearchError> {
            let model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
                    .with_show_download_progress(false),
            )
            .map_err(|error| SearchError::Embedding(error.to_string()))?;

            Ok(Self {
                model: Arc::new(Mutex::new(model)),
            })
        }
    }

    #[async_trait]
    impl Embedder for FastembedEmbedder {
        fn model_name(&self) -> &str {
            "all-MiniLM-L6-v2"
        }

        fn dimensions(&self) -> usize {
            MINILM_DIMENSIONS
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
            let model = Arc::clone(&self.model);
            let texts = texts.to_vec();

            tokio::task::spawn_blocking(move || {
                let mut model = model
                    .lock()
                    .map_err(|_| SearchError::Embedding("embedding model lock poisoned".to_string()))?;
                model
                    .embed(texts, None)
                    .map_err(|error| SearchError::Embedding(error.to_string()))
            })
            .await
            .map_err(|error| SearchError::Embedding(error.to_string()))?
        }
    }
}

/// Remote model when `api_key` is set and non-empty, local model otherwise.
pub fn select_embedder(api_key: Option<&str>) -> Result<Box<dyn Embedder>, SearchError> {
    if let Some(key) = api_key.map(str::trim).filter(|key| !key.is_empty()) {
        return Ok(Box::new(GoogleEmbedder::new(key)?));
    }
    local_embedder()
}

#[cfg(feature = "local-embeddings-fastembed")]
fn local_embedder() -> Result<Box<dyn Embedder>, SearchError> {
    Ok(Box::new(FastembedEmbedder::new()?))
}

#[cfg(not(feature = "local-embeddings-fastembed"))]
fn local_embedder() -> Result<Box<dyn Embedder>, SearchError> {
    Ok(Box::new(CharacterNgramEmbedder::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Hydraulic pressure and flow");
        let second = embedder.embed("Hydraulic pressure and flow");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc");
        assert_eq!(vector.len(), 32);
    }

    #[tokio::test]
    async fn batch_matches_single_embedding() -> Result<(), SearchError> {
        let embedder = CharacterNgramEmbedder::default();
        let batch = embedder
            .embed_batch(&["licitação".to_string(), "contrato".to_string()])
            .await?;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], embedder.embed_one("contrato").await?);
        Ok(())
    }

    #[test]
    fn google_response_is_parsed_in_order() -> Result<(), SearchError> {
        let parsed = json!({
            "embeddings": [
                { "values": [0.1, 0.2] },
                { "values": [0.3, 0.4] }
            ]
        });
        let vectors = parse_google_embeddings(&parsed)?;
        assert_eq!(vectors, vec![vec![0.1f32, 0.2], vec![0.3f32, 0.4]]);
        assert!(parse_google_embeddings(&json!({ "error": {} })).is_err());
        Ok(())
    }

    #[test]
    fn non_numeric_google_values_are_rejected() {
        let parsed = json!({
            "embeddings": [
                { "values": [0.1, 0.2] },
                { "values": [0.3, "NaN"] }
            ]
        });
        assert!(matches!(
            parse_google_embeddings(&parsed),
            Err(SearchError::Embedding(_))
        ));
        assert!(parse_google_embeddings(&json!({ "embeddings": [{ "values": [null] }] })).is_err());
    }

    #[tokio::test]
    async fn google_failures_do_not_expose_the_api_key() -> Result<(), SearchError> {
        let embedder = GoogleEmbedder::new("LOCAL-SECRET")?.with_base_url("http://127.0.0.1:1");
        let error = embedder
            .embed_one("licitação")
            .await
            .expect_err("nothing listens on port 1");
        assert!(!error.to_string().contains("LOCAL-SECRET"));
        Ok(())
    }

    #[test]
    fn api_key_selects_remote_provider() -> Result<(), SearchError> {
        let remote = select_embedder(Some("secret"))?;
        assert!(remote.is_rate_limited());
        assert_eq!(remote.model_name(), GOOGLE_EMBEDDING_MODEL);
        Ok(())
    }

    #[cfg(not(feature = "local-embeddings-fastembed"))]
    #[test]
    fn missing_key_falls_back_to_local() -> Result<(), SearchError> {
        for key in [None, Some(""), Some("   ")] {
            let local = select_embedder(key)?;
            assert!(!local.is_rate_limited());
            assert_eq!(local.dimensions(), DEFAULT_EMBEDDING_DIMENSIONS);
        }
        Ok(())
    }
}
