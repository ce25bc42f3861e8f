use crate::{SearchError, StoreMatch, VectorEntry};
use async_trait::async_trait;

/// The count/insert/query surface of an external vector store.
///
/// Embedding happens inside the implementation; callers only hand over the
/// text to embed and the metadata to keep alongside it.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn count(&self) -> Result<u64, SearchError>;

    async fn add(&self, entries: &[VectorEntry]) -> Result<(), SearchError>;

    /// Top `limit` matches for `text`, best first.
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<StoreMatch>, SearchError>;

    fn is_rate_limited(&self) -> bool {
        false
    }
}
