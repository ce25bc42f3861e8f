pub mod memory;
pub mod qdrant;

pub use memory::InMemoryCollection;
pub use qdrant::QdrantCollection;
