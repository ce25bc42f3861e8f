pub mod embeddings;
pub mod error;
pub mod ingest;
pub mod keywords;
pub mod loader;
pub mod mapping;
pub mod models;
pub mod normalize;
pub mod server;
pub mod split;
pub mod stores;
pub mod table;
pub mod traits;

pub use embeddings::{
    select_embedder, CharacterNgramEmbedder, Embedder, GoogleEmbedder,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{IngestError, LoadError, SearchError};
pub use ingest::{
    convert_folder, convert_folder_best_effort, discover_csv_files, read_records_json,
    write_records_json, ConversionReport, RecordConverter, SkippedFile,
};
pub use loader::{load_batches, LoadReport};
pub use mapping::{MappingProfile, MappingRule, MappingTable};
pub use models::{
    DocumentRecord, EntryMetadata, LoadOptions, SearchHit, SplitOptions, StoreMatch, VectorEntry,
    DEFAULT_NUM_RESULTS, SPLIT_PART_MARKER,
};
pub use normalize::TextNormalizer;
pub use server::{router, run_server, AppState};
pub use split::{split_file, split_oversized_files, SplitOutcome, SplitPart, SplitReport};
pub use stores::{InMemoryCollection, QdrantCollection};
pub use traits::VectorIndex;
