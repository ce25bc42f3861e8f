use chrono::Utc;
use clap::{Parser, Subcommand};
use normativos_core::{
    convert_folder_best_effort, load_batches, read_records_json, run_server, select_embedder,
    split_oversized_files, write_records_json, AppState, Embedder, LoadOptions, MappingTable,
    QdrantCollection, SplitOptions, VectorIndex,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "normativos", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333", global = true)]
    qdrant_url: String,

    /// Qdrant collection holding the documents
    #[arg(
        long,
        env = "NORMATIVOS_COLLECTION",
        default_value = "normativos_collection",
        global = true
    )]
    collection: String,

    /// Google API key; when set, embeddings come from text-embedding-004.
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true, global = true)]
    google_api_key: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Split oversized CSV exports into `_parte_N` files.
    Split {
        #[arg(long)]
        folder: PathBuf,
        /// Size ceiling per part, in megabytes.
        #[arg(long, default_value = "60")]
        max_mb: u64,
        #[arg(long, default_value = "1000")]
        rows_per_block: usize,
    },
    /// Convert CSV exports into a JSON document collection.
    Convert {
        #[arg(long)]
        folder: PathBuf,
        #[arg(long, default_value = "normativos.json")]
        output: PathBuf,
    },
    /// Embed a JSON document collection into Qdrant, resuming from the stored count.
    Load {
        #[arg(long, default_value = "normativos.json")]
        input: PathBuf,
        #[arg(long, default_value = "256")]
        batch_size: usize,
        /// Pause after each batch when embedding through the remote API.
        #[arg(long, default_value = "1000")]
        pacing_ms: u64,
    },
    /// Serve semantic search over HTTP.
    Serve {
        #[arg(long, default_value = "127.0.0.1:5000")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "normativos boot"
    );

    match cli.command {
        Command::Split {
            folder,
            max_mb,
            rows_per_block,
        } => {
            let options = SplitOptions {
                rows_per_block,
                ..SplitOptions::from_megabytes(max_mb)
            };
            let report = split_oversized_files(&folder, &options)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            for outcome in &report.split {
                println!(
                    "{} -> {} part(s)",
                    outcome.source.display(),
                    outcome.parts.len()
                );
                for part in &outcome.parts {
                    println!(
                        "  {} rows={} size={:.2} MB",
                        part.path.display(),
                        part.rows,
                        part.bytes as f64 / (1024.0 * 1024.0)
                    );
                }
            }
            for failed in &report.failed {
                warn!(path = %failed.path.display(), reason = %failed.reason, "split failed");
            }

            println!(
                "{} file(s) split, {} left as is, {} failed",
                report.split.len(),
                report.skipped.len(),
                report.failed.len()
            );
        }
        Command::Convert { folder, output } => {
            let report = convert_folder_best_effort(&folder, &MappingTable::default())
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            if !report.skipped_files.is_empty() {
                warn!(
                    "skipped_files={} for folder={}",
                    report.skipped_files.len(),
                    folder.display()
                );
                for skipped in &report.skipped_files {
                    warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped csv");
                }
            }
            if report.malformed_rows > 0 {
                warn!(rows = report.malformed_rows, "malformed rows discarded");
            }

            write_records_json(&output, &report.records)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!(
                "{} records from {} file(s) written to {}",
                report.records.len(),
                report.converted_files.len(),
                output.display()
            );
        }
        Command::Load {
            input,
            batch_size,
            pacing_ms,
        } => {
            let records =
                read_records_json(&input).map_err(|error| anyhow::anyhow!(error.to_string()))?;
            info!(input = %input.display(), records = records.len(), "records read");

            let embedder = select_embedder(cli.google_api_key.as_deref())
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            info!(model = embedder.model_name(), "embedding model selected");

            let collection = QdrantCollection::new(&cli.qdrant_url, cli.collection, embedder)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?
                .open_or_create()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let options = LoadOptions {
                batch_size,
                pacing_delay: Duration::from_millis(pacing_ms),
            };
            let report = load_batches(&records, &collection, &options)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!(
                "{} of {} records submitted in {} batch(es), starting at {}, into '{}'",
                report.submitted,
                report.total,
                report.batches,
                report.start_offset,
                collection.name()
            );
        }
        Command::Serve { bind } => {
            let state = match open_collection(&cli.qdrant_url, cli.collection, cli.google_api_key)
                .await
            {
                Ok(collection) => {
                    let documents = collection.count().await.ok();
                    info!(documents = ?documents, "collection opened");
                    AppState::ready(Arc::new(collection))
                }
                Err(error) => {
                    error!(%error, "collection unavailable, searches will fail until restart");
                    AppState::unavailable(error.to_string())
                }
            };

            run_server(&bind, state).await?;
        }
    }

    Ok(())
}

async fn open_collection(
    qdrant_url: &str,
    collection: String,
    google_api_key: Option<String>,
) -> Result<QdrantCollection, normativos_core::SearchError> {
    let embedder = select_embedder(google_api_key.as_deref())?;
    QdrantCollection::new(qdrant_url, collection, embedder)?
        .open()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_build_embeds_locally_with_minilm() {
        assert!(
            cfg!(feature = "local-embeddings-fastembed"),
            "the binary must ship the local all-MiniLM-L6-v2 embedder"
        );
    }

    #[test]
    fn serve_binds_locally_by_default() {
        let cli = Cli::try_parse_from(["normativos", "serve"]).unwrap();
        assert!(matches!(cli.command, Command::Serve { ref bind } if bind == "127.0.0.1:5000"));
    }
}
