//! Batched loading of document records into a vector store.
//!
//! Resuming is count based: the store's entry count is taken as the index of
//! the next record to submit. This only holds while the record order is the
//! same on every run and no earlier run stopped halfway through a batch.

use crate::traits::VectorIndex;
use crate::{DocumentRecord, LoadError, LoadOptions, VectorEntry};
use tracing::{error, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub total: usize,
    pub start_offset: usize,
    pub submitted: usize,
    pub batches: usize,
}

pub async fn load_batches<S>(
    records: &[DocumentRecord],
    store: &S,
    options: &LoadOptions,
) -> Result<LoadReport, LoadError>
where
    S: VectorIndex + ?Sized,
{
    if options.batch_size == 0 {
        return Err(LoadError::InvalidOptions(
            "batch_size must be at least 1".to_string(),
        ));
    }

    let total = records.len();
    let existing = store.count().await.map_err(LoadError::Count)?;
    let start_offset = usize::try_from(existing).unwrap_or(usize::MAX);

    let mut report = LoadReport {
        total,
        start_offset,
        ..LoadReport::default()
    };

    if start_offset >= total {
        info!(existing, total, "store already holds every record, nothing to load");
        return Ok(report);
    }
    if start_offset > 0 {
        info!(existing, "resuming load from store count");
    }

    let pace = store.is_rate_limited() && !options.pacing_delay.is_zero();

    for (batch_index, batch) in records[start_offset..].chunks(options.batch_size).enumerate() {
        let batch_start = start_offset + batch_index * options.batch_size;
        let entries: Vec<VectorEntry> = batch
            .iter()
            .enumerate()
            .map(|(offset, record)| VectorEntry::from_record((batch_start + offset) as u64, record))
            .collect();

        if let Err(source) = store.add(&entries).await {
            error!(start_index = batch_start, %source, "batch failed, stopping load");
            return Err(LoadError::Batch {
                start_index: batch_start,
                source,
            });
        }

        report.submitted += entries.len();
        report.batches += 1;
        info!(
            batch = batch_start / options.batch_size + 1,
            progress = batch_start + entries.len(),
            total,
            "batch stored"
        );

        if pace {
            tokio::time::sleep(options.pacing_delay).await;
        }
    }

    Ok(report)
}
