//! Size-bounded splitting of oversized delimited files.
//!
//! Each part receives the header and one row-block before its size is ever
//! checked, then further blocks while it is still under the ceiling. A block
//! larger than the ceiling therefore still lands in a part of its own and the
//! loop always advances through the input.

use crate::ingest::{discover_csv_files, file_name_of, SkippedFile};
use crate::table::{reader_builder, writer_builder};
use crate::{IngestError, SplitOptions, SPLIT_PART_MARKER};
use csv::{ByteRecord, Writer};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPart {
    pub path: PathBuf,
    pub rows: usize,
    pub bytes: u64,
}

#[derive(Debug)]
pub struct SplitOutcome {
    pub source: PathBuf,
    pub parts: Vec<SplitPart>,
}

#[derive(Debug, Default)]
pub struct SplitReport {
    pub split: Vec<SplitOutcome>,
    /// Files already under the ceiling or already carrying the part marker.
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<SkippedFile>,
}

/// Groups a record stream into blocks of at most `rows_per_block` rows.
pub struct RowBlocks<I> {
    records: I,
    rows_per_block: usize,
}

impl<I> RowBlocks<I>
where
    I: Iterator<Item = csv::Result<ByteRecord>>,
{
    pub fn new(records: I, rows_per_block: usize) -> Self {
        Self {
            records,
            rows_per_block: rows_per_block.max(1),
        }
    }
}

impl<I> Iterator for RowBlocks<I>
where
    I: Iterator<Item = csv::Result<ByteRecord>>,
{
    type Item = csv::Result<Vec<ByteRecord>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut block = Vec::with_capacity(self.rows_per_block);
        for record in self.records.by_ref().take(self.rows_per_block) {
            match record {
                Ok(record) => block.push(record),
                Err(error) => return Some(Err(error)),
            }
        }

        if block.is_empty() {
            None
        } else {
            Some(Ok(block))
        }
    }
}

fn validate(options: &SplitOptions) -> Result<(), IngestError> {
    if options.max_bytes == 0 {
        return Err(IngestError::InvalidArgument(
            "max_bytes must be at least 1".to_string(),
        ));
    }
    if options.rows_per_block == 0 {
        return Err(IngestError::InvalidArgument(
            "rows_per_block must be at least 1".to_string(),
        ));
    }
    Ok(())
}

pub fn part_path(source: &Path, part_number: usize) -> Result<PathBuf, IngestError> {
    let stem = source
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing file stem: {}", source.display()))
        })?;
    let parent = source.parent().unwrap_or_else(|| Path::new(""));
    Ok(parent.join(format!("{stem}{SPLIT_PART_MARKER}{part_number}.csv")))
}

/// Splits every oversized `.csv` file directly inside `folder`.
///
/// Originals are left in place. Failures on one file are logged and reported
/// without stopping the others.
pub fn split_oversized_files(
    folder: &Path,
    options: &SplitOptions,
) -> Result<SplitReport, IngestError> {
    validate(options)?;
    let files = discover_csv_files(folder)?;
    let mut report = SplitReport::default();

    for path in files {
        let name = match file_name_of(&path).map(str::to_string) {
            Ok(name) => name,
            Err(error) => {
                report.failed.push(SkippedFile {
                    path,
                    reason: error.to_string(),
                });
                continue;
            }
        };

        if name.contains(SPLIT_PART_MARKER) {
            report.skipped.push(path);
            continue;
        }

        let size = match fs::metadata(&path) {
            Ok(metadata) => metadata.len(),
            Err(error) => {
                warn!(file = %name, %error, "unable to stat file");
                report.failed.push(SkippedFile {
                    path,
                    reason: error.to_string(),
                });
                continue;
            }
        };

        if size <= options.max_bytes {
            info!(file = %name, bytes = size, "file within size ceiling, not split");
            report.skipped.push(path);
            continue;
        }

        info!(file = %name, bytes = size, max_bytes = options.max_bytes, "splitting file");
        match split_file(&path, options) {
            Ok(parts) => report.split.push(SplitOutcome {
                source: path,
                parts,
            }),
            Err(error) => {
                warn!(file = %name, %error, "failed to split file");
                report.failed.push(SkippedFile {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok(report)
}

/// Splits one file into `<stem>_parte_<n>.csv` siblings, regardless of size.
pub fn split_file(path: &Path, options: &SplitOptions) -> Result<Vec<SplitPart>, IngestError> {
    validate(options)?;

    let mut reader = reader_builder(options.delimiter).from_path(path)?;
    let header = reader.byte_headers()?.clone();
    let mut blocks = RowBlocks::new(reader.into_byte_records(), options.rows_per_block);
    let mut parts = Vec::new();

    while let Some(first) = blocks.next().transpose()? {
        let output = part_path(path, parts.len() + 1)?;
        let mut writer = writer_builder(options.delimiter).from_path(&output)?;
        writer.write_byte_record(&header)?;

        let mut rows = write_block(&mut writer, &first)?;
        let mut bytes = flushed_size(&mut writer)?;

        while bytes < options.max_bytes {
            let Some(block) = blocks.next().transpose()? else {
                break;
            };
            rows += write_block(&mut writer, &block)?;
            bytes = flushed_size(&mut writer)?;
        }

        info!(part = %output.display(), rows, bytes, "part written");
        parts.push(SplitPart {
            path: output,
            rows,
            bytes,
        });
    }

    Ok(parts)
}

fn write_block(writer: &mut Writer<File>, block: &[ByteRecord]) -> Result<usize, IngestError> {
    for record in block {
        writer.write_byte_record(record)?;
    }
    Ok(block.len())
}

fn flushed_size(writer: &mut Writer<File>) -> Result<u64, IngestError> {
    writer.flush()?;
    Ok(writer.get_ref().metadata()?.len())
}
