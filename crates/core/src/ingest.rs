use crate::keywords::KeywordExtractor;
use crate::mapping::{MappingProfile, MappingTable};
use crate::normalize::TextNormalizer;
use crate::table::{DelimitedTable, DEFAULT_DELIMITER};
use crate::{DocumentRecord, IngestError};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Lists `.csv` files directly inside `folder`, sorted by path.
pub fn discover_csv_files(folder: &Path) -> Result<Vec<PathBuf>, IngestError> {
    if !folder.is_dir() {
        return Err(IngestError::InvalidArgument(format!(
            "source folder not found: {}",
            folder.display()
        )));
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_csv = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

        if is_csv {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    Ok(files)
}

pub(crate) fn file_name_of(path: &Path) -> Result<&str, IngestError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })
}

#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ConversionReport {
    pub records: Vec<DocumentRecord>,
    pub converted_files: Vec<PathBuf>,
    pub skipped_files: Vec<SkippedFile>,
    pub malformed_rows: usize,
}

/// Converts every mapped `.csv` file in `folder` into document records.
pub fn convert_folder(
    folder: &Path,
    mappings: &MappingTable,
) -> Result<Vec<DocumentRecord>, IngestError> {
    let report = convert_folder_best_effort(folder, mappings)?;
    Ok(report.records)
}

/// Like [`convert_folder`], but also reports which files were skipped and why.
///
/// Unmapped or unreadable files never abort the run.
pub fn convert_folder_best_effort(
    folder: &Path,
    mappings: &MappingTable,
) -> Result<ConversionReport, IngestError> {
    let files = discover_csv_files(folder)?;
    if files.is_empty() {
        warn!(folder = %folder.display(), "no csv files found");
    }

    let converter = RecordConverter::new()?;
    let mut report = ConversionReport::default();

    for path in files {
        let name = match file_name_of(&path).map(str::to_string) {
            Ok(name) => name,
            Err(error) => {
                report.skipped_files.push(SkippedFile {
                    path,
                    reason: error.to_string(),
                });
                continue;
            }
        };

        let Some(profile) = mappings.resolve(&name) else {
            warn!(file = %name, "no column mapping for file, skipping");
            report.skipped_files.push(SkippedFile {
                path,
                reason: "no column mapping".to_string(),
            });
            continue;
        };

        info!(file = %name, "converting");
        match converter.convert_file(&path, profile) {
            Ok(converted) => {
                report.malformed_rows += converted.malformed_rows;
                report.records.extend(converted.records);
                report.converted_files.push(path);
            }
            Err(error) => {
                warn!(file = %name, %error, "failed to convert file");
                report.skipped_files.push(SkippedFile {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok(report)
}

pub struct ConvertedFile {
    pub records: Vec<DocumentRecord>,
    pub malformed_rows: usize,
}

/// Drives normalization and keyword extraction over the rows of one file.
pub struct RecordConverter {
    normalizer: TextNormalizer,
    keywords: KeywordExtractor,
}

impl RecordConverter {
    pub fn new() -> Result<Self, IngestError> {
        let normalizer = TextNormalizer::new()?;
        let keywords = KeywordExtractor::new(normalizer.clone())?;
        Ok(Self {
            normalizer,
            keywords,
        })
    }

    pub fn convert_file(
        &self,
        path: &Path,
        profile: &MappingProfile,
    ) -> Result<ConvertedFile, IngestError> {
        let mut table = DelimitedTable::open(path, DEFAULT_DELIMITER)?;
        let mut records = Vec::new();

        for row in table.rows() {
            let Some(id) = row.get(profile.id_column) else {
                continue;
            };
            let title = row.get(profile.title_column);
            let body = self.normalizer.normalize_value(row.get(profile.body_column));
            if title.is_none() || body.is_empty() {
                continue;
            }

            records.push(DocumentRecord {
                id: id.to_string(),
                title: self.normalizer.normalize_value(title),
                body,
                keywords: self.keywords.extract(&row, &profile.keyword_columns),
            });
        }

        Ok(ConvertedFile {
            records,
            malformed_rows: table.malformed_rows(),
        })
    }
}

/// Writes records as a pretty-printed UTF-8 JSON array.
pub fn write_records_json(path: &Path, records: &[DocumentRecord]) -> Result<(), IngestError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    info!(path = %path.display(), records = records.len(), "document collection written");
    Ok(())
}

pub fn read_records_json(path: &Path) -> Result<Vec<DocumentRecord>, IngestError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
