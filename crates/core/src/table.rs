use crate::error::IngestError;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_DELIMITER: u8 = b'|';

pub fn reader_builder(delimiter: u8) -> ReaderBuilder {
    let mut builder = ReaderBuilder::new();
    builder.delimiter(delimiter).has_headers(true).flexible(true);
    builder
}

pub fn writer_builder(delimiter: u8) -> WriterBuilder {
    let mut builder = WriterBuilder::new();
    builder.delimiter(delimiter).flexible(true);
    builder
}

/// A delimited file with a header row, read row by row.
///
/// Rows that fail to decode or carry more fields than the header are
/// discarded and counted instead of aborting the file. Short rows are kept;
/// their trailing columns read as missing.
pub struct DelimitedTable {
    reader: csv::Reader<File>,
    width: usize,
    columns: HashMap<String, usize>,
    malformed: usize,
}

impl DelimitedTable {
    pub fn open(path: &Path, delimiter: u8) -> Result<Self, IngestError> {
        let mut reader = reader_builder(delimiter).from_path(path)?;
        let headers = reader.headers()?.clone();

        let mut columns = HashMap::new();
        for (index, name) in headers.iter().enumerate() {
            columns.entry(name.to_string()).or_insert(index);
        }

        Ok(Self {
            reader,
            width: headers.len(),
            columns,
            malformed: 0,
        })
    }

    pub fn malformed_rows(&self) -> usize {
        self.malformed
    }

    pub fn rows(&mut self) -> impl Iterator<Item = Row<'_>> + '_ {
        let width = self.width;
        let columns = &self.columns;
        let malformed = &mut self.malformed;

        self.reader
            .records()
            .filter_map(move |result| match result {
                Ok(record) if record.len() <= width => Some(Row { columns, record }),
                Ok(record) => {
                    debug!(
                        line = record.position().map(|position| position.line()),
                        fields = record.len(),
                        expected = width,
                        "discarding row with extra fields"
                    );
                    *malformed += 1;
                    None
                }
                Err(error) => {
                    debug!(%error, "discarding undecodable row");
                    *malformed += 1;
                    None
                }
            })
    }
}

/// One data row, addressed by header name.
pub struct Row<'a> {
    columns: &'a HashMap<String, usize>,
    record: StringRecord,
}

impl Row<'_> {
    /// Returns the cell value, or `None` when the column is unknown, the row
    /// is too short, or the cell is empty.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .get(column)
            .and_then(|index| self.record.get(*index))
            .filter(|value| !value.is_empty())
    }
}
