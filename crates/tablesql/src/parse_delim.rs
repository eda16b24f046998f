//! Record parsers for the delimited text formats: CSV, TSV, and LTSV.
//!
//! [`DelimChunkSource`] handles CSV and TSV through the `csv` crate with
//! RFC 4180 quoting, accepting LF or CRLF line endings and stripping a
//! leading BOM. [`LtsvChunkSource`] parses `label:value` lines, where the
//! first line fixes the label set and order for the whole stream.
//!
//! Both parsers yield records in bounded [`TableChunk`]s and never buffer
//! past the configured [`ChunkBudget`].

use std::io::{BufRead, BufReader, Read};

use crate::chunk::{ChunkBudget, ChunkSource, Header, TableChunk, record_bytes};
use crate::err::TableSqlError;

/// Streaming CSV/TSV parser producing bounded chunks.
///
/// The first non-empty row is the header. Rows shorter than the header are
/// padded with empty cells; rows with surplus cells are a parse error.
pub(crate) struct DelimChunkSource {
    reader: csv::Reader<Box<dyn Read>>,
    table_name: String,
    input: String,
    budget: ChunkBudget,
    header: Option<Header>,
    row: usize,
    yielded: bool,
    finished: bool,
}

impl DelimChunkSource {
    /// Creates a parser over `reader`. `delimiter` is `b','` for CSV and
    /// `b'\t'` for TSV; `input` names the source in error messages.
    pub(crate) fn new(
        reader: Box<dyn Read>,
        delimiter: u8,
        table_name: String,
        input: String,
        budget: ChunkBudget,
    ) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(reader);
        Self {
            reader,
            table_name,
            input,
            budget,
            header: None,
            row: 0,
            yielded: false,
            finished: false,
        }
    }

    fn read_record(&mut self, record: &mut csv::StringRecord) -> Result<bool, TableSqlError> {
        self.reader.read_record(record).map_err(|e| {
            TableSqlError::Parse {
                input: self.input.clone(),
                row: self.row + 1,
                message: e.to_string(),
            }
        })
    }
}

impl ChunkSource for DelimChunkSource {
    fn next_chunk(&mut self) -> Result<Option<TableChunk>, TableSqlError> {
        if self.finished {
            return Ok(None);
        }

        let mut record = csv::StringRecord::new();

        let header = match &self.header {
            Some(h) => h.clone(),
            None => {
                if !self.read_record(&mut record)? {
                    self.finished = true;
                    return Err(TableSqlError::EmptyInput {
                        input: self.input.clone(),
                    });
                }
                let mut names: Vec<String> = record.iter().map(|c| c.to_string()).collect();
                // The csv reader leaves a UTF-8 BOM on the first field.
                if let Some(first) = names.first_mut() {
                    if let Some(rest) = first.strip_prefix('\u{feff}') {
                        *first = rest.to_string();
                    }
                }
                let header = Header::new(names, &self.input)?;
                self.header = Some(header.clone());
                header
            }
        };

        let mut records: Vec<Vec<String>> = Vec::new();
        let mut bytes = 0usize;

        while !self.budget.is_full(records.len(), bytes) {
            if !self.read_record(&mut record)? {
                self.finished = true;
                break;
            }
            self.row += 1;

            if record.len() > header.len() {
                return Err(TableSqlError::Parse {
                    input: self.input.clone(),
                    row: self.row,
                    message: format!(
                        "row has {} fields, header has {}",
                        record.len(),
                        header.len()
                    ),
                });
            }

            let mut cells: Vec<String> = record.iter().map(|c| c.to_string()).collect();
            cells.resize(header.len(), String::new());
            bytes += record_bytes(&cells);
            records.push(cells);
        }

        // A header-only stream still yields one empty chunk so the loader
        // can create the table.
        if records.is_empty() && self.yielded {
            return Ok(None);
        }
        self.yielded = true;

        Ok(Some(TableChunk {
            table_name: self.table_name.clone(),
            header,
            records,
        }))
    }
}

/// Streaming LTSV parser producing bounded chunks.
///
/// The first line is both the header definition (its labels, in first-seen
/// order) and the first record. Later lines must use a subset of those
/// labels; missing labels become empty cells.
pub(crate) struct LtsvChunkSource {
    lines: std::io::Lines<BufReader<Box<dyn Read>>>,
    table_name: String,
    input: String,
    budget: ChunkBudget,
    header: Option<Header>,
    row: usize,
    finished: bool,
}

impl LtsvChunkSource {
    pub(crate) fn new(
        reader: Box<dyn Read>,
        table_name: String,
        input: String,
        budget: ChunkBudget,
    ) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            table_name,
            input,
            budget,
            header: None,
            row: 0,
            finished: false,
        }
    }

    /// Reads the next non-empty line, trimming a trailing CR and, on the
    /// first line, a leading BOM.
    fn next_line(&mut self) -> Result<Option<String>, TableSqlError> {
        loop {
            let line = match self.lines.next() {
                Some(line) => line?,
                None => return Ok(None),
            };
            let mut line = line.strip_suffix('\r').map(str::to_string).unwrap_or(line);
            if self.row == 0 && self.header.is_none() {
                if let Some(rest) = line.strip_prefix('\u{feff}') {
                    line = rest.to_string();
                }
            }
            if !line.is_empty() {
                return Ok(Some(line));
            }
        }
    }

    fn parse_pairs(&self, line: &str, row: usize) -> Result<Vec<(String, String)>, TableSqlError> {
        line.split('\t')
            .map(|field| {
                let (label, value) = field.split_once(':').ok_or_else(|| {
                    TableSqlError::Parse {
                        input: self.input.clone(),
                        row,
                        message: format!("field {field:?} is not a label:value pair"),
                    }
                })?;
                if label.is_empty()
                    || !label
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
                {
                    return Err(TableSqlError::Parse {
                        input: self.input.clone(),
                        row,
                        message: format!("invalid label {label:?}"),
                    });
                }
                Ok((label.to_string(), value.to_string()))
            })
            .collect()
    }

    /// Maps a line's pairs onto the header's label order.
    fn line_to_record(
        &self,
        header: &Header,
        line: &str,
        row: usize,
    ) -> Result<Vec<String>, TableSqlError> {
        let pairs = self.parse_pairs(line, row)?;
        let mut record = vec![String::new(); header.len()];
        for (label, value) in pairs {
            match header.names().iter().position(|n| *n == label) {
                Some(i) => record[i] = value,
                None => {
                    return Err(TableSqlError::Parse {
                        input: self.input.clone(),
                        row,
                        message: format!("label {label:?} not present in first line"),
                    });
                }
            }
        }
        Ok(record)
    }
}

impl ChunkSource for LtsvChunkSource {
    fn next_chunk(&mut self) -> Result<Option<TableChunk>, TableSqlError> {
        if self.finished {
            return Ok(None);
        }

        let mut records: Vec<Vec<String>> = Vec::new();
        let mut bytes = 0usize;

        let header = match &self.header {
            Some(h) => h.clone(),
            None => {
                let line = self.next_line()?.ok_or_else(|| {
                    self.finished = true;
                    TableSqlError::EmptyInput {
                        input: self.input.clone(),
                    }
                })?;
                let pairs = self.parse_pairs(&line, 1)?;
                let labels = pairs.iter().map(|(l, _)| l.clone()).collect();
                let header = Header::new(labels, &self.input)?;
                // The first line is also the first record.
                let record: Vec<String> = pairs.into_iter().map(|(_, v)| v).collect();
                self.row = 1;
                bytes += record_bytes(&record);
                records.push(record);
                self.header = Some(header.clone());
                header
            }
        };

        while !self.budget.is_full(records.len(), bytes) {
            let line = match self.next_line()? {
                Some(line) => line,
                None => {
                    self.finished = true;
                    break;
                }
            };
            self.row += 1;
            let record = self.line_to_record(&header, &line, self.row)?;
            bytes += record_bytes(&record);
            records.push(record);
        }

        if records.is_empty() {
            return Ok(None);
        }

        Ok(Some(TableChunk {
            table_name: self.table_name.clone(),
            header,
            records,
        }))
    }
}
