//! XLSX workbook reading and multi-sheet expansion.
//!
//! A workbook is a ZIP container and needs random access, so the source
//! bytes are buffered through a [`SpooledTempFile`] (in memory up to the
//! chunk byte budget, spilled to a self-deleting temp file beyond it) —
//! the one documented deviation from streaming decode. Each non-empty
//! sheet becomes its own table named `{base}_{sanitized sheet name}`,
//! with row 1 as the header and later rows padded or truncated to the
//! header length.

use std::io::{self, Read, Seek, SeekFrom};

use calamine::{Data, Range, Reader as CalamineReader, Xlsx};
use tempfile::SpooledTempFile;

use crate::chunk::{ChunkBudget, ChunkSource, Header, TableChunk, record_bytes};
use crate::err::TableSqlError;

/// An open workbook plus the naming context for its sheet tables.
pub(crate) struct XlsxWorkbook {
    workbook: Xlsx<SpooledTempFile>,
    base: String,
    input: String,
}

impl XlsxWorkbook {
    /// Buffers `reader` fully and opens it as a workbook.
    ///
    /// `base` is the table-name prefix (the file basename), `input` names
    /// the source in error messages, and `spool_bytes` bounds the
    /// in-memory portion of the buffer.
    pub(crate) fn open(
        mut reader: Box<dyn Read>,
        base: String,
        input: String,
        spool_bytes: usize,
    ) -> Result<Self, TableSqlError> {
        let mut spool = SpooledTempFile::new(spool_bytes);
        io::copy(&mut reader, &mut spool)?;
        spool.seek(SeekFrom::Start(0))?;
        let workbook = Xlsx::new(spool)?;
        Ok(Self {
            workbook,
            base,
            input,
        })
    }

    /// Sheet names in workbook order.
    pub(crate) fn sheet_names(&self) -> Vec<String> {
        self.workbook.sheet_names().to_owned()
    }

    /// Builds the chunk source for one sheet, or `None` if the sheet has
    /// no rows.
    pub(crate) fn sheet_source(
        &mut self,
        sheet: &str,
        budget: ChunkBudget,
    ) -> Result<Option<SheetChunkSource>, TableSqlError> {
        let range = self.workbook.worksheet_range(sheet)?;
        if range.is_empty() {
            return Ok(None);
        }
        let table_name = format!("{}_{}", self.base, sanitize_sheet_name(sheet));
        SheetChunkSource::from_range(range, table_name, &self.input, budget).map(Some)
    }
}

/// Chunked iteration over one sheet's already-materialized rows.
///
/// The workbook reader materializes a sheet's used range as a whole; the
/// budget still bounds each INSERT batch handed to the loader.
pub(crate) struct SheetChunkSource {
    table_name: String,
    header: Header,
    rows: std::vec::IntoIter<Vec<String>>,
    budget: ChunkBudget,
    yielded: bool,
}

impl SheetChunkSource {
    fn from_range(
        range: Range<Data>,
        table_name: String,
        input: &str,
        budget: ChunkBudget,
    ) -> Result<Self, TableSqlError> {
        let mut rows = range.rows();
        let header_row = rows.next().ok_or_else(|| TableSqlError::EmptyInput {
            input: input.to_string(),
        })?;
        let names = header_row.iter().map(cell_to_string).collect();
        let header = Header::new(names, input)?;

        let width = header.len();
        let records: Vec<Vec<String>> = rows
            .map(|row| {
                let mut cells: Vec<String> = row.iter().take(width).map(cell_to_string).collect();
                cells.resize(width, String::new());
                cells
            })
            .collect();

        Ok(Self {
            table_name,
            header,
            rows: records.into_iter(),
            budget,
            yielded: false,
        })
    }
}

impl ChunkSource for SheetChunkSource {
    fn next_chunk(&mut self) -> Result<Option<TableChunk>, TableSqlError> {
        let mut records: Vec<Vec<String>> = Vec::new();
        let mut bytes = 0usize;

        while !self.budget.is_full(records.len(), bytes) {
            match self.rows.next() {
                Some(record) => {
                    bytes += record_bytes(&record);
                    records.push(record);
                }
                None => break,
            }
        }

        // A header-only sheet still yields one empty chunk so the loader
        // creates the table.
        if records.is_empty() && self.yielded {
            return Ok(None);
        }
        self.yielded = true;

        Ok(Some(TableChunk {
            table_name: self.table_name.clone(),
            header: self.header.clone(),
            records,
        }))
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

/// Sanitizes a sheet name into a table-name suffix: every character
/// outside `[A-Za-z0-9_]` becomes `_`, a leading digit gains a `sheet_`
/// prefix, and an empty result becomes `sheet`.
pub(crate) fn sanitize_sheet_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if sanitized.is_empty() {
        "sheet".to_string()
    } else if sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        format!("sheet_{sanitized}")
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn workbook_bytes(sheets: &[(&str, &[&[&str]])]) -> Vec<u8> {
        let mut wb = Workbook::new();
        for (name, rows) in sheets {
            let ws = wb.add_worksheet();
            ws.set_name(*name).unwrap();
            for (r, row) in rows.iter().enumerate() {
                for (c, cell) in row.iter().enumerate() {
                    ws.write_string(r as u32, c as u16, *cell).unwrap();
                }
            }
        }
        wb.save_to_buffer().unwrap()
    }

    fn open(bytes: Vec<u8>) -> XlsxWorkbook {
        XlsxWorkbook::open(
            Box::new(io::Cursor::new(bytes)),
            "sales".to_string(),
            "sales.xlsx".to_string(),
            1024 * 1024,
        )
        .unwrap()
    }

    // --- sanitize_sheet_name ---

    #[test]
    fn sanitize_replaces_punctuation() {
        assert_eq!(sanitize_sheet_name("Q1 Report"), "Q1_Report");
        assert_eq!(sanitize_sheet_name("a-b.c"), "a_b_c");
    }

    #[test]
    fn sanitize_prefixes_leading_digit() {
        assert_eq!(sanitize_sheet_name("2024"), "sheet_2024");
    }

    #[test]
    fn sanitize_empty_becomes_sheet() {
        assert_eq!(sanitize_sheet_name(""), "sheet");
    }

    // --- workbook expansion ---

    #[test]
    fn sheets_enumerate_in_workbook_order() {
        let wb = open(workbook_bytes(&[
            ("Q1", &[&["Name"], &["Alice"]]),
            ("Q2", &[&["Product"], &["Laptop"]]),
        ]));
        assert_eq!(wb.sheet_names(), ["Q1", "Q2"]);
    }

    #[test]
    fn sheet_becomes_prefixed_table() {
        let mut wb = open(workbook_bytes(&[(
            "Q1",
            &[&["Name", "Age"], &["Alice", "25"], &["Bob", "30"]],
        )]));
        let mut src = wb.sheet_source("Q1", ChunkBudget::default()).unwrap().unwrap();
        let chunk = src.next_chunk().unwrap().unwrap();
        assert_eq!(chunk.table_name, "sales_Q1");
        assert_eq!(chunk.header.names(), ["Name", "Age"]);
        assert_eq!(chunk.records, vec![vec!["Alice", "25"], vec!["Bob", "30"]]);
        assert!(src.next_chunk().unwrap().is_none());
    }

    #[test]
    fn empty_sheet_is_skipped() {
        let mut wb = open(workbook_bytes(&[
            ("Data", &[&["a"], &["1"]]),
            ("Blank", &[]),
        ]));
        assert!(wb.sheet_source("Blank", ChunkBudget::default()).unwrap().is_none());
    }

    #[test]
    fn short_rows_are_padded() {
        let mut wb = open(workbook_bytes(&[(
            "S",
            &[&["a", "b", "c"], &["1"]],
        )]));
        let mut src = wb.sheet_source("S", ChunkBudget::default()).unwrap().unwrap();
        let chunk = src.next_chunk().unwrap().unwrap();
        assert_eq!(chunk.records, vec![vec!["1", "", ""]]);
    }
}
