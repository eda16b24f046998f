//! Chunked loading of parsed records into the in-memory database.
//!
//! The loader pulls bounded chunks from a parser, creates the table from
//! the first chunk (running type inference on its records), and bulk
//! inserts every chunk through a prepared statement inside its own
//! transaction. Identifiers are always double-quoted, so reserved words
//! and punctuation in table or column names survive intact.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::debug;
use rusqlite::Connection;

use crate::cancel::CancellationToken;
use crate::chunk::{ChunkBudget, ChunkSource, ColumnInfo, TableChunk};
use crate::codec;
use crate::err::TableSqlError;
use crate::file_kind::{FileKind, Format};
use crate::infer;
use crate::parse_delim::{DelimChunkSource, LtsvChunkSource};
use crate::parse_parquet::ParquetChunkSource;
use crate::parse_xlsx::XlsxWorkbook;

/// Double-quotes an identifier, doubling embedded quotes. Identifiers are
/// never interpolated into SQL unquoted.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Whether a table of this name already exists in the database.
pub(crate) fn table_exists(conn: &Connection, name: &str) -> Result<bool, TableSqlError> {
    let mut stmt =
        conn.prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
    Ok(stmt.exists([name])?)
}

/// Drains `source` into the database: CREATE TABLE from the first chunk,
/// then one transaction-scoped bulk INSERT per chunk. Returns the name of
/// the created table.
///
/// Parser errors (EmptyInput, DuplicateColumn, Parse) propagate unchanged;
/// they are never rewritten as empty-table success. The cancellation token
/// is checked at every chunk boundary.
pub(crate) fn load_source(
    conn: &mut Connection,
    source: &mut dyn ChunkSource,
    cancel: &CancellationToken,
) -> Result<Option<String>, TableSqlError> {
    cancel.check()?;
    let Some(first) = source.next_chunk()? else {
        return Ok(None);
    };
    let table = first.table_name.clone();

    if table_exists(conn, &table)? {
        return Err(TableSqlError::DuplicateTable { table });
    }

    // A header-only source still creates its table, typed all-TEXT.
    let columns = if first.records.is_empty() {
        infer::text_columns(&first.header)
    } else {
        infer::infer_columns(&first)?
    };
    create_table(conn, &table, &columns)?;

    let insert_sql = insert_statement(&table, columns.len());
    insert_chunk(conn, &insert_sql, &first)?;
    drop(first);

    loop {
        cancel.check()?;
        match source.next_chunk()? {
            Some(chunk) => insert_chunk(conn, &insert_sql, &chunk)?,
            None => return Ok(Some(table)),
        }
    }
}

fn create_table(
    conn: &Connection,
    table: &str,
    columns: &[ColumnInfo],
) -> Result<(), TableSqlError> {
    let cols = columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.column_type.sql_name()))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("CREATE TABLE {} ({})", quote_ident(table), cols);
    debug!("creating table {table:?} with {} columns", columns.len());
    conn.execute(&sql, [])?;
    Ok(())
}

fn insert_statement(table: &str, column_count: usize) -> String {
    let placeholders = vec!["?"; column_count].join(", ");
    format!("INSERT INTO {} VALUES ({})", quote_ident(table), placeholders)
}

/// Inserts one chunk's records, all-or-nothing.
fn insert_chunk(
    conn: &mut Connection,
    insert_sql: &str,
    chunk: &TableChunk,
) -> Result<(), TableSqlError> {
    if chunk.records.is_empty() {
        return Ok(());
    }
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(insert_sql)?;
        for record in &chunk.records {
            stmt.execute(rusqlite::params_from_iter(record.iter()))?;
        }
    }
    tx.commit()?;
    debug!(
        "inserted {} rows into {:?}",
        chunk.records.len(),
        chunk.table_name
    );
    Ok(())
}

/// Loads one source from an already-open byte stream and returns the
/// created table names.
///
/// The stream is decompressed per `kind` and routed to the parser for its
/// base format. XLSX streams expand into one table per non-empty sheet.
pub(crate) fn load_reader(
    conn: &mut Connection,
    reader: Box<dyn Read>,
    kind: FileKind,
    table: &str,
    input: &str,
    budget: ChunkBudget,
    cancel: &CancellationToken,
) -> Result<Vec<String>, TableSqlError> {
    let format = kind.format().ok_or_else(|| TableSqlError::UnsupportedFormat {
        path: input.into(),
    })?;
    let compression = kind.compression().unwrap_or_default();
    debug!("loading {input} as {format} into table {table:?}");

    match format {
        Format::Csv | Format::Tsv => {
            let delimiter = if format == Format::Csv { b',' } else { b'\t' };
            let reader = codec::wrap_read(reader, compression)?;
            let mut source = DelimChunkSource::new(
                reader,
                delimiter,
                table.to_string(),
                input.to_string(),
                budget,
            );
            Ok(load_source(conn, &mut source, cancel)?.into_iter().collect())
        }
        Format::Ltsv => {
            let reader = codec::wrap_read(reader, compression)?;
            let mut source =
                LtsvChunkSource::new(reader, table.to_string(), input.to_string(), budget);
            Ok(load_source(conn, &mut source, cancel)?.into_iter().collect())
        }
        Format::Parquet => {
            // The Parquet reader needs random access; buffer the
            // decompressed stream.
            let mut reader = codec::wrap_read(reader, compression)?;
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            let mut source = ParquetChunkSource::try_new(
                bytes::Bytes::from(buf),
                table.to_string(),
                input.to_string(),
                budget,
            )?;
            Ok(load_source(conn, &mut source, cancel)?.into_iter().collect())
        }
        Format::Xlsx => {
            let reader = codec::wrap_read(reader, compression)?;
            load_workbook(conn, reader, table, input, budget, cancel)
        }
    }
}

/// Loads one source from a file path and returns the created table names.
/// Uncompressed Parquet files are read in place (no full buffering);
/// everything else goes through [`load_reader`].
pub(crate) fn load_path(
    conn: &mut Connection,
    path: &Path,
    kind: FileKind,
    table: &str,
    budget: ChunkBudget,
    cancel: &CancellationToken,
) -> Result<Vec<String>, TableSqlError> {
    let input = path.display().to_string();
    if kind == FileKind::Parquet {
        let file = File::open(path)?;
        let mut source =
            ParquetChunkSource::try_new(file, table.to_string(), input.clone(), budget)?;
        return Ok(load_source(conn, &mut source, cancel)?.into_iter().collect());
    }
    let file = File::open(path)?;
    load_reader(conn, Box::new(file), kind, table, &input, budget, cancel)
}

/// Expands one workbook into per-sheet tables, checking cancellation
/// between sheets. Returns the created table names, in sheet order.
fn load_workbook(
    conn: &mut Connection,
    reader: Box<dyn Read>,
    base: &str,
    input: &str,
    budget: ChunkBudget,
    cancel: &CancellationToken,
) -> Result<Vec<String>, TableSqlError> {
    let mut workbook =
        XlsxWorkbook::open(reader, base.to_string(), input.to_string(), budget.max_bytes)?;
    let mut tables = Vec::new();
    for sheet in workbook.sheet_names() {
        cancel.check()?;
        if let Some(mut source) = workbook.sheet_source(&sheet, budget)? {
            tables.extend(load_source(conn, &mut source, cancel)?);
        } else {
            debug!("skipping empty sheet {sheet:?} in {input}");
        }
    }
    Ok(tables)
}
