//! Export of in-memory tables back to files.
//!
//! Every user table is written to `{dir}/{table}{format_ext}{compression_ext}`
//! in the configured [`DumpOptions`] format, streaming rows from a
//! `SELECT *`. Directories are created with owner-only permissions and
//! files are opened owner read/write only; a partially written file is
//! removed before the error surfaces. CSV/TSV output quotes a field only
//! when it contains the separator, a double quote, CR, or LF, and rows
//! end in a bare LF with no BOM.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use log::debug;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression as ParquetCompression;
use parquet::file::properties::WriterProperties;
use rusqlite::Connection;
use rusqlite::types::Value;

use crate::cancel::CancellationToken;
use crate::chunk::{ColumnInfo, ColumnType, DEFAULT_CHUNK_ROWS};
use crate::codec::CodecWriter;
use crate::err::TableSqlError;
use crate::file_kind::{Compression, FileKind, Format, table_name_from_path};
use crate::loader::quote_ident;

/// Output format and compression for [`dump`] and auto-save.
#[derive(Debug, Clone, Copy, Default)]
pub struct DumpOptions {
    format: Format,
    compression: Compression,
}

impl DumpOptions {
    /// CSV format, no compression.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the output format.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Sets the output compression. bzip2 and Parquet-plus-compression are
    /// rejected at dump time.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// The configured output format.
    pub fn format(&self) -> Format {
        self.format
    }

    /// The configured output compression.
    pub fn compression(&self) -> Compression {
        self.compression
    }

    fn validate(&self) -> Result<(), TableSqlError> {
        if self.compression == Compression::Bzip2 {
            return Err(TableSqlError::Other(
                "bzip2 compression is not supported for writing".to_string(),
            ));
        }
        if self.format == Format::Parquet && self.compression != Compression::None {
            return Err(TableSqlError::Other(
                "parquet output uses its own internal compression and cannot be wrapped in a stream codec"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Writes every user table into `dir` per `options`, checking the
/// cancellation token between tables.
pub(crate) fn dump(
    conn: &Connection,
    dir: &Path,
    options: &DumpOptions,
    cancel: &CancellationToken,
) -> Result<(), TableSqlError> {
    options.validate()?;
    create_dir_restrictive(dir)?;
    for table in list_tables(conn)? {
        cancel.check()?;
        let file_name = format!(
            "{}{}{}",
            table,
            options.format.ext(),
            options.compression.ext()
        );
        write_table(
            conn,
            &table,
            &dir.join(file_name),
            options.format,
            options.compression,
        )?;
    }
    Ok(())
}

/// Writes every user table back to its original location.
///
/// Tables with a recorded original keep the original filename and compound
/// extension. Workbook originals expand into several tables at load time;
/// those tables are grouped back and the whole workbook is rewritten, one
/// sheet per table. Tables without an original (created via SQL after
/// open) are written per `options` into the directory of the first
/// original path.
pub(crate) fn dump_overwrite(
    conn: &Connection,
    originals: &[(String, PathBuf)],
    options: &DumpOptions,
    cancel: &CancellationToken,
) -> Result<(), TableSqlError> {
    let Some((_, first)) = originals.first() else {
        return Err(TableSqlError::AutoSaveMisconfigured(
            "overwrite mode requires at least one file-path source".to_string(),
        ));
    };
    let fallback_dir = first.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();

    // Tables from one workbook are collected and written together.
    let mut workbooks: Vec<(PathBuf, Vec<String>)> = Vec::new();

    for table in list_tables(conn)? {
        cancel.check()?;
        match originals.iter().find(|(t, _)| *t == table) {
            Some((_, path)) => {
                let kind = FileKind::from_path(path);
                if kind.format() == Some(Format::Xlsx) {
                    match workbooks.iter_mut().find(|(p, _)| p == path) {
                        Some((_, tables)) => tables.push(table),
                        None => workbooks.push((path.clone(), vec![table])),
                    }
                    continue;
                }
                let format = kind.format().unwrap_or(options.format);
                let compression = kind.compression().unwrap_or(options.compression);
                if compression == Compression::Bzip2 {
                    return Err(TableSqlError::Persist {
                        table: table.clone(),
                        message: "bzip2 compression is not supported for writing".to_string(),
                    });
                }
                write_table(conn, &table, path, format, compression)?;
            }
            None => {
                options.validate()?;
                let file_name = format!(
                    "{}{}{}",
                    table,
                    options.format.ext(),
                    options.compression.ext()
                );
                write_table(
                    conn,
                    &table,
                    &fallback_dir.join(file_name),
                    options.format,
                    options.compression,
                )?;
            }
        }
    }

    for (path, tables) in workbooks {
        cancel.check()?;
        let compression = FileKind::from_path(&path).compression().unwrap_or_default();
        if compression == Compression::Bzip2 {
            return Err(TableSqlError::Persist {
                table: tables.first().cloned().unwrap_or_default(),
                message: "bzip2 compression is not supported for writing".to_string(),
            });
        }
        write_workbook(conn, &path, &tables, compression)?;
    }
    Ok(())
}

/// User tables in creation order, excluding the engine's reserved
/// `sqlite_` prefix.
pub(crate) fn list_tables(conn: &Connection) -> Result<Vec<String>, TableSqlError> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'")?;
    let tables = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(tables)
}

/// Column names and declared types, in declared order.
fn table_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>, TableSqlError> {
    let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1)")?;
    let columns = stmt
        .query_map([table], |row| {
            let name: String = row.get(0)?;
            let declared: String = row.get(1)?;
            Ok(ColumnInfo {
                name,
                column_type: ColumnType::from_sql_name(&declared),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn write_table(
    conn: &Connection,
    table: &str,
    path: &Path,
    format: Format,
    compression: Compression,
) -> Result<(), TableSqlError> {
    debug!("exporting table {table:?} to {}", path.display());
    if let Err(e) = write_table_inner(conn, table, path, format, compression) {
        let message = match std::fs::remove_file(path) {
            Ok(()) => e.to_string(),
            Err(rm) if rm.kind() == std::io::ErrorKind::NotFound => e.to_string(),
            Err(rm) => format!("{e} (partial file not removed: {rm})"),
        };
        return Err(TableSqlError::Persist {
            table: table.to_string(),
            message,
        });
    }
    Ok(())
}

fn write_table_inner(
    conn: &Connection,
    table: &str,
    path: &Path,
    format: Format,
    compression: Compression,
) -> Result<(), TableSqlError> {
    let file = open_restrictive(path)?;
    let writer = BufWriter::new(file);

    match format {
        Format::Csv | Format::Tsv => {
            let columns = table_columns(conn, table)?;
            let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_ident(table)))?;
            let delimiter = if format == Format::Csv { b',' } else { b'\t' };
            let codec = CodecWriter::new(writer, compression)?;
            let mut w = csv::WriterBuilder::new()
                .delimiter(delimiter)
                .quote_style(csv::QuoteStyle::Necessary)
                .terminator(csv::Terminator::Any(b'\n'))
                .from_writer(codec);
            w.write_record(columns.iter().map(|c| c.name.as_str()))?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let record: Vec<String> = (0..columns.len())
                    .map(|i| row.get::<_, Value>(i).map(value_to_string))
                    .collect::<Result<_, _>>()?;
                w.write_record(&record)?;
            }
            let mut inner = w
                .into_inner()
                .map_err(|e| TableSqlError::Other(e.to_string()))?
                .finish()?;
            inner.flush()?;
        }
        Format::Ltsv => {
            let columns = table_columns(conn, table)?;
            let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_ident(table)))?;
            let mut codec = CodecWriter::new(writer, compression)?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let fields: Vec<String> = columns
                    .iter()
                    .enumerate()
                    .map(|(i, c)| {
                        row.get::<_, Value>(i)
                            .map(|v| format!("{}:{}", c.name, value_to_string(v)))
                    })
                    .collect::<Result<_, _>>()?;
                codec.write_all(fields.join("\t").as_bytes())?;
                codec.write_all(b"\n")?;
            }
            codec.finish()?.flush()?;
        }
        Format::Parquet => {
            let columns = table_columns(conn, table)?;
            let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_ident(table)))?;
            write_parquet(&mut stmt, &columns, writer)?;
        }
        Format::Xlsx => {
            let mut workbook = rust_xlsxwriter::Workbook::new();
            let sheet = workbook.add_worksheet();
            sheet.set_name(table)?;
            write_sheet(conn, table, sheet)?;
            let bytes = workbook.save_to_buffer()?;
            let mut codec = CodecWriter::new(writer, compression)?;
            codec.write_all(&bytes)?;
            codec.finish()?.flush()?;
        }
    }
    Ok(())
}

/// Writes one table's header and rows into a worksheet.
fn write_sheet(
    conn: &Connection,
    table: &str,
    sheet: &mut rust_xlsxwriter::Worksheet,
) -> Result<(), TableSqlError> {
    let columns = table_columns(conn, table)?;
    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_ident(table)))?;
    for (col, c) in columns.iter().enumerate() {
        sheet.write_string(0, col as u16, c.name.as_str())?;
    }
    let mut rows = stmt.query([])?;
    let mut row_idx: u32 = 1;
    while let Some(row) = rows.next()? {
        for col in 0..columns.len() {
            let value = value_to_string(row.get::<_, Value>(col)?);
            sheet.write_string(row_idx, col as u16, value.as_str())?;
        }
        row_idx += 1;
    }
    Ok(())
}

/// Rewrites a whole workbook file: one worksheet per table, in table
/// creation order, with the partial file removed on failure.
///
/// Sheet names are recovered from the `{base}_{sheet}` table names.
fn write_workbook(
    conn: &Connection,
    path: &Path,
    tables: &[String],
    compression: Compression,
) -> Result<(), TableSqlError> {
    debug!("exporting workbook {} ({} sheets)", path.display(), tables.len());
    if let Err(e) = write_workbook_inner(conn, path, tables, compression) {
        let message = match std::fs::remove_file(path) {
            Ok(()) => e.to_string(),
            Err(rm) if rm.kind() == std::io::ErrorKind::NotFound => e.to_string(),
            Err(rm) => format!("{e} (partial file not removed: {rm})"),
        };
        return Err(TableSqlError::Persist {
            table: tables.first().cloned().unwrap_or_default(),
            message,
        });
    }
    Ok(())
}

fn write_workbook_inner(
    conn: &Connection,
    path: &Path,
    tables: &[String],
    compression: Compression,
) -> Result<(), TableSqlError> {
    let prefix = format!("{}_", table_name_from_path(path));

    let file = open_restrictive(path)?;
    let writer = BufWriter::new(file);

    let mut workbook = rust_xlsxwriter::Workbook::new();
    for table in tables {
        let sheet_name = table.strip_prefix(&prefix).unwrap_or(table);
        let sheet = workbook.add_worksheet();
        sheet.set_name(sheet_name)?;
        write_sheet(conn, table, sheet)?;
    }
    let bytes = workbook.save_to_buffer()?;
    let mut codec = CodecWriter::new(writer, compression)?;
    codec.write_all(&bytes)?;
    codec.finish()?.flush()?;
    Ok(())
}

/// Streams rows into Parquet with the table's declared column types
/// (INTEGER → Int64, REAL → Float64, TEXT → Utf8).
fn write_parquet(
    stmt: &mut rusqlite::Statement<'_>,
    columns: &[ColumnInfo],
    writer: BufWriter<File>,
) -> Result<(), TableSqlError> {
    let fields: Vec<Field> = columns
        .iter()
        .map(|c| {
            let data_type = match c.column_type {
                ColumnType::Integer => DataType::Int64,
                ColumnType::Real => DataType::Float64,
                ColumnType::Text => DataType::Utf8,
            };
            Field::new(c.name.as_str(), data_type, true)
        })
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let props = WriterProperties::builder()
        .set_compression(ParquetCompression::SNAPPY)
        .build();
    let mut w = ArrowWriter::try_new(writer, schema.clone(), Some(props))?;

    let mut buffered: Vec<Vec<Value>> = Vec::new();
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let record: Vec<Value> = (0..columns.len())
            .map(|i| row.get::<_, Value>(i))
            .collect::<Result<_, _>>()?;
        buffered.push(record);
        if buffered.len() >= DEFAULT_CHUNK_ROWS {
            w.write(&values_to_batch(&schema, columns, &buffered)?)?;
            buffered.clear();
        }
    }
    if !buffered.is_empty() {
        w.write(&values_to_batch(&schema, columns, &buffered)?)?;
    }
    w.close()?;
    Ok(())
}

fn values_to_batch(
    schema: &Arc<Schema>,
    columns: &[ColumnInfo],
    rows: &[Vec<Value>],
) -> Result<RecordBatch, TableSqlError> {
    let arrays: Vec<ArrayRef> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| match c.column_type {
            ColumnType::Integer => Arc::new(Int64Array::from(
                rows.iter().map(|r| value_to_i64(&r[i])).collect::<Vec<_>>(),
            )) as ArrayRef,
            ColumnType::Real => Arc::new(Float64Array::from(
                rows.iter().map(|r| value_to_f64(&r[i])).collect::<Vec<_>>(),
            )) as ArrayRef,
            ColumnType::Text => Arc::new(StringArray::from(
                rows.iter()
                    .map(|r| match &r[i] {
                        Value::Null => None,
                        v => Some(value_to_string(v.clone())),
                    })
                    .collect::<Vec<_>>(),
            )) as ArrayRef,
        })
        .collect();
    Ok(RecordBatch::try_new(schema.clone(), arrays)?)
}

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::Real(f) => Some(*f as i64),
        Value::Text(s) => s.parse().ok(),
        _ => None,
    }
}

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Real(f) => Some(*f),
        Value::Text(s) => s.parse().ok(),
        _ => None,
    }
}

/// Stringifies an engine value for text formats. NULL becomes the empty
/// string, mirroring how empty cells were stored at load time.
fn value_to_string(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s,
        Value::Blob(b) => String::from_utf8_lossy(&b).into_owned(),
    }
}

#[cfg(unix)]
fn open_restrictive(path: &Path) -> Result<File, TableSqlError> {
    use std::os::unix::fs::OpenOptionsExt;
    Ok(OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?)
}

#[cfg(not(unix))]
fn open_restrictive(path: &Path) -> Result<File, TableSqlError> {
    Ok(OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?)
}

#[cfg(unix)]
fn create_dir_restrictive(dir: &Path) -> Result<(), TableSqlError> {
    use std::os::unix::fs::DirBuilderExt;
    if !dir.exists() {
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(dir)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn create_dir_restrictive(dir: &Path) -> Result<(), TableSqlError> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}
