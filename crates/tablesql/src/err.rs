//! Error types for the tablesql crate.
//!
//! [`TableSqlError`] is the single error enum surfaced by every public
//! operation, wrapping SQLite, I/O, codec, and format-library failures
//! alongside the domain failure modes of the ingestion and persistence
//! pipeline (classification, parsing, deduplication, auto-save).

use std::path::PathBuf;

/// The main error type for the tablesql crate.
///
/// Domain variants cover the ingestion pipeline (classification, parsing,
/// loading) and the persistence pipeline (export, auto-save). Library
/// failures from SQLite, Arrow/Parquet, calamine, and the compression
/// codecs are wrapped via `#[from]` conversions.
#[derive(Debug, thiserror::Error)]
pub enum TableSqlError {
    /// An input path did not resolve to an existing file or directory.
    #[error("input path not found: {}", .path.display())]
    InputNotFound {
        /// The path that failed to resolve.
        path: PathBuf,
    },

    /// A file's name did not classify as a supported (format, compression) pair.
    #[error("unsupported file format: {}", .path.display())]
    UnsupportedFormat {
        /// The path whose suffix was not recognized.
        path: PathBuf,
    },

    /// A stream or file ended before a header row could be read.
    #[error("empty input: {input}")]
    EmptyInput {
        /// Human-readable name of the offending source (path or stream table name).
        input: String,
    },

    /// A header row contained the same column name more than once.
    #[error("duplicate column name {column:?} in {input}")]
    DuplicateColumn {
        /// The repeated column name.
        column: String,
        /// Human-readable name of the offending source.
        input: String,
    },

    /// Two sources resolved to the same table name after deduplication,
    /// or a source targets a table that already exists in the database.
    #[error("duplicate table name {table:?}")]
    DuplicateTable {
        /// The contested table name.
        table: String,
    },

    /// A malformed record was encountered at a specific row of a source.
    #[error("parse error in {input} at row {row}: {message}")]
    Parse {
        /// Human-readable name of the offending source.
        input: String,
        /// 1-based data row number (the header is row 0).
        row: usize,
        /// Description of the malformation.
        message: String,
    },

    /// Internal invariant violation during type inference.
    #[error("type inference invariant violated: {0}")]
    Type(String),

    /// An export (dump or auto-save) failed. The partially written file
    /// has been removed where possible.
    #[error("export of table {table:?} failed: {message}")]
    Persist {
        /// The table being exported when the failure occurred.
        table: String,
        /// The underlying failure, including cleanup status if removal failed.
        message: String,
    },

    /// Overwrite-originals auto-save was requested but at least one source
    /// has no original file location (stream or file-tree entry).
    #[error("auto-save misconfigured: {0}")]
    AutoSaveMisconfigured(String),

    /// A cancellation token fired or a deadline elapsed.
    #[error("operation cancelled")]
    Cancelled,

    /// An error raised while loading a specific source, with path context.
    #[error("while loading {input}: {source}")]
    Load {
        /// Human-readable name of the source being loaded.
        input: String,
        /// The underlying error.
        #[source]
        source: Box<TableSqlError>,
    },

    /// Passthrough from the SQLite engine.
    #[error("{0}")]
    Engine(#[from] rusqlite::Error),

    /// I/O error.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// CSV reader/writer error.
    #[error("{0}")]
    Csv(#[from] csv::Error),

    /// Error from the Parquet library.
    #[error("{0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Error from the Arrow libraries.
    #[error("{0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    /// Error from the XLSX reader.
    #[error("{0}")]
    XlsxRead(#[from] calamine::XlsxError),

    /// Error from the XLSX writer.
    #[error("{0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Path resolution error.
    #[error("{0}")]
    PathAbs(#[from] path_abs::Error),

    /// Catch-all error with a custom message.
    #[error("{0}")]
    Other(String),
}

impl TableSqlError {
    /// Wraps `self` with source context unless it is already a
    /// self-describing parser or control-flow error.
    ///
    /// Parse-level errors (EmptyInput, DuplicateColumn, Parse) and
    /// cancellation carry their own source information and must reach the
    /// caller unchanged.
    pub(crate) fn with_input(self, input: &str) -> TableSqlError {
        match self {
            TableSqlError::EmptyInput { .. }
            | TableSqlError::DuplicateColumn { .. }
            | TableSqlError::Parse { .. }
            | TableSqlError::DuplicateTable { .. }
            | TableSqlError::Cancelled
            | TableSqlError::Load { .. } => self,
            other => TableSqlError::Load {
                input: input.to_string(),
                source: Box::new(other),
            },
        }
    }
}
