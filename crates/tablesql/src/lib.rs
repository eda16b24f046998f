//! Query tabular files with SQL through an embedded in-memory SQLite
//! database.
//!
//! This crate loads CSV, TSV, LTSV, Apache Parquet, and Excel XLSX files —
//! optionally wrapped in gzip, bzip2, xz, or zstd — into a fresh in-memory
//! SQLite database, one table per file (or per workbook sheet). Consumers
//! then run ordinary SQL against the handle, and may ask for mutations to
//! be persisted back to files on close or after each commit.
//!
//! # Data Pipeline
//!
//! ```text
//! paths / streams / file trees
//!     → suffix classification (format + compression)
//!         → streaming decompression
//!             → record parser (bounded chunks)
//!                 → type inference (first chunk)
//!                     → CREATE TABLE + prepared bulk INSERT
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use tablesql::{DatabaseBuilder, DumpOptions};
//!
//! # fn main() -> Result<(), tablesql::TableSqlError> {
//! let db = DatabaseBuilder::new()
//!     .add_path("data/users.csv")
//!     .add_path("data/orders.parquet")
//!     .auto_save_on_close("out", DumpOptions::new())
//!     .build()?
//!     .open()?;
//!
//! let adults: i64 =
//!     db.query_row("SELECT COUNT(*) FROM \"users\" WHERE age >= 18", [], |row| {
//!         row.get(0)
//!     })?;
//! println!("{adults}");
//!
//! db.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Key Types
//!
//! - [`DatabaseBuilder`] — accumulates sources and settings
//! - [`LoadPlan`] — the sealed, validated set of sources; only a plan opens
//! - [`FileDb`] — the connection handle; derefs to [`rusqlite::Connection`]
//! - [`FileKind`] — every valid compound suffix (`.csv`, `.csv.gz`, ...)
//! - [`DumpOptions`] — output format and compression for exports
//! - [`CancellationToken`] — cooperative cancellation for loads and exports
//!
//! # Ownership and Concurrency
//!
//! A handle is single-owner: neither the builder nor the database is safe
//! for concurrent use, and persistence always runs synchronously on the
//! caller's thread. Streams handed to the builder are consumed exactly
//! once and never retained after [`LoadPlan::open`] returns.

#![warn(missing_docs)]

pub use builder::{DatabaseBuilder, FileTree, LoadPlan};
pub use cancel::CancellationToken;
pub use chunk::{
    ChunkBudget, ColumnInfo, ColumnType, DEFAULT_CHUNK_BYTES, DEFAULT_CHUNK_ROWS, Header,
    TableChunk,
};
pub use conn::{FileDb, FileTx};
pub use dump::DumpOptions;
pub use err::TableSqlError;
pub use file_kind::{Compression, FileKind, Format, table_name_from_path};

mod builder;
mod cancel;
mod chunk;
mod codec;
mod conn;
mod dump;
mod err;
mod file_kind;
mod infer;
mod loader;
mod parse_delim;
mod parse_parquet;
mod parse_xlsx;
