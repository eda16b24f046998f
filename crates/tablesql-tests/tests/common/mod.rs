#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use tablesql::{DatabaseBuilder, FileDb};

// ── Setup helpers ──────────────────────────────────────────────────

/// Path to a checked-in test data file.
pub fn data_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Builds and opens a database over the given paths.
pub fn open_paths<P: AsRef<Path>>(paths: &[P]) -> FileDb {
    DatabaseBuilder::new()
        .add_paths(paths)
        .build()
        .unwrap()
        .open()
        .unwrap()
}

/// Runs a single-value COUNT/aggregate query.
pub fn query_i64(db: &FileDb, sql: &str) -> i64 {
    db.query_row(sql, [], |row| row.get(0)).unwrap()
}

/// Column (name, declared type) pairs for a table, in declared order.
pub fn table_schema(db: &FileDb, table: &str) -> Vec<(String, String)> {
    let mut stmt = db
        .prepare("SELECT name, type FROM pragma_table_info(?1)")
        .unwrap();
    let rows = stmt
        .query_map([table], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap();
    rows.collect::<Result<_, _>>().unwrap()
}

// ── Fixture builders ───────────────────────────────────────────────

pub fn gzip_bytes(payload: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(payload).unwrap();
    enc.finish().unwrap()
}

pub fn xz_bytes(payload: &[u8]) -> Vec<u8> {
    let mut enc = xz2::write::XzEncoder::new(Vec::new(), 6);
    enc.write_all(payload).unwrap();
    enc.finish().unwrap()
}

pub fn zstd_bytes(payload: &[u8]) -> Vec<u8> {
    zstd::stream::encode_all(std::io::Cursor::new(payload), 0).unwrap()
}

/// Writes `bytes` into `dir/name` and returns the full path.
pub fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Builds an XLSX workbook with the given sheets, each a grid of string
/// cells, and returns the serialized bytes.
pub fn workbook_bytes(sheets: &[(&str, &[&[&str]])]) -> Vec<u8> {
    let mut wb = rust_xlsxwriter::Workbook::new();
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

/// Writes a small two-column Parquet file (id: Int64, label: Utf8).
pub fn write_parquet_fixture(dir: &Path, name: &str, rows: &[(i64, &str)]) -> PathBuf {
    use arrow_array::{ArrayRef, Int64Array, RecordBatch, StringArray};
    use std::sync::Arc;

    let ids: Int64Array = rows.iter().map(|(id, _)| Some(*id)).collect();
    let labels: StringArray = rows.iter().map(|(_, label)| Some(*label)).collect();
    let batch = RecordBatch::try_from_iter(vec![
        ("id", Arc::new(ids) as ArrayRef),
        ("label", Arc::new(labels) as ArrayRef),
    ])
    .unwrap();

    let path = dir.join(name);
    let file = std::fs::File::create(&path).unwrap();
    let mut writer = parquet::arrow::ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
    path
}
