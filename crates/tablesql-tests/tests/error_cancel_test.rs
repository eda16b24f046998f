mod common;

use predicates::prelude::*;
use std::time::Duration;
use tablesql::{CancellationToken, DatabaseBuilder, DumpOptions, TableSqlError};

#[test]
fn missing_path_fails_at_build() {
    let err = DatabaseBuilder::new()
        .add_path("/definitely/not/here.csv")
        .build()
        .unwrap_err();
    assert!(matches!(err, TableSqlError::InputNotFound { .. }));
}

#[test]
fn unsupported_extension_fails_at_build() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_fixture(dir.path(), "data.json", b"{}");
    let err = DatabaseBuilder::new().add_path(&path).build().unwrap_err();
    assert!(matches!(err, TableSqlError::UnsupportedFormat { .. }));
}

#[test]
fn double_compressed_name_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_fixture(dir.path(), "data.csv.gz.bz2", b"junk");
    let err = DatabaseBuilder::new().add_path(&path).build().unwrap_err();
    assert!(matches!(err, TableSqlError::UnsupportedFormat { .. }));
}

#[test]
fn empty_stream_fails_at_build_with_empty_input() {
    let err = DatabaseBuilder::new()
        .add_reader(std::io::empty(), "t", tablesql::FileKind::Csv)
        .build()
        .unwrap_err();
    assert!(matches!(err, TableSqlError::EmptyInput { .. }));
}

#[test]
fn parse_error_carries_source_and_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_fixture(dir.path(), "ragged.csv", b"a,b\n1,2,3\n");
    let err = DatabaseBuilder::new()
        .add_path(&path)
        .build()
        .unwrap()
        .open()
        .unwrap_err();

    let shown = err.to_string();
    assert!(predicate::str::contains("ragged.csv").eval(&shown));
    assert!(predicate::str::contains("row 1").eval(&shown));
}

#[test]
fn duplicate_column_error_names_the_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_fixture(dir.path(), "dup.csv", b"x,x\n1,2\n");
    let err = DatabaseBuilder::new()
        .add_path(&path)
        .build()
        .unwrap()
        .open()
        .unwrap_err();
    assert!(predicate::str::contains("\"x\"").eval(&err.to_string()));
}

#[test]
fn fired_token_cancels_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_fixture(dir.path(), "t.csv", b"a\n1\n");

    let token = CancellationToken::new();
    token.cancel();
    let err = DatabaseBuilder::new()
        .add_path(&path)
        .set_cancellation(token)
        .build()
        .unwrap()
        .open()
        .unwrap_err();
    assert!(matches!(err, TableSqlError::Cancelled));
}

#[test]
fn fired_token_cancels_dump_and_handle_stays_usable() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_fixture(dir.path(), "t.csv", b"a\n1\n");
    let out = dir.path().join("out");

    let token = CancellationToken::new();
    let db = DatabaseBuilder::new()
        .add_path(&path)
        .set_cancellation(token.clone())
        .build()
        .unwrap()
        .open()
        .unwrap();

    token.cancel();
    let err = db.dump_to(&out, &DumpOptions::new()).unwrap_err();
    assert!(matches!(err, TableSqlError::Cancelled));
    // No orphan export files, and the handle still answers queries.
    assert!(!out.join("t.csv").exists());
    assert_eq!(common::query_i64(&db, "SELECT COUNT(*) FROM \"t\""), 1);
}

#[test]
fn elapsed_deadline_cancels_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_fixture(dir.path(), "t.csv", b"a\n1\n");

    let token = CancellationToken::with_deadline(Duration::from_secs(0));
    let err = DatabaseBuilder::new()
        .add_path(&path)
        .set_cancellation(token)
        .build()
        .unwrap()
        .open()
        .unwrap_err();
    assert!(matches!(err, TableSqlError::Cancelled));
}
