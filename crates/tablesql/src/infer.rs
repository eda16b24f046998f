//! Column type inference from the first chunk of a source.
//!
//! Each column is assigned INTEGER, REAL, or TEXT by inspecting every cell
//! of the first chunk only; later chunks reuse the inferred schema. The
//! generated DDL uses these names verbatim and SQLite's type affinity
//! coerces any later non-matching values at query time.

use crate::chunk::{ColumnInfo, ColumnType, Header, TableChunk};
use crate::err::TableSqlError;

/// Infers a column type per header column from the chunk's records.
///
/// Rules, in order: if every non-empty cell parses as an `i64` the column
/// is INTEGER; else if every non-empty cell parses as a finite `f64` it is
/// REAL; else TEXT. A column whose cells are all empty is TEXT.
pub(crate) fn infer_columns(chunk: &TableChunk) -> Result<Vec<ColumnInfo>, TableSqlError> {
    for (i, record) in chunk.records.iter().enumerate() {
        if record.len() != chunk.header.len() {
            return Err(TableSqlError::Type(format!(
                "record {} of table {:?} has {} cells for {} columns",
                i,
                chunk.table_name,
                record.len(),
                chunk.header.len()
            )));
        }
    }

    Ok(chunk
        .header
        .names()
        .iter()
        .enumerate()
        .map(|(col, name)| ColumnInfo {
            name: name.clone(),
            column_type: infer_column(chunk.records.iter().map(|r| r[col].as_str())),
        })
        .collect())
}

/// Infers one column's type from its cells.
fn infer_column<'a, I>(cells: I) -> ColumnType
where
    I: Iterator<Item = &'a str>,
{
    let mut saw_value = false;
    let mut all_integer = true;
    let mut all_real = true;

    for cell in cells {
        if cell.is_empty() {
            continue;
        }
        saw_value = true;
        if all_integer && cell.parse::<i64>().is_err() {
            all_integer = false;
        }
        if all_real && !cell.parse::<f64>().map(f64::is_finite).unwrap_or(false) {
            all_real = false;
        }
        if !all_integer && !all_real {
            return ColumnType::Text;
        }
    }

    if !saw_value {
        ColumnType::Text
    } else if all_integer {
        ColumnType::Integer
    } else if all_real {
        ColumnType::Real
    } else {
        ColumnType::Text
    }
}

/// Builds an all-TEXT column list for a header-only source.
pub(crate) fn text_columns(header: &Header) -> Vec<ColumnInfo> {
    header
        .names()
        .iter()
        .map(|name| ColumnInfo {
            name: name.clone(),
            column_type: ColumnType::Text,
        })
        .collect()
}
