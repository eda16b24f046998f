//! Parquet record parser.
//!
//! The file's schema becomes the header (column order preserved) and row
//! groups are streamed as [`TableChunk`]s of at most the budgeted row
//! count, with every cell stringified for storage in the engine.

use arrow_array::Array;
use arrow_schema::DataType;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::file::reader::ChunkReader;

use crate::chunk::{ChunkBudget, ChunkSource, Header, TableChunk};
use crate::err::TableSqlError;

/// Streaming Parquet parser producing bounded chunks of stringified cells.
pub(crate) struct ParquetChunkSource {
    reader: ParquetRecordBatchReader,
    table_name: String,
    header: Header,
    yielded: bool,
}

impl ParquetChunkSource {
    /// Opens a Parquet source. `input_reader` must support random access
    /// (a [`File`](std::fs::File) or fully buffered [`bytes::Bytes`]);
    /// `input` names the source in error messages.
    pub(crate) fn try_new<T: ChunkReader + 'static>(
        input_reader: T,
        table_name: String,
        input: String,
        budget: ChunkBudget,
    ) -> Result<Self, TableSqlError> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(input_reader)?;
        let names = builder
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        let header = Header::new(names, &input)?;
        let reader = builder.with_batch_size(budget.max_rows).build()?;
        Ok(Self {
            reader,
            table_name,
            header,
            yielded: false,
        })
    }
}

impl ChunkSource for ParquetChunkSource {
    fn next_chunk(&mut self) -> Result<Option<TableChunk>, TableSqlError> {
        let batch = match self.reader.next() {
            Some(batch) => batch?,
            None => {
                // A zero-row file still yields one empty chunk so the
                // loader creates the table.
                if self.yielded {
                    return Ok(None);
                }
                self.yielded = true;
                return Ok(Some(TableChunk {
                    table_name: self.table_name.clone(),
                    header: self.header.clone(),
                    records: Vec::new(),
                }));
            }
        };
        self.yielded = true;

        // Stringify column-by-column, then transpose into records.
        let mut columns: Vec<Vec<String>> = Vec::with_capacity(batch.num_columns());
        for column in batch.columns() {
            let casted = arrow_cast::cast(column, &DataType::Utf8)?;
            let strings = casted
                .as_any()
                .downcast_ref::<arrow_array::StringArray>()
                .ok_or_else(|| {
                    TableSqlError::Type("cast to Utf8 did not yield a string array".to_string())
                })?;
            columns.push(
                (0..strings.len())
                    .map(|i| {
                        if strings.is_null(i) {
                            String::new()
                        } else {
                            strings.value(i).to_string()
                        }
                    })
                    .collect(),
            );
        }

        let records = (0..batch.num_rows())
            .map(|row| columns.iter().map(|col| col[row].clone()).collect())
            .collect();

        Ok(Some(TableChunk {
            table_name: self.table_name.clone(),
            header: self.header.clone(),
            records,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
    use parquet::arrow::ArrowWriter;
    use std::sync::Arc;

    fn sample_parquet_bytes() -> bytes::Bytes {
        let batch = RecordBatch::try_from_iter(vec![
            (
                "id",
                Arc::new(Int64Array::from(vec![Some(1), Some(2), None])) as ArrayRef,
            ),
            (
                "name",
                Arc::new(StringArray::from(vec!["Alice", "Bob", "Carol"])) as ArrayRef,
            ),
            (
                "score",
                Arc::new(Float64Array::from(vec![1.5, 2.0, 3.25])) as ArrayRef,
            ),
        ])
        .unwrap();

        let mut buf = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
        bytes::Bytes::from(buf)
    }

    #[test]
    fn schema_becomes_header_in_order() {
        let src = ParquetChunkSource::try_new(
            sample_parquet_bytes(),
            "t".to_string(),
            "t.parquet".to_string(),
            ChunkBudget::default(),
        )
        .unwrap();
        assert_eq!(src.header.names(), ["id", "name", "score"]);
    }

    #[test]
    fn cells_are_stringified_and_nulls_empty() {
        let mut src = ParquetChunkSource::try_new(
            sample_parquet_bytes(),
            "t".to_string(),
            "t.parquet".to_string(),
            ChunkBudget::default(),
        )
        .unwrap();
        let chunk = src.next_chunk().unwrap().unwrap();
        assert_eq!(chunk.records[0], vec!["1", "Alice", "1.5"]);
        assert_eq!(chunk.records[2], vec!["", "Carol", "3.25"]);
        assert!(src.next_chunk().unwrap().is_none());
    }

    #[test]
    fn respects_row_budget() {
        let budget = ChunkBudget {
            max_rows: 2,
            max_bytes: usize::MAX,
        };
        let mut src = ParquetChunkSource::try_new(
            sample_parquet_bytes(),
            "t".to_string(),
            "t.parquet".to_string(),
            budget,
        )
        .unwrap();
        assert_eq!(src.next_chunk().unwrap().unwrap().records.len(), 2);
        assert_eq!(src.next_chunk().unwrap().unwrap().records.len(), 1);
        assert!(src.next_chunk().unwrap().is_none());
    }

    #[test]
    fn zero_row_file_yields_one_empty_chunk() {
        let schema = Arc::new(arrow_schema::Schema::new(vec![
            arrow_schema::Field::new("a", DataType::Int64, true),
        ]));
        let mut buf = Vec::new();
        let writer = ArrowWriter::try_new(&mut buf, schema, None).unwrap();
        writer.close().unwrap();

        let mut src = ParquetChunkSource::try_new(
            bytes::Bytes::from(buf),
            "t".to_string(),
            "t.parquet".to_string(),
            ChunkBudget::default(),
        )
        .unwrap();
        let chunk = src.next_chunk().unwrap().unwrap();
        assert_eq!(chunk.header.names(), ["a"]);
        assert!(chunk.records.is_empty());
        assert!(src.next_chunk().unwrap().is_none());
    }
}
