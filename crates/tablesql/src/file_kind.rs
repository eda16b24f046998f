//! Filename classification into (format, compression) pairs.
//!
//! [`FileKind`] enumerates every valid compound suffix as a single variant
//! so that matching stays exhaustive, with [`format`](FileKind::format) and
//! [`compression`](FileKind::compression) projections back to the base
//! [`Format`] and [`Compression`]. Classification is a case-insensitive
//! suffix match: the outer suffix names the compression, the inner suffix
//! the record format.

use std::fmt;
use std::path::Path;

/// Base record format of a source, before any stream compression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Format {
    /// Comma-separated values (RFC 4180). The default export format.
    #[default]
    Csv,
    /// Tab-separated values (RFC 4180 with a tab delimiter).
    Tsv,
    /// Labeled tab-separated values (`label:value` pairs per line).
    Ltsv,
    /// Apache Parquet columnar format.
    Parquet,
    /// Microsoft Excel workbook (one table per sheet).
    Xlsx,
}

impl Format {
    /// File suffix for this format, including the leading dot.
    pub fn ext(&self) -> &'static str {
        match self {
            Format::Csv => ".csv",
            Format::Tsv => ".tsv",
            Format::Ltsv => ".ltsv",
            Format::Parquet => ".parquet",
            Format::Xlsx => ".xlsx",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Csv => "csv",
            Format::Tsv => "tsv",
            Format::Ltsv => "ltsv",
            Format::Parquet => "parquet",
            Format::Xlsx => "xlsx",
        })
    }
}

/// Stream compression wrapped around a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// No compression (default).
    #[default]
    None,
    /// gzip (`.gz`).
    Gzip,
    /// bzip2 (`.bz2`). Supported for reading only.
    Bzip2,
    /// xz / LZMA2 (`.xz`).
    Xz,
    /// Zstandard (`.zst`).
    Zstd,
}

impl Compression {
    /// File suffix for this compression, including the leading dot.
    /// Empty for [`Compression::None`].
    pub fn ext(&self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Gzip => ".gz",
            Compression::Bzip2 => ".bz2",
            Compression::Xz => ".xz",
            Compression::Zstd => ".zst",
        }
    }
}

/// Every valid compound suffix, as a single tagged variant.
///
/// The outer extension decodes as compression, the inner as format, so
/// `data.csv.gz` is [`FileKind::CsvGz`]. [`FileKind::Unsupported`] covers
/// everything else, including double-compressed names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// `.csv`
    Csv,
    /// `.csv.gz`
    CsvGz,
    /// `.csv.bz2`
    CsvBz2,
    /// `.csv.xz`
    CsvXz,
    /// `.csv.zst`
    CsvZst,
    /// `.tsv`
    Tsv,
    /// `.tsv.gz`
    TsvGz,
    /// `.tsv.bz2`
    TsvBz2,
    /// `.tsv.xz`
    TsvXz,
    /// `.tsv.zst`
    TsvZst,
    /// `.ltsv`
    Ltsv,
    /// `.ltsv.gz`
    LtsvGz,
    /// `.ltsv.bz2`
    LtsvBz2,
    /// `.ltsv.xz`
    LtsvXz,
    /// `.ltsv.zst`
    LtsvZst,
    /// `.parquet`
    Parquet,
    /// `.parquet.gz`
    ParquetGz,
    /// `.parquet.bz2`
    ParquetBz2,
    /// `.parquet.xz`
    ParquetXz,
    /// `.parquet.zst`
    ParquetZst,
    /// `.xlsx`
    Xlsx,
    /// `.xlsx.gz`
    XlsxGz,
    /// `.xlsx.bz2`
    XlsxBz2,
    /// `.xlsx.xz`
    XlsxXz,
    /// `.xlsx.zst`
    XlsxZst,
    /// Anything that is not a recognized compound suffix.
    Unsupported,
}

const COMPRESSIONS: &[(&str, Compression)] = &[
    (".gz", Compression::Gzip),
    (".bz2", Compression::Bzip2),
    (".xz", Compression::Xz),
    (".zst", Compression::Zstd),
];

const FORMATS: &[(&str, Format)] = &[
    (".csv", Format::Csv),
    (".tsv", Format::Tsv),
    (".ltsv", Format::Ltsv),
    (".parquet", Format::Parquet),
    (".xlsx", Format::Xlsx),
];

impl FileKind {
    /// Classifies a path by its filename suffix, case-insensitively.
    ///
    /// Returns [`FileKind::Unsupported`] for unknown suffixes and for
    /// double-compressed names such as `data.csv.gz.bz2`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> FileKind {
        let name = match path.as_ref().file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_ascii_lowercase(),
            None => return FileKind::Unsupported,
        };

        let (rest, compression) = strip_compression(&name);
        // A second compression suffix under the first one is unsupported.
        if compression != Compression::None {
            let (_, inner) = strip_compression(rest);
            if inner != Compression::None {
                return FileKind::Unsupported;
            }
        }

        match strip_format(rest) {
            Some((_, format)) => FileKind::from_parts(format, compression),
            None => FileKind::Unsupported,
        }
    }

    /// Combines a base format and compression into the compound kind.
    pub fn from_parts(format: Format, compression: Compression) -> FileKind {
        use Compression::*;
        match (format, compression) {
            (Format::Csv, None) => FileKind::Csv,
            (Format::Csv, Gzip) => FileKind::CsvGz,
            (Format::Csv, Bzip2) => FileKind::CsvBz2,
            (Format::Csv, Xz) => FileKind::CsvXz,
            (Format::Csv, Zstd) => FileKind::CsvZst,
            (Format::Tsv, None) => FileKind::Tsv,
            (Format::Tsv, Gzip) => FileKind::TsvGz,
            (Format::Tsv, Bzip2) => FileKind::TsvBz2,
            (Format::Tsv, Xz) => FileKind::TsvXz,
            (Format::Tsv, Zstd) => FileKind::TsvZst,
            (Format::Ltsv, None) => FileKind::Ltsv,
            (Format::Ltsv, Gzip) => FileKind::LtsvGz,
            (Format::Ltsv, Bzip2) => FileKind::LtsvBz2,
            (Format::Ltsv, Xz) => FileKind::LtsvXz,
            (Format::Ltsv, Zstd) => FileKind::LtsvZst,
            (Format::Parquet, None) => FileKind::Parquet,
            (Format::Parquet, Gzip) => FileKind::ParquetGz,
            (Format::Parquet, Bzip2) => FileKind::ParquetBz2,
            (Format::Parquet, Xz) => FileKind::ParquetXz,
            (Format::Parquet, Zstd) => FileKind::ParquetZst,
            (Format::Xlsx, None) => FileKind::Xlsx,
            (Format::Xlsx, Gzip) => FileKind::XlsxGz,
            (Format::Xlsx, Bzip2) => FileKind::XlsxBz2,
            (Format::Xlsx, Xz) => FileKind::XlsxXz,
            (Format::Xlsx, Zstd) => FileKind::XlsxZst,
        }
    }

    /// Projects the base record format. `None` for [`FileKind::Unsupported`].
    pub fn format(&self) -> Option<Format> {
        match self {
            FileKind::Csv
            | FileKind::CsvGz
            | FileKind::CsvBz2
            | FileKind::CsvXz
            | FileKind::CsvZst => Some(Format::Csv),
            FileKind::Tsv
            | FileKind::TsvGz
            | FileKind::TsvBz2
            | FileKind::TsvXz
            | FileKind::TsvZst => Some(Format::Tsv),
            FileKind::Ltsv
            | FileKind::LtsvGz
            | FileKind::LtsvBz2
            | FileKind::LtsvXz
            | FileKind::LtsvZst => Some(Format::Ltsv),
            FileKind::Parquet
            | FileKind::ParquetGz
            | FileKind::ParquetBz2
            | FileKind::ParquetXz
            | FileKind::ParquetZst => Some(Format::Parquet),
            FileKind::Xlsx
            | FileKind::XlsxGz
            | FileKind::XlsxBz2
            | FileKind::XlsxXz
            | FileKind::XlsxZst => Some(Format::Xlsx),
            FileKind::Unsupported => None,
        }
    }

    /// Projects the stream compression. `None` for [`FileKind::Unsupported`].
    pub fn compression(&self) -> Option<Compression> {
        match self {
            FileKind::Csv
            | FileKind::Tsv
            | FileKind::Ltsv
            | FileKind::Parquet
            | FileKind::Xlsx => Some(Compression::None),
            FileKind::CsvGz
            | FileKind::TsvGz
            | FileKind::LtsvGz
            | FileKind::ParquetGz
            | FileKind::XlsxGz => Some(Compression::Gzip),
            FileKind::CsvBz2
            | FileKind::TsvBz2
            | FileKind::LtsvBz2
            | FileKind::ParquetBz2
            | FileKind::XlsxBz2 => Some(Compression::Bzip2),
            FileKind::CsvXz
            | FileKind::TsvXz
            | FileKind::LtsvXz
            | FileKind::ParquetXz
            | FileKind::XlsxXz => Some(Compression::Xz),
            FileKind::CsvZst
            | FileKind::TsvZst
            | FileKind::LtsvZst
            | FileKind::ParquetZst
            | FileKind::XlsxZst => Some(Compression::Zstd),
            FileKind::Unsupported => None,
        }
    }

    /// Whether this kind is a recognized compound suffix.
    pub fn is_supported(&self) -> bool {
        !matches!(self, FileKind::Unsupported)
    }
}

fn strip_compression(name: &str) -> (&str, Compression) {
    for (ext, compression) in COMPRESSIONS {
        if let Some(rest) = name.strip_suffix(ext) {
            return (rest, *compression);
        }
    }
    (name, Compression::None)
}

fn strip_format(name: &str) -> Option<(&str, Format)> {
    for (ext, format) in FORMATS {
        if let Some(rest) = name.strip_suffix(ext) {
            return Some((rest, *format));
        }
    }
    None
}

/// Derives the table name from a path: the basename with the compression
/// suffix (if any) and the format suffix stripped, verbatim otherwise.
///
/// SQL reserved words, punctuation, and non-ASCII survive untouched; the
/// loader quotes every identifier. Compressed and uncompressed variants of
/// the same file yield the same name.
pub fn table_name_from_path<P: AsRef<Path>>(path: P) -> String {
    let name = match path.as_ref().file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return String::new(),
    };

    let lower = name.to_ascii_lowercase();
    let (rest_lower, _) = strip_compression(&lower);
    let rest = &name[..rest_lower.len()];

    let lower = rest.to_ascii_lowercase();
    match strip_format(&lower) {
        Some((stem_lower, _)) => rest[..stem_lower.len()].to_string(),
        None => rest.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- FileKind::from_path ---

    #[test]
    fn classify_plain_formats() {
        assert_eq!(FileKind::from_path("data.csv"), FileKind::Csv);
        assert_eq!(FileKind::from_path("data.tsv"), FileKind::Tsv);
        assert_eq!(FileKind::from_path("data.ltsv"), FileKind::Ltsv);
        assert_eq!(FileKind::from_path("data.parquet"), FileKind::Parquet);
        assert_eq!(FileKind::from_path("data.xlsx"), FileKind::Xlsx);
    }

    #[test]
    fn classify_compressed_formats() {
        assert_eq!(FileKind::from_path("data.csv.gz"), FileKind::CsvGz);
        assert_eq!(FileKind::from_path("data.tsv.bz2"), FileKind::TsvBz2);
        assert_eq!(FileKind::from_path("data.ltsv.xz"), FileKind::LtsvXz);
        assert_eq!(FileKind::from_path("data.parquet.zst"), FileKind::ParquetZst);
        assert_eq!(FileKind::from_path("data.xlsx.gz"), FileKind::XlsxGz);
    }

    #[test]
    fn classify_is_case_insensitive() {
        assert_eq!(FileKind::from_path("FILE.CSV.GZ"), FileKind::CsvGz);
        assert_eq!(FileKind::from_path("File.Tsv"), FileKind::Tsv);
        assert_eq!(
            FileKind::from_path("FILE.CSV.GZ"),
            FileKind::from_path("file.csv.gz")
        );
    }

    #[test]
    fn classify_rejects_unknown_suffixes() {
        assert_eq!(FileKind::from_path("data.txt"), FileKind::Unsupported);
        assert_eq!(FileKind::from_path("data"), FileKind::Unsupported);
        assert_eq!(FileKind::from_path("data.gz"), FileKind::Unsupported);
        assert_eq!(FileKind::from_path("data.csv.zip"), FileKind::Unsupported);
    }

    #[test]
    fn classify_rejects_double_compression() {
        assert_eq!(FileKind::from_path("data.csv.gz.bz2"), FileKind::Unsupported);
        assert_eq!(FileKind::from_path("data.csv.zst.gz"), FileKind::Unsupported);
    }

    // --- projections ---

    #[test]
    fn projections_round_trip() {
        let kinds = [
            FileKind::Csv,
            FileKind::CsvGz,
            FileKind::TsvBz2,
            FileKind::LtsvXz,
            FileKind::ParquetZst,
            FileKind::XlsxGz,
        ];
        for kind in kinds {
            let format = kind.format().unwrap();
            let compression = kind.compression().unwrap();
            assert_eq!(FileKind::from_parts(format, compression), kind);
        }
    }

    #[test]
    fn unsupported_projects_to_none() {
        assert_eq!(FileKind::Unsupported.format(), None);
        assert_eq!(FileKind::Unsupported.compression(), None);
        assert!(!FileKind::Unsupported.is_supported());
    }

    // --- table_name_from_path ---

    #[test]
    fn table_name_strips_compound_extension() {
        assert_eq!(table_name_from_path("users.csv"), "users");
        assert_eq!(table_name_from_path("users.csv.gz"), "users");
        assert_eq!(table_name_from_path("/tmp/logs.ltsv.xz"), "logs");
    }

    #[test]
    fn table_name_same_for_compressed_and_plain() {
        assert_eq!(
            table_name_from_path("t.csv"),
            table_name_from_path("t.csv.gz")
        );
    }

    #[test]
    fn table_name_preserves_case_and_inner_dots() {
        assert_eq!(table_name_from_path("Data.Backup.CSV"), "Data.Backup");
        assert_eq!(table_name_from_path("select.csv"), "select");
    }

    #[test]
    fn table_name_empty_for_bare_extension() {
        assert_eq!(table_name_from_path(".csv"), "");
    }
}
