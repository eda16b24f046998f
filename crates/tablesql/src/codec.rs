//! Stream compression codecs for reading sources and writing exports.
//!
//! Decoding is streaming for all four codecs; encoding is available for
//! gzip, xz, and zstd. bzip2 is read-only: [`CodecWriter::new`] rejects it,
//! and the exporter surfaces that rejection before any file is created.
//! [`CodecWriter`] carries an explicit [`finish`](CodecWriter::finish) so
//! trailing codec frames are flushed deterministically on every exit path.

use std::io::{self, Read, Write};

use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use crate::err::TableSqlError;
use crate::file_kind::Compression;

/// Wraps a byte stream with the decoder for `compression`.
///
/// [`Compression::None`] is a passthrough. Multi-stream gzip and bzip2
/// inputs decode across member boundaries.
pub(crate) fn wrap_read(
    reader: Box<dyn Read>,
    compression: Compression,
) -> Result<Box<dyn Read>, TableSqlError> {
    Ok(match compression {
        Compression::None => reader,
        Compression::Gzip => Box::new(MultiGzDecoder::new(reader)),
        Compression::Bzip2 => Box::new(MultiBzDecoder::new(reader)),
        Compression::Xz => Box::new(XzDecoder::new(reader)),
        Compression::Zstd => Box::new(zstd::stream::read::Decoder::new(reader)?),
    })
}

/// A compressing writer with an explicit finalization step.
///
/// Dropping without [`finish`](CodecWriter::finish) may leave a truncated
/// codec frame; the exporter always finishes on success and deletes the
/// partial file on failure.
pub(crate) enum CodecWriter<W: Write> {
    /// Passthrough for [`Compression::None`].
    Plain(W),
    /// gzip at the default level.
    Gzip(GzEncoder<W>),
    /// xz at preset 6.
    Xz(XzEncoder<W>),
    /// zstd at the default level.
    Zstd(zstd::stream::write::Encoder<'static, W>),
}

impl<W: Write> CodecWriter<W> {
    /// Wraps `writer` with the encoder for `compression`.
    ///
    /// bzip2 is rejected: the codec is supported for decompression only.
    pub(crate) fn new(writer: W, compression: Compression) -> Result<Self, TableSqlError> {
        match compression {
            Compression::None => Ok(CodecWriter::Plain(writer)),
            Compression::Gzip => Ok(CodecWriter::Gzip(GzEncoder::new(
                writer,
                flate2::Compression::default(),
            ))),
            Compression::Bzip2 => Err(TableSqlError::Other(
                "bzip2 compression is not supported for writing".to_string(),
            )),
            Compression::Xz => Ok(CodecWriter::Xz(XzEncoder::new(writer, 6))),
            Compression::Zstd => Ok(CodecWriter::Zstd(zstd::stream::write::Encoder::new(
                writer, 0,
            )?)),
        }
    }

    /// Flushes trailing codec frames and returns the inner writer.
    pub(crate) fn finish(self) -> io::Result<W> {
        match self {
            CodecWriter::Plain(mut w) => {
                w.flush()?;
                Ok(w)
            }
            CodecWriter::Gzip(enc) => enc.finish(),
            CodecWriter::Xz(enc) => enc.finish(),
            CodecWriter::Zstd(enc) => enc.finish(),
        }
    }
}

impl<W: Write> Write for CodecWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            CodecWriter::Plain(w) => w.write(buf),
            CodecWriter::Gzip(w) => w.write(buf),
            CodecWriter::Xz(w) => w.write(buf),
            CodecWriter::Zstd(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            CodecWriter::Plain(w) => w.flush(),
            CodecWriter::Gzip(w) => w.flush(),
            CodecWriter::Xz(w) => w.flush(),
            CodecWriter::Zstd(w) => w.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(compression: Compression, payload: &[u8]) -> Vec<u8> {
        let mut encoder = CodecWriter::new(Vec::new(), compression).unwrap();
        encoder.write_all(payload).unwrap();
        let encoded = encoder.finish().unwrap();

        let mut decoder = wrap_read(Box::new(io::Cursor::new(encoded)), compression).unwrap();
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded).unwrap();
        decoded
    }

    #[test]
    fn gzip_round_trip() {
        let payload = b"id,name\n1,Alice\n2,Bob\n";
        assert_eq!(round_trip(Compression::Gzip, payload), payload);
    }

    #[test]
    fn xz_round_trip() {
        let payload = b"time:2023-01-01T00:00:00Z\tlevel:info\n";
        assert_eq!(round_trip(Compression::Xz, payload), payload);
    }

    #[test]
    fn zstd_round_trip() {
        let payload = vec![b'x'; 64 * 1024];
        assert_eq!(round_trip(Compression::Zstd, &payload), payload);
    }

    #[test]
    fn none_is_passthrough() {
        let payload = b"plain";
        assert_eq!(round_trip(Compression::None, payload), payload);
    }

    #[test]
    fn bzip2_write_is_rejected() {
        assert!(CodecWriter::new(Vec::new(), Compression::Bzip2).is_err());
    }

    #[test]
    fn bzip2_read_is_supported() {
        // Compress with the bzip2 crate's encoder directly; the library
        // surface only exposes the decode direction.
        let payload = b"a,b\n1,2\n";
        let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        enc.write_all(payload).unwrap();
        let encoded = enc.finish().unwrap();

        let mut decoder =
            wrap_read(Box::new(io::Cursor::new(encoded)), Compression::Bzip2).unwrap();
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, payload);
    }
}
