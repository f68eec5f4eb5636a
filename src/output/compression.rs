//! Output-side compression layering.
//!
//! Compression wraps the byte sink before the format serializer sees it, so
//! any format composes with any codec. [`CompressionWriter::finish`] drives
//! encoder finalization; until it returns, the sink may hold an incomplete
//! stream.

use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use zstd::stream::write::Encoder as ZstdEncoder;

/// Compression applied to the serialized output stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zstd,
}

impl Compression {
    /// File-name extension appended to the evaluated file key.
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Gzip => ".gz",
            Compression::Zstd => ".zst",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Zstd => "zstd",
        }
    }
}

/// A byte sink optionally wrapped in a compression encoder.
pub enum CompressionWriter<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
    Zstd(ZstdEncoder<'static, W>),
}

impl<W: Write> CompressionWriter<W> {
    /// Wrap `sink` according to `compression`.
    pub fn new(compression: Compression, sink: W) -> io::Result<Self> {
        Ok(match compression {
            Compression::None => CompressionWriter::Plain(sink),
            Compression::Gzip => {
                CompressionWriter::Gzip(GzEncoder::new(sink, flate2::Compression::default()))
            }
            Compression::Zstd => CompressionWriter::Zstd(ZstdEncoder::new(sink, 0)?),
        })
    }

    /// Finalize the encoder and return the underlying sink.
    ///
    /// Must be called on every success path; dropping the writer instead
    /// leaves a truncated stream for gzip/zstd.
    pub fn finish(self) -> io::Result<W> {
        match self {
            CompressionWriter::Plain(sink) => Ok(sink),
            CompressionWriter::Gzip(encoder) => encoder.finish(),
            CompressionWriter::Zstd(encoder) => encoder.finish(),
        }
    }
}

impl<W: Write> Write for CompressionWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            CompressionWriter::Plain(sink) => sink.write(buf),
            CompressionWriter::Gzip(encoder) => encoder.write(buf),
            CompressionWriter::Zstd(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            CompressionWriter::Plain(sink) => sink.flush(),
            CompressionWriter::Gzip(encoder) => encoder.flush(),
            CompressionWriter::Zstd(encoder) => encoder.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    const TEST_DATA: &[u8] = b"some records\nmore records\n";

    fn write_through(compression: Compression) -> Vec<u8> {
        let mut out = Vec::new();
        let mut writer = CompressionWriter::new(compression, &mut out).unwrap();
        writer.write_all(TEST_DATA).unwrap();
        writer.finish().unwrap();
        out
    }

    #[test]
    fn test_plain_passthrough() {
        assert_eq!(write_through(Compression::None), TEST_DATA);
    }

    #[test]
    fn test_gzip_roundtrip() {
        let compressed = write_through(Compression::Gzip);
        let mut decoder = flate2::read::GzDecoder::new(compressed.as_slice());
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, TEST_DATA);
    }

    #[test]
    fn test_zstd_roundtrip() {
        let compressed = write_through(Compression::Zstd);
        let decoded = zstd::decode_all(compressed.as_slice()).unwrap();
        assert_eq!(decoded, TEST_DATA);
    }

    #[test]
    fn test_extensions() {
        assert_eq!(Compression::None.extension(), "");
        assert_eq!(Compression::Gzip.extension(), ".gz");
        assert_eq!(Compression::Zstd.extension(), ".zst");
        assert_eq!(Compression::Zstd.as_str(), "zstd");
    }
}
