//! Payload transforms for STORED and DEFLATE entries.
//!
//! Raw deflate itself comes from `flate2`; this module only routes bytes
//! through it while tracking the checksum and byte counts that end up in the
//! headers.

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use std::io::{self, Read, Take, Write};

use super::crc32::Crc32;
use super::structures::CompressionMethod;
use crate::error::{Error, Result};

/// Size of the bounded chunks every copy loop moves at a time.
pub const CHUNK_SIZE: usize = 16 * 1024;

enum PayloadWriter<W: Write> {
    Storer(W),
    Deflater(DeflateEncoder<W>),
}

impl<W: Write> Write for PayloadWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            PayloadWriter::Storer(w) => w.write(buf),
            PayloadWriter::Deflater(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            PayloadWriter::Storer(w) => w.flush(),
            PayloadWriter::Deflater(w) => w.flush(),
        }
    }
}

/// Streams uncompressed bytes into an archive, checksumming them on the way.
pub(crate) struct PayloadEncoder<W: Write> {
    writer: PayloadWriter<W>,
    crc: Crc32,
    total_in: u64,
}

/// What an encoder saw once the source is exhausted.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EncodedPayload {
    pub crc32: u32,
    pub uncompressed_size: u64,
}

impl<W: Write> PayloadEncoder<W> {
    pub fn new(inner: W, method: CompressionMethod, level: u32) -> Result<Self> {
        let writer = match method {
            CompressionMethod::Stored => PayloadWriter::Storer(inner),
            CompressionMethod::Deflate => {
                PayloadWriter::Deflater(DeflateEncoder::new(inner, Compression::new(level)))
            }
            CompressionMethod::Unknown(m) => return Err(Error::UnsupportedMethod(m)),
        };
        Ok(Self {
            writer,
            crc: Crc32::new(),
            total_in: 0,
        })
    }

    pub fn push(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.crc.update(chunk);
        self.writer.write_all(chunk)?;
        self.total_in += chunk.len() as u64;
        Ok(())
    }

    /// Flush the compressor and hand back the sink.
    pub fn finish(self) -> io::Result<(W, EncodedPayload)> {
        let payload = EncodedPayload {
            crc32: self.crc.finalize(),
            uncompressed_size: self.total_in,
        };
        let inner = match self.writer {
            PayloadWriter::Storer(mut w) => {
                w.flush()?;
                w
            }
            PayloadWriter::Deflater(w) => w.finish()?,
        };
        Ok((inner, payload))
    }
}

enum PayloadReader<R: Read> {
    Stored(Take<R>),
    Deflate(DeflateDecoder<Take<R>>),
}

impl<R: Read> Read for PayloadReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            PayloadReader::Stored(r) => r.read(buf),
            PayloadReader::Deflate(r) => r.read(buf),
        }
    }
}

/// Produces an entry's uncompressed bytes chunk by chunk.
///
/// The read loop is bounded by the uncompressed size; the compressed size
/// only caps how far the underlying reader may advance.
pub(crate) struct PayloadDecoder<R: Read> {
    reader: PayloadReader<R>,
    name: String,
    expected_crc: u32,
    crc: Crc32,
    pending: u64,
    buf: Vec<u8>,
}

impl<R: Read> PayloadDecoder<R> {
    /// `inner` must be positioned at the first payload byte.
    pub fn new(
        inner: R,
        method: CompressionMethod,
        compressed_size: u64,
        uncompressed_size: u64,
        expected_crc: u32,
        name: &str,
    ) -> Result<Self> {
        let limited = inner.take(compressed_size);
        let reader = match method {
            CompressionMethod::Stored => PayloadReader::Stored(limited),
            CompressionMethod::Deflate => PayloadReader::Deflate(DeflateDecoder::new(limited)),
            CompressionMethod::Unknown(m) => return Err(Error::UnsupportedMethod(m)),
        };
        Ok(Self {
            reader,
            name: name.to_string(),
            expected_crc,
            crc: Crc32::new(),
            pending: uncompressed_size,
            buf: vec![0u8; CHUNK_SIZE],
        })
    }

    /// The next chunk of output, `None` once the uncompressed size is reached.
    pub fn next_chunk(&mut self) -> Result<Option<&[u8]>> {
        if self.pending == 0 {
            return Ok(None);
        }

        let want = self.pending.min(CHUNK_SIZE as u64) as usize;
        let n = loop {
            match self.reader.read(&mut self.buf[..want]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if n == 0 {
            return Err(Error::TruncatedPayload {
                name: self.name.clone(),
            });
        }

        self.pending -= n as u64;
        self.crc.update(&self.buf[..n]);
        Ok(Some(&self.buf[..n]))
    }

    /// Check the checksum of everything produced.
    pub fn finish(self) -> Result<()> {
        let actual = self.crc.finalize();
        if actual != self.expected_crc {
            return Err(Error::ChecksumMismatch {
                name: self.name,
                expected: self.expected_crc,
                actual,
            });
        }
        Ok(())
    }
}
