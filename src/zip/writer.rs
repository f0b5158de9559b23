//! Streaming entry writer.
//!
//! Adding an entry is a two-pass protocol: the local header goes out with a
//! zero checksum and sizes, the payload is streamed after it, and the header
//! is patched in place once the real values are known. Memory use is bounded
//! by the chunk size no matter how large the entry is.

use byteorder::{LittleEndian, WriteBytesExt};
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tracing::debug;
use walkdir::WalkDir;

use super::archive::ZipArchive;
use super::codec::{CHUNK_SIZE, EncodedPayload, PayloadEncoder};
use super::encoding::normalize_name;
use super::entry::ZipFileEntry;
use super::structures::{CompressionMethod, LocalFileHeader};
use crate::error::{Error, Result};
use crate::io::ArchiveStream;

/// Timestamps recorded for a new entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryTimes {
    pub modified: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
    pub created: DateTime<Utc>,
}

impl EntryTimes {
    /// All three timestamps set to the same instant.
    pub fn uniform(at: DateTime<Utc>) -> Self {
        Self {
            modified: at,
            accessed: at,
            created: at,
        }
    }

    pub fn now() -> Self {
        Self::uniform(Utc::now())
    }

    /// The last modification time of a file on disk, used for all three.
    pub fn from_metadata(metadata: &fs::Metadata) -> io::Result<Self> {
        Ok(Self::uniform(metadata.modified()?.into()))
    }
}

impl From<DateTime<Utc>> for EntryTimes {
    fn from(at: DateTime<Utc>) -> Self {
        Self::uniform(at)
    }
}

impl<S: ArchiveStream> ZipArchive<S> {
    /// Write the local header of a new entry.
    ///
    /// The name is normalized to a forward-slash relative path. Checksum and
    /// sizes stay zero until [`finish_entry`](Self::finish_entry).
    pub fn begin_entry(
        &mut self,
        method: CompressionMethod,
        name: &str,
        comment: &str,
        times: impl Into<EntryTimes>,
    ) -> Result<ZipFileEntry> {
        self.start_entry(method, normalize_name(name), comment, times.into(), self.options.encode_utf8)
    }

    fn start_entry(
        &mut self,
        method: CompressionMethod,
        file_name: String,
        comment: &str,
        times: EntryTimes,
        utf8: bool,
    ) -> Result<ZipFileEntry> {
        self.ensure_writable()?;
        if let CompressionMethod::Unknown(m) = method {
            return Err(Error::UnsupportedMethod(m));
        }

        let position = self.stream.stream_position()?;
        let lfh_offset =
            u32::try_from(position).map_err(|_| Error::SizeLimit("Local header offset"))?;

        let mut entry = ZipFileEntry {
            file_name,
            compression_method: method,
            compressed_size: 0,
            uncompressed_size: 0,
            crc32: 0,
            lfh_offset,
            data_offset: lfh_offset,
            header_size: 0,
            modified: times.modified,
            accessed: times.accessed,
            created: times.created,
            comment: comment.to_string(),
            utf8,
        };

        let header = entry.local_header();
        header.write_to(&mut self.stream)?;
        entry.header_size = header.len() as u32;
        entry.data_offset = lfh_offset
            .checked_add(entry.header_size)
            .ok_or(Error::SizeLimit("Local header offset"))?;
        Ok(entry)
    }

    /// Stream a forward-only source into the entry.
    ///
    /// The source cannot be replayed, so a DEFLATE payload that turns out
    /// larger than the input is kept as is.
    pub fn write_payload<R: Read>(&mut self, entry: &mut ZipFileEntry, source: &mut R) -> Result<()> {
        self.ensure_writable()?;
        self.stream.seek(SeekFrom::Start(entry.data_offset as u64))?;
        let mut encoder = PayloadEncoder::new(
            &mut self.stream,
            entry.compression_method,
            self.options.compression_level,
        )?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            encoder.push(&buf[..n])?;
        }

        let (_, payload) = encoder.finish()?;
        self.record_payload(entry, payload)
    }

    /// Stream a rewindable source into the entry.
    ///
    /// If DEFLATE made the payload larger than the input, the payload is
    /// cut off, the source rewound, and the entry rewritten as STORED,
    /// unless [`ArchiveOptions::force_deflate`](super::ArchiveOptions) is set.
    pub fn write_payload_rewindable<R: Read + Seek>(
        &mut self,
        entry: &mut ZipFileEntry,
        source: &mut R,
    ) -> Result<()> {
        let source_start = source.stream_position()?;
        self.write_payload(entry, source)?;

        if self.needs_store_fallback(entry) {
            self.prepare_store_fallback(entry)?;
            source.seek(SeekFrom::Start(source_start))?;
            self.write_payload(entry, source)?;
        }
        Ok(())
    }

    /// Non-blocking variant of [`write_payload`](Self::write_payload).
    ///
    /// Suspends only while waiting on the source; the checksum and cursor
    /// state carry over between chunks. If the future is dropped midway the
    /// entry is never recorded and the archive can still be closed.
    pub async fn write_payload_async<R: AsyncRead + Unpin>(
        &mut self,
        entry: &mut ZipFileEntry,
        source: &mut R,
    ) -> Result<()> {
        self.ensure_writable()?;
        self.stream.seek(SeekFrom::Start(entry.data_offset as u64))?;
        let mut encoder = PayloadEncoder::new(
            &mut self.stream,
            entry.compression_method,
            self.options.compression_level,
        )?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            encoder.push(&buf[..n])?;
        }

        let (_, payload) = encoder.finish()?;
        self.record_payload(entry, payload)
    }

    /// Non-blocking variant of [`write_payload_rewindable`](Self::write_payload_rewindable).
    pub async fn write_payload_rewindable_async<R: AsyncRead + AsyncSeek + Unpin>(
        &mut self,
        entry: &mut ZipFileEntry,
        source: &mut R,
    ) -> Result<()> {
        let source_start = source.stream_position().await?;
        self.write_payload_async(entry, source).await?;

        if self.needs_store_fallback(entry) {
            self.prepare_store_fallback(entry)?;
            source.seek(SeekFrom::Start(source_start)).await?;
            self.write_payload_async(entry, source).await?;
        }
        Ok(())
    }

    fn record_payload(&mut self, entry: &mut ZipFileEntry, payload: EncodedPayload) -> Result<()> {
        let end = self.stream.stream_position()?;
        entry.crc32 = payload.crc32;
        entry.uncompressed_size = u32::try_from(payload.uncompressed_size)
            .map_err(|_| Error::SizeLimit("Uncompressed size"))?;
        entry.compressed_size = u32::try_from(end - entry.data_offset as u64)
            .map_err(|_| Error::SizeLimit("Compressed size"))?;
        Ok(())
    }

    fn needs_store_fallback(&self, entry: &ZipFileEntry) -> bool {
        entry.compression_method == CompressionMethod::Deflate
            && !self.options.force_deflate
            && entry.compressed_size > entry.uncompressed_size
    }

    fn prepare_store_fallback(&mut self, entry: &mut ZipFileEntry) -> Result<()> {
        debug!(
            name = %entry.file_name,
            compressed = entry.compressed_size,
            uncompressed = entry.uncompressed_size,
            "deflate inflated the payload, storing instead"
        );
        entry.compression_method = CompressionMethod::Stored;
        self.stream.seek(SeekFrom::Start(entry.data_offset as u64))?;
        self.stream.set_len(entry.data_offset as u64)?;
        Ok(())
    }

    /// Patch the local header with the final method, checksum and sizes and
    /// record the entry for the directory.
    ///
    /// The cursor ends up right after the payload, where the next entry goes.
    pub fn finish_entry(&mut self, entry: ZipFileEntry) -> Result<ZipFileEntry> {
        self.ensure_writable()?;
        let header = entry.lfh_offset as u64;

        self.stream
            .seek(SeekFrom::Start(header + LocalFileHeader::METHOD_OFFSET))?;
        self.stream
            .write_u16::<LittleEndian>(entry.compression_method.as_u16())?;

        self.stream
            .seek(SeekFrom::Start(header + LocalFileHeader::CRC_OFFSET))?;
        self.stream.write_u32::<LittleEndian>(entry.crc32)?;
        self.stream.write_u32::<LittleEndian>(entry.compressed_size)?;
        self.stream.write_u32::<LittleEndian>(entry.uncompressed_size)?;

        self.stream.seek(SeekFrom::Start(
            entry.data_offset as u64 + entry.compressed_size as u64,
        ))?;

        debug!(
            name = %entry.file_name,
            method = ?entry.compression_method,
            compressed = entry.compressed_size,
            uncompressed = entry.uncompressed_size,
            "added entry"
        );
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Add the full contents of a rewindable stream.
    pub fn add_stream<R: Read + Seek>(
        &mut self,
        method: CompressionMethod,
        name: &str,
        source: &mut R,
        times: impl Into<EntryTimes>,
        comment: &str,
    ) -> Result<ZipFileEntry> {
        let mut entry = self.begin_entry(method, name, comment, times)?;
        self.write_payload_rewindable(&mut entry, source)?;
        self.finish_entry(entry)
    }

    /// Add the full contents of a forward-only reader.
    pub fn add_reader<R: Read>(
        &mut self,
        method: CompressionMethod,
        name: &str,
        source: &mut R,
        times: impl Into<EntryTimes>,
        comment: &str,
    ) -> Result<ZipFileEntry> {
        let mut entry = self.begin_entry(method, name, comment, times)?;
        self.write_payload(&mut entry, source)?;
        self.finish_entry(entry)
    }

    /// Non-blocking variant of [`add_stream`](Self::add_stream).
    pub async fn add_stream_async<R: AsyncRead + AsyncSeek + Unpin>(
        &mut self,
        method: CompressionMethod,
        name: &str,
        source: &mut R,
        times: impl Into<EntryTimes>,
        comment: &str,
    ) -> Result<ZipFileEntry> {
        let mut entry = self.begin_entry(method, name, comment, times)?;
        self.write_payload_rewindable_async(&mut entry, source).await?;
        self.finish_entry(entry)
    }

    /// Add a file from disk, recording its timestamps.
    pub fn add_file(
        &mut self,
        method: CompressionMethod,
        path: impl AsRef<Path>,
        name: &str,
        comment: &str,
    ) -> Result<ZipFileEntry> {
        self.ensure_writable()?;
        let mut file = File::open(path)?;
        let times = EntryTimes::from_metadata(&file.metadata()?)?;
        self.add_stream(method, name, &mut file, times, comment)
    }

    /// Record a directory as an empty entry whose name ends with `/`.
    pub fn add_directory_entry(
        &mut self,
        name: &str,
        times: impl Into<EntryTimes>,
        comment: &str,
    ) -> Result<ZipFileEntry> {
        let name = format!("{}/", normalize_name(name));
        let entry = self.start_entry(
            CompressionMethod::Stored,
            name,
            comment,
            times.into(),
            self.options.encode_utf8,
        )?;
        self.finish_entry(entry)
    }

    /// Add a directory tree from disk.
    ///
    /// The directory itself is stored under `name_in_archive` followed by its
    /// last path component, then its files, then each subdirectory in turn.
    pub fn add_directory(
        &mut self,
        method: CompressionMethod,
        path: impl AsRef<Path>,
        name_in_archive: &str,
        comment: &str,
    ) -> Result<Vec<ZipFileEntry>> {
        self.ensure_writable()?;
        let root = path.as_ref();
        let base = match root.file_name() {
            Some(folder) => format!("{}/{}", name_in_archive, folder.to_string_lossy()),
            None => name_in_archive.to_string(),
        };

        let mut added = Vec::new();
        let walker = WalkDir::new(root)
            .sort_by(|a, b| {
                b.file_type()
                    .is_file()
                    .cmp(&a.file_type().is_file())
                    .then_with(|| a.file_name().cmp(b.file_name()))
            });
        for dent in walker {
            let dent = dent.map_err(io::Error::from)?;
            let relative = dent.path().strip_prefix(root).unwrap_or(dent.path());
            let name = format!("{}/{}", base, relative.to_string_lossy());

            if dent.file_type().is_dir() {
                let times = EntryTimes::from_metadata(&dent.metadata().map_err(io::Error::from)?)?;
                let entry_comment = if dent.depth() == 0 { comment } else { "" };
                added.push(self.add_directory_entry(&name, times, entry_comment)?);
            } else if dent.file_type().is_file() {
                added.push(self.add_file(method, dent.path(), &name, "")?);
            }
        }
        Ok(added)
    }

    /// Re-add an entry read from another archive, keeping its name, method,
    /// comment, encoding and timestamps.
    pub(super) fn add_copy_of<R: Read + Seek>(
        &mut self,
        template: &ZipFileEntry,
        source: &mut R,
    ) -> Result<ZipFileEntry> {
        let times = EntryTimes {
            modified: template.modified,
            accessed: template.accessed,
            created: template.created,
        };
        let mut entry = self.start_entry(
            template.compression_method,
            template.file_name.clone(),
            &template.comment,
            times,
            template.utf8,
        )?;
        self.write_payload_rewindable(&mut entry, source)?;
        self.finish_entry(entry)
    }
}
