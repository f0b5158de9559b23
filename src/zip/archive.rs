//! Archive lifecycle: create, open, close and rebuild-on-removal.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::encoding;
use super::entry::ZipFileEntry;
use super::parser::{ZipParser, parse_central_directory};
use super::structures::{EndOfCentralDirectory, LocalFileHeader};
use crate::error::{Error, Result};
use crate::io::ArchiveStream;

/// How an archive was opened. Fixed for the archive's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    /// Writing; opening an existing archive this way appends to it.
    Write,
}

/// Settings applied to entries added after they are changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Store names and comments as UTF-8 (flag bit 11) instead of CP437.
    pub encode_utf8: bool,
    /// Keep DEFLATE even when it makes an entry larger than the original.
    pub force_deflate: bool,
    /// DEFLATE level, 0 to 9.
    pub compression_level: u32,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            encode_utf8: true,
            force_deflate: false,
            compression_level: 6,
        }
    }
}

impl ArchiveOptions {
    pub fn encode_utf8(mut self, encode_utf8: bool) -> Self {
        self.encode_utf8 = encode_utf8;
        self
    }

    pub fn force_deflate(mut self, force_deflate: bool) -> Self {
        self.force_deflate = force_deflate;
        self
    }

    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }
}

/// A ZIP archive bound to one random-access stream.
///
/// Write-mode archives must be finalized with [`close`](Self::close) or
/// [`finish`](Self::finish); dropping one without doing so leaves the
/// stream without a valid directory.
#[derive(Debug)]
pub struct ZipArchive<S> {
    pub(super) stream: S,
    pub(super) access: AccessMode,
    pub(super) path: Option<PathBuf>,
    /// Entries written this session.
    pub(super) entries: Vec<ZipFileEntry>,
    /// Verbatim Central Directory of the archive as it was opened.
    pub(super) central_dir_image: Option<Vec<u8>>,
    pub(super) existing_entries: u16,
    pub(super) comment: String,
    pub(super) options: ArchiveOptions,
}

impl<S: Read + Seek> ZipArchive<S> {
    /// Open an existing archive from a stream.
    ///
    /// The End of Central Directory record is located and the directory is
    /// kept as a raw image. In [`AccessMode::Write`] the cursor is left at
    /// the start of the old directory, so new entries overwrite it and a new
    /// directory follows them on close.
    pub fn open(mut stream: S, access: AccessMode) -> Result<Self> {
        if access == AccessMode::Write && stream.stream_position().is_err() {
            return Err(Error::StreamNotSeekable);
        }

        let mut parser = ZipParser::new(&mut stream)?;
        let (eocd, eocd_offset) = parser.find_eocd()?;
        let image = parser.read_central_directory(&eocd, eocd_offset)?;
        let comment = parser.read_comment(&eocd, eocd_offset)?;

        stream.seek(SeekFrom::Start(eocd.cd_offset as u64))?;
        debug!(
            entries = eocd.total_entries,
            cd_offset = eocd.cd_offset,
            cd_size = eocd.cd_size,
            ?access,
            "opened archive"
        );

        Ok(Self {
            stream,
            access,
            path: None,
            entries: Vec::new(),
            central_dir_image: Some(image),
            existing_entries: eocd.total_entries,
            comment: decode_archive_comment(comment),
            options: ArchiveOptions::default(),
        })
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }

    pub fn options(&self) -> ArchiveOptions {
        self.options
    }

    pub fn set_options(&mut self, options: ArchiveOptions) {
        self.options = options;
    }

    /// The archive comment.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn set_comment(&mut self, comment: &str) -> Result<()> {
        self.ensure_writable()?;
        self.comment = comment.to_string();
        Ok(())
    }

    /// Entries added during this session, in write order.
    pub fn entries(&self) -> &[ZipFileEntry] {
        &self.entries
    }

    /// Number of entries in the directory the archive was opened with.
    pub fn existing_entry_count(&self) -> u16 {
        self.existing_entries
    }

    pub(super) fn ensure_writable(&self) -> Result<()> {
        match self.access {
            AccessMode::Write => Ok(()),
            AccessMode::Read => Err(Error::WriteNotAllowed),
        }
    }

    /// Parse every record of the directory the archive was opened with.
    ///
    /// Each entry's payload offset is resolved from its local header. A
    /// freshly created archive has no directory yet and yields nothing.
    pub fn read_central_dir(&mut self) -> Result<Vec<ZipFileEntry>> {
        let Some(image) = &self.central_dir_image else {
            return Ok(Vec::new());
        };
        let mut entries = parse_central_directory(image)?;

        let resume = self.stream.stream_position()?;
        let resolved = resolve_data_offsets(&mut self.stream, &mut entries);
        self.stream.seek(SeekFrom::Start(resume))?;
        resolved?;

        Ok(entries)
    }

    /// Every entry: the opened directory followed by this session's additions.
    pub fn list(&mut self) -> Result<Vec<ZipFileEntry>> {
        let mut all = self.read_central_dir()?;
        all.extend(self.entries.iter().cloned());
        Ok(all)
    }
}

/// An entry whose local header lies past the end of the stream keeps its
/// payload offset at the header offset; extracting it reports the mismatch.
fn resolve_data_offsets<S: Read + Seek>(stream: &mut S, entries: &mut [ZipFileEntry]) -> Result<()> {
    let mut parser = ZipParser::new(stream)?;
    for entry in entries {
        if entry.lfh_offset as u64 + LocalFileHeader::SIZE as u64 > parser.size() {
            warn!(
                name = %entry.file_name,
                lfh_offset = entry.lfh_offset,
                "local header offset lies beyond the end of the archive"
            );
            continue;
        }
        let data_offset = parser.local_data_offset(entry.lfh_offset)?;
        entry.data_offset =
            u32::try_from(data_offset).map_err(|_| Error::SizeLimit("Local header offset"))?;
        entry.header_size = entry.data_offset - entry.lfh_offset;
    }
    Ok(())
}

fn decode_archive_comment(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(comment) => comment,
        Err(e) => encoding::decode_cp437(e.as_bytes()),
    }
}

impl<S: ArchiveStream> ZipArchive<S> {
    /// Start a new, empty archive at the stream's current position.
    pub fn create(stream: S, comment: &str) -> Self {
        debug!("created archive");
        Self {
            stream,
            access: AccessMode::Write,
            path: None,
            entries: Vec::new(),
            central_dir_image: None,
            existing_entries: 0,
            comment: comment.to_string(),
            options: ArchiveOptions::default(),
        }
    }

    /// Finalize the archive and release the stream.
    pub fn close(self) -> Result<()> {
        self.finish().map(drop)
    }

    /// Finalize the archive and hand the stream back to the caller.
    ///
    /// In write mode this writes the inherited directory image, one record
    /// per new entry and the End of Central Directory record, then cuts the
    /// stream off after it.
    pub fn finish(mut self) -> Result<S> {
        if self.access == AccessMode::Write {
            self.write_central_directory()?;
        }
        self.stream.flush()?;
        Ok(self.stream)
    }

    fn write_central_directory(&mut self) -> Result<()> {
        let cd_start = self.stream.stream_position()?;
        let cd_offset =
            u32::try_from(cd_start).map_err(|_| Error::SizeLimit("Central directory offset"))?;
        let mut cd_size = 0usize;

        if let Some(image) = &self.central_dir_image {
            self.stream.write_all(image)?;
            cd_size += image.len();
        }
        for entry in &self.entries {
            let header = entry.central_header();
            header.write_to(&mut self.stream)?;
            cd_size += header.len();
        }

        let total = u16::try_from(self.existing_entries as usize + self.entries.len())
            .map_err(|_| Error::SizeLimit("Entry count"))?;
        let cd_size =
            u32::try_from(cd_size).map_err(|_| Error::SizeLimit("Central directory size"))?;
        let comment = encoding::encode(&self.comment, self.options.encode_utf8);
        let comment_len =
            u16::try_from(comment.len()).map_err(|_| Error::SizeLimit("Archive comment length"))?;

        EndOfCentralDirectory::new(total, cd_size, cd_offset, comment_len)
            .write_to(&mut self.stream)?;
        self.stream.write_all(&comment)?;

        let end = self.stream.stream_position()?;
        self.stream.set_len(end)?;
        debug!(entries = total, cd_offset, cd_size, "wrote central directory");
        Ok(())
    }
}

impl ZipArchive<File> {
    /// Create (or truncate) an archive file.
    pub fn create_file(path: impl AsRef<Path>, comment: &str) -> Result<Self> {
        let path = path.as_ref();
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut archive = Self::create(file, comment);
        archive.path = Some(path.to_path_buf());
        Ok(archive)
    }

    /// Open an archive file for reading or appending.
    pub fn open_file(path: impl AsRef<Path>, access: AccessMode) -> Result<Self> {
        let path = path.as_ref();
        let file = File::options()
            .read(true)
            .write(access == AccessMode::Write)
            .open(path)?;
        let mut archive = Self::open(file, access)?;
        archive.path = Some(path.to_path_buf());
        Ok(archive)
    }

    /// Rebuild the archive without the given entries.
    ///
    /// The format has no in-place delete: every other entry is extracted to
    /// a scratch file and added to a new archive next to the original, which
    /// then replaces it by rename. Entries are matched by local header
    /// offset and name. Pending additions of a write-mode archive are
    /// finalized first. On any failure the file on disk is left as it was
    /// before the rebuild started.
    ///
    /// Returns the archive reopened with the same access mode.
    pub fn remove_entries(self, remove: &[ZipFileEntry]) -> Result<ZipArchive<File>> {
        let Some(path) = self.path.clone() else {
            return Err(Error::RemovalNotSupported);
        };
        let access = self.access;
        let options = self.options();
        let comment = self.comment.clone();

        self.close()?;
        let mut source = ZipArchive::open_file(&path, AccessMode::Read)?;
        let keep: Vec<_> = source
            .read_central_dir()?
            .into_iter()
            .filter(|entry| {
                !remove
                    .iter()
                    .any(|r| r.lfh_offset == entry.lfh_offset && r.file_name == entry.file_name)
            })
            .collect();

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let temp_archive = tempfile::Builder::new()
            .prefix(".zipstow-")
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        let mut scratch = tempfile::tempfile()?;

        let mut rebuilt = ZipArchive::create(temp_archive.as_file().try_clone()?, &comment);
        rebuilt.set_options(options);
        for entry in &keep {
            scratch.set_len(0)?;
            scratch.seek(SeekFrom::Start(0))?;
            source.extract(entry, &mut scratch)?;
            scratch.seek(SeekFrom::Start(0))?;
            rebuilt.add_copy_of(entry, &mut scratch)?;
        }
        rebuilt.close()?;
        drop(source);

        temp_archive
            .persist(&path)
            .map_err(|e| Error::Io(e.error))?;
        debug!(
            path = %path.display(),
            kept = keep.len(),
            removed = remove.len(),
            "rebuilt archive without removed entries"
        );

        ZipArchive::open_file(&path, access)
    }
}
