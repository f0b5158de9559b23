use chrono::{DateTime, Utc};
use std::path::{Component, PathBuf};
use tracing::warn;

use super::encoding::{self, FLAG_UTF8};
use super::structures::*;
use super::time;

/// One archived item, as written this session or parsed from a directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ZipFileEntry {
    /// Forward-slash path inside the archive; directories end with `/`.
    pub file_name: String,
    pub compression_method: CompressionMethod,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub crc32: u32,
    /// Absolute offset of the local file header.
    pub lfh_offset: u32,
    /// Absolute offset of the first payload byte.
    pub data_offset: u32,
    /// Size of the local file header including name and extra field.
    pub header_size: u32,
    pub modified: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub comment: String,
    /// Name and comment are stored as UTF-8 rather than CP437.
    pub utf8: bool,
}

impl ZipFileEntry {
    pub fn is_directory(&self) -> bool {
        self.file_name.ends_with('/')
    }

    /// The name as a relative path, or `None` if it would climb out of the
    /// directory it is extracted into.
    pub fn enclosed_name(&self) -> Option<PathBuf> {
        if self.file_name.contains('\0') {
            return None;
        }
        let path = PathBuf::from(&self.file_name);
        let mut depth = 0usize;
        for component in path.components() {
            match component {
                Component::Prefix(_) | Component::RootDir => return None,
                Component::ParentDir => depth = depth.checked_sub(1)?,
                Component::Normal(_) => depth += 1,
                Component::CurDir => (),
            }
        }
        Some(path)
    }

    fn flags(&self) -> u16 {
        if self.utf8 { FLAG_UTF8 } else { 0 }
    }

    fn extra_field(&self) -> Vec<u8> {
        ExtendedTimestamp {
            modified: time::to_filetime(&self.modified),
            accessed: time::to_filetime(&self.accessed),
            created: time::to_filetime(&self.created),
        }
        .to_bytes()
    }

    /// Local header with checksum and sizes as currently known.
    pub(crate) fn local_header(&self) -> LocalFileHeader {
        LocalFileHeader {
            flags: self.flags(),
            compression_method: self.compression_method.as_u16(),
            dos_time: time::to_dos(&self.modified),
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            file_name: encoding::encode(&self.file_name, self.utf8),
            extra_field: self.extra_field(),
        }
    }

    pub(crate) fn central_header(&self) -> CentralDirectoryHeader {
        CentralDirectoryHeader {
            version_made_by: VERSION_MADE_BY,
            version_needed: VERSION_NEEDED,
            flags: self.flags(),
            compression_method: self.compression_method.as_u16(),
            dos_time: time::to_dos(&self.modified),
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            disk_number_start: 0,
            internal_attrs: 0,
            external_attrs: EXTERNAL_ATTRIBUTES,
            lfh_offset: self.lfh_offset,
            file_name: encoding::encode(&self.file_name, self.utf8),
            extra_field: self.extra_field(),
            file_comment: encoding::encode(&self.comment, self.utf8),
        }
    }

    /// Build an entry from a parsed directory record.
    ///
    /// The payload offset is unknown until the local header has been read;
    /// it is left at the header offset.
    pub(crate) fn from_central_header(header: &CentralDirectoryHeader) -> Self {
        let utf8 = header.flags & FLAG_UTF8 != 0;
        let file_name = encoding::decode(&header.file_name, utf8);

        let precise = ExtendedTimestamp::find(&header.extra_field).and_then(|times| {
            Some((
                time::from_filetime(times.modified)?,
                time::from_filetime(times.accessed)?,
                time::from_filetime(times.created)?,
            ))
        });
        let (modified, accessed, created) = precise.unwrap_or_else(|| {
            let modified = time::from_dos(header.dos_time).unwrap_or_else(|| {
                warn!(
                    name = %file_name,
                    dos_time = header.dos_time,
                    "out-of-range DOS timestamp, substituting the current time"
                );
                Utc::now()
            });
            (modified, modified, modified)
        });

        Self {
            file_name,
            compression_method: CompressionMethod::from_u16(header.compression_method),
            compressed_size: header.compressed_size,
            uncompressed_size: header.uncompressed_size,
            crc32: header.crc32,
            lfh_offset: header.lfh_offset,
            data_offset: header.lfh_offset,
            header_size: 0,
            modified,
            accessed,
            created,
            comment: encoding::decode(&header.file_comment, utf8),
            utf8,
        }
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (i32, u32, u32) {
        use chrono::Datelike;
        (self.modified.year(), self.modified.month(), self.modified.day())
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u32, u32, u32) {
        use chrono::Timelike;
        (
            self.modified.hour(),
            self.modified.minute(),
            self.modified.second(),
        )
    }
}
