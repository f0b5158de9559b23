//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures from any
//! seekable source.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. Read the Central Directory into memory
//! 3. Walk the Central Directory records to get metadata for all files
//! 4. For extraction, read each file's Local File Header to find its data

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom};
use tracing::trace;

use super::entry::ZipFileEntry;
use super::structures::*;
use crate::error::{Error, Result};
use crate::io::stream_len;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Low-level ZIP file parser.
///
/// Borrows the archive stream for the duration of one operation; the
/// stream cursor is left wherever the last read put it.
pub struct ZipParser<R: Read + Seek> {
    /// The underlying data source
    reader: R,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: Read + Seek> ZipParser<R> {
    /// Create a new parser for the given reader.
    pub fn new(mut reader: R) -> Result<Self> {
        let size = stream_len(&mut reader)?;
        Ok(Self { reader, size })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.reader.seek(SeekFrom::Start(offset))?;
        self.reader.read_exact(buf)?;
        Ok(())
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// The EOCD is located at the end of the ZIP file, possibly followed by
    /// a comment. A signature match only counts when its comment length
    /// reaches exactly to the end of the stream, so signature bytes inside
    /// a comment or a stored file name do not fool the search.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in file).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAnArchive`] if no valid EOCD can be found.
    pub fn find_eocd(&mut self) -> Result<(EndOfCentralDirectory, u64)> {
        if self.size < EndOfCentralDirectory::SIZE as u64 {
            return Err(Error::NotAnArchive);
        }

        // Optimization: First try the simple case where there's no comment.
        let offset = self.size - EndOfCentralDirectory::SIZE as u64;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.read_at(offset, &mut buf)?;
        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
            let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
            trace!(offset, "found EOCD without comment");
            return Ok((eocd, offset));
        }

        // EOCD not at expected location - search backwards for it.
        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.read_at(search_start, &mut buf)?;

        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                // The comment must be the very last data in the file.
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;

                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd = EndOfCentralDirectory::from_bytes(
                        &buf[i..i + EndOfCentralDirectory::SIZE],
                    )?;
                    let offset = search_start + i as u64;
                    trace!(offset, comment_len, "found EOCD");
                    return Ok((eocd, offset));
                }
                trace!(offset = search_start + i as u64, "ignoring EOCD signature with bad comment length");
            }
        }

        Err(Error::NotAnArchive)
    }

    /// Read the archive comment that follows the EOCD.
    pub fn read_comment(&mut self, eocd: &EndOfCentralDirectory, eocd_offset: u64) -> Result<Vec<u8>> {
        let mut comment = vec![0u8; eocd.comment_len as usize];
        self.read_at(eocd_offset + EndOfCentralDirectory::SIZE as u64, &mut comment)?;
        Ok(comment)
    }

    /// Read the raw Central Directory described by the EOCD.
    ///
    /// A directory that does not fit between the start of the file and the
    /// EOCD means the archive is not usable.
    pub fn read_central_directory(
        &mut self,
        eocd: &EndOfCentralDirectory,
        eocd_offset: u64,
    ) -> Result<Vec<u8>> {
        let cd_offset = eocd.cd_offset as u64;
        let cd_size = eocd.cd_size as u64;
        if cd_offset + cd_size > eocd_offset {
            return Err(Error::NotAnArchive);
        }

        let mut cd_data = vec![0u8; cd_size as usize];
        self.read_at(cd_offset, &mut cd_data)?;
        Ok(cd_data)
    }

    /// Get the actual data offset for a file entry.
    ///
    /// Verifies the Local File Header signature first, so a stale or corrupt
    /// offset is reported instead of extracting garbage.
    pub fn get_data_offset(&mut self, entry: &ZipFileEntry) -> Result<u64> {
        let mut lfh_buf = [0u8; LocalFileHeader::SIZE];
        let offset = entry.lfh_offset as u64;
        if offset + LocalFileHeader::SIZE as u64 > self.size {
            return Err(Error::LocalHeaderMismatch {
                offset: entry.lfh_offset,
            });
        }
        self.read_at(offset, &mut lfh_buf)?;

        if &lfh_buf[0..4] != LocalFileHeader::SIGNATURE {
            return Err(Error::LocalHeaderMismatch {
                offset: entry.lfh_offset,
            });
        }

        let mut cursor = Cursor::new(&lfh_buf[LocalFileHeader::NAME_LENGTH_OFFSET as usize..]);
        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        Ok(offset + LocalFileHeader::SIZE as u64 + file_name_length + extra_field_length)
    }

    /// Compute where the payload of the local header at `lfh_offset` starts.
    ///
    /// Only the two length fields are read; the signature is checked at
    /// extraction time.
    pub fn local_data_offset(&mut self, lfh_offset: u32) -> Result<u64> {
        let mut lengths = [0u8; 4];
        self.read_at(
            lfh_offset as u64 + LocalFileHeader::NAME_LENGTH_OFFSET,
            &mut lengths,
        )?;
        let file_name_length = u16::from_le_bytes([lengths[0], lengths[1]]) as u64;
        let extra_field_length = u16::from_le_bytes([lengths[2], lengths[3]]) as u64;

        Ok(lfh_offset as u64 + LocalFileHeader::SIZE as u64 + file_name_length + extra_field_length)
    }
}

/// Parse the records of a raw Central Directory image.
///
/// Parsing stops at the first offset that does not hold a Central Directory
/// signature. Payload offsets are not stored in the directory and are left
/// for the caller to resolve.
pub fn parse_central_directory(cd_data: &[u8]) -> Result<Vec<ZipFileEntry>> {
    let mut entries = Vec::new();
    let mut cursor = Cursor::new(cd_data);

    loop {
        let pos = cursor.position() as usize;
        if cd_data.len() < pos + 4 || &cd_data[pos..pos + 4] != CentralDirectoryHeader::SIGNATURE {
            break;
        }

        let header = CentralDirectoryHeader::read_from(&mut cursor)?;
        let entry = ZipFileEntry::from_central_header(&header);
        trace!(
            name = %entry.file_name,
            method = header.compression_method,
            lfh_offset = header.lfh_offset,
            "parsed central directory record"
        );
        entries.push(entry);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn eocd_bytes(entries: u16, cd_size: u32, cd_offset: u32, comment: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        EndOfCentralDirectory::new(entries, cd_size, cd_offset, comment.len() as u16)
            .write_to(&mut buf)
            .unwrap();
        buf.extend_from_slice(comment);
        buf
    }

    #[test]
    fn finds_eocd_without_comment() {
        let data = eocd_bytes(0, 0, 0, b"");
        let mut parser = ZipParser::new(Cursor::new(data)).unwrap();
        let (eocd, offset) = parser.find_eocd().unwrap();
        assert_eq!(offset, 0);
        assert_eq!(eocd.total_entries, 0);
    }

    #[test]
    fn finds_eocd_behind_comment_containing_signature() {
        let mut comment = b"before ".to_vec();
        comment.extend_from_slice(EndOfCentralDirectory::SIGNATURE);
        comment.extend_from_slice(&[0u8; 30]);
        let mut data = vec![0xEE; 10];
        data.extend(eocd_bytes(0, 0, 10, &comment));

        let mut parser = ZipParser::new(Cursor::new(data)).unwrap();
        let (eocd, offset) = parser.find_eocd().unwrap();
        assert_eq!(offset, 10);
        assert_eq!(eocd.cd_offset, 10);
        assert_eq!(parser.read_comment(&eocd, offset).unwrap(), comment);
    }

    #[test]
    fn rejects_non_archives() {
        let mut parser = ZipParser::new(Cursor::new(b"hello world".to_vec())).unwrap();
        assert_eq!(parser.find_eocd().unwrap_err().kind(), ErrorKind::NotAnArchive);

        let mut parser = ZipParser::new(Cursor::new(vec![0u8; 4096])).unwrap();
        assert_eq!(parser.find_eocd().unwrap_err().kind(), ErrorKind::NotAnArchive);
    }

    #[test]
    fn rejects_trailing_garbage_after_eocd() {
        let mut data = eocd_bytes(0, 0, 0, b"");
        data.extend_from_slice(b"junk");
        let mut parser = ZipParser::new(Cursor::new(data)).unwrap();
        assert_eq!(parser.find_eocd().unwrap_err().kind(), ErrorKind::NotAnArchive);
    }

    #[test]
    fn directory_outside_archive_is_rejected() {
        let data = eocd_bytes(1, 100, 0, b"");
        let mut parser = ZipParser::new(Cursor::new(data)).unwrap();
        let (eocd, offset) = parser.find_eocd().unwrap();
        assert_eq!(
            parser.read_central_directory(&eocd, offset).unwrap_err().kind(),
            ErrorKind::NotAnArchive
        );
    }

    #[test]
    fn parse_stops_at_foreign_bytes() {
        let header = CentralDirectoryHeader {
            version_made_by: VERSION_MADE_BY,
            version_needed: VERSION_NEEDED,
            flags: 0,
            compression_method: 0,
            dos_time: 0,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            disk_number_start: 0,
            internal_attrs: 0,
            external_attrs: EXTERNAL_ATTRIBUTES,
            lfh_offset: 0,
            file_name: b"one".to_vec(),
            extra_field: vec![],
            file_comment: vec![],
        };
        let mut cd = Vec::new();
        header.write_to(&mut cd).unwrap();
        header.write_to(&mut cd).unwrap();
        cd.extend_from_slice(b"trailing comment bytes");

        let entries = parse_central_directory(&cd).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].file_name, "one");
    }
}
