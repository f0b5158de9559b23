use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

use crate::error::{Error, Result};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// Version needed to extract: 2.0, enough for DEFLATE.
pub const VERSION_NEEDED: u16 = 20;

/// Version made by: host 11 (NTFS), specification 2.3.
pub const VERSION_MADE_BY: u16 = 0x0B17;

/// External attributes: Unix mode `0o100400` (regular file) in the high half.
pub const EXTERNAL_ATTRIBUTES: u32 = 0x8100 << 16;

fn length_u16(len: usize, what: &'static str) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::SizeLimit(what))
}

/// Local File Header (LFH) - 30 bytes plus name and extra field
#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    pub flags: u16,
    pub compression_method: u16,
    pub dos_time: u32,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name: Vec<u8>,
    pub extra_field: Vec<u8>,
}

impl LocalFileHeader {
    pub const SIGNATURE: &'static [u8] = b"PK\x03\x04";
    pub const SIZE: usize = 30;

    /// Offset of the compression method field.
    pub const METHOD_OFFSET: u64 = 8;
    /// Offset of the CRC-32 field, followed by both sizes.
    pub const CRC_OFFSET: u64 = 14;
    /// Offset of the file name length field, followed by the extra field length.
    pub const NAME_LENGTH_OFFSET: u64 = 26;

    /// Serialized size including the variable-length tail.
    pub fn len(&self) -> usize {
        Self::SIZE + self.file_name.len() + self.extra_field.len()
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let name_len = length_u16(self.file_name.len(), "File name length")?;
        let extra_len = length_u16(self.extra_field.len(), "Extra field length")?;

        writer.write_all(Self::SIGNATURE)?;
        writer.write_u16::<LittleEndian>(VERSION_NEEDED)?;
        writer.write_u16::<LittleEndian>(self.flags)?;
        writer.write_u16::<LittleEndian>(self.compression_method)?;
        writer.write_u32::<LittleEndian>(self.dos_time)?;
        writer.write_u32::<LittleEndian>(self.crc32)?;
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        writer.write_u32::<LittleEndian>(self.uncompressed_size)?;
        writer.write_u16::<LittleEndian>(name_len)?;
        writer.write_u16::<LittleEndian>(extra_len)?;
        writer.write_all(&self.file_name)?;
        writer.write_all(&self.extra_field)?;
        Ok(())
    }
}

/// Central Directory File Header (CDFH) - 46 bytes plus name, extra field and comment
#[derive(Debug, Clone)]
pub struct CentralDirectoryHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub dos_time: u32,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number_start: u16,
    pub internal_attrs: u16,
    pub external_attrs: u32,
    pub lfh_offset: u32,
    pub file_name: Vec<u8>,
    pub extra_field: Vec<u8>,
    pub file_comment: Vec<u8>,
}

impl CentralDirectoryHeader {
    pub const SIGNATURE: &'static [u8] = b"PK\x01\x02";
    pub const MIN_SIZE: usize = 46;

    /// Serialized size including the variable-length tail.
    pub fn len(&self) -> usize {
        Self::MIN_SIZE + self.file_name.len() + self.extra_field.len() + self.file_comment.len()
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let name_len = length_u16(self.file_name.len(), "File name length")?;
        let extra_len = length_u16(self.extra_field.len(), "Extra field length")?;
        let comment_len = length_u16(self.file_comment.len(), "File comment length")?;

        writer.write_all(Self::SIGNATURE)?;
        writer.write_u16::<LittleEndian>(self.version_made_by)?;
        writer.write_u16::<LittleEndian>(self.version_needed)?;
        writer.write_u16::<LittleEndian>(self.flags)?;
        writer.write_u16::<LittleEndian>(self.compression_method)?;
        writer.write_u32::<LittleEndian>(self.dos_time)?;
        writer.write_u32::<LittleEndian>(self.crc32)?;
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        writer.write_u32::<LittleEndian>(self.uncompressed_size)?;
        writer.write_u16::<LittleEndian>(name_len)?;
        writer.write_u16::<LittleEndian>(extra_len)?;
        writer.write_u16::<LittleEndian>(comment_len)?;
        writer.write_u16::<LittleEndian>(self.disk_number_start)?;
        writer.write_u16::<LittleEndian>(self.internal_attrs)?;
        writer.write_u32::<LittleEndian>(self.external_attrs)?;
        writer.write_u32::<LittleEndian>(self.lfh_offset)?;
        writer.write_all(&self.file_name)?;
        writer.write_all(&self.extra_field)?;
        writer.write_all(&self.file_comment)?;
        Ok(())
    }

    /// Parse one record from a cursor positioned at its signature.
    pub fn read_from(cursor: &mut Cursor<&[u8]>) -> io::Result<Self> {
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != Self::SIGNATURE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Invalid Central Directory File Header",
            ));
        }

        let version_made_by = cursor.read_u16::<LittleEndian>()?;
        let version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let dos_time = cursor.read_u32::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let compressed_size = cursor.read_u32::<LittleEndian>()?;
        let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;
        let file_comment_length = cursor.read_u16::<LittleEndian>()?;
        let disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let external_attrs = cursor.read_u32::<LittleEndian>()?;
        let lfh_offset = cursor.read_u32::<LittleEndian>()?;

        let mut file_name = vec![0u8; file_name_length as usize];
        cursor.read_exact(&mut file_name)?;
        let mut extra_field = vec![0u8; extra_field_length as usize];
        cursor.read_exact(&mut extra_field)?;
        let mut file_comment = vec![0u8; file_comment_length as usize];
        cursor.read_exact(&mut file_comment)?;

        Ok(Self {
            version_made_by,
            version_needed,
            flags,
            compression_method,
            dos_time,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number_start,
            internal_attrs,
            external_attrs,
            lfh_offset,
            file_name,
            extra_field,
            file_comment,
        })
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    /// Trailer for a single-disk archive.
    pub fn new(entries: u16, cd_size: u32, cd_offset: u32, comment_len: u16) -> Self {
        Self {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: entries,
            total_entries: entries,
            cd_size,
            cd_offset,
            comment_len,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(Error::NotAnArchive);
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// Write the fixed part; the caller appends `comment_len` comment bytes.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(Self::SIGNATURE)?;
        writer.write_u16::<LittleEndian>(self.disk_number)?;
        writer.write_u16::<LittleEndian>(self.disk_with_cd)?;
        writer.write_u16::<LittleEndian>(self.disk_entries)?;
        writer.write_u16::<LittleEndian>(self.total_entries)?;
        writer.write_u32::<LittleEndian>(self.cd_size)?;
        writer.write_u32::<LittleEndian>(self.cd_offset)?;
        writer.write_u16::<LittleEndian>(self.comment_len)?;
        Ok(())
    }
}

/// NTFS extra field (0x000A) carrying modification, access and creation
/// times as Windows file times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedTimestamp {
    pub modified: i64,
    pub accessed: i64,
    pub created: i64,
}

impl ExtendedTimestamp {
    pub const HEADER_ID: u16 = 0x000A;
    pub const DATA_SIZE: u16 = 32;
    pub const SIZE: usize = 4 + Self::DATA_SIZE as usize;

    const TIMES_TAG: u16 = 1;
    const TIMES_SIZE: u16 = 24;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut buf);
        buf
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u16::<LittleEndian>(Self::HEADER_ID)?;
        writer.write_u16::<LittleEndian>(Self::DATA_SIZE)?;
        writer.write_u32::<LittleEndian>(0)?; // reserved
        writer.write_u16::<LittleEndian>(Self::TIMES_TAG)?;
        writer.write_u16::<LittleEndian>(Self::TIMES_SIZE)?;
        writer.write_i64::<LittleEndian>(self.modified)?;
        writer.write_i64::<LittleEndian>(self.accessed)?;
        writer.write_i64::<LittleEndian>(self.created)?;
        Ok(())
    }

    /// Scan an extra field area for the timestamp sub-record.
    ///
    /// Unknown blocks are skipped by their declared length; a block running
    /// past the end of the area stops the scan.
    pub fn find(extra: &[u8]) -> Option<Self> {
        let mut cursor = Cursor::new(extra);
        let end = extra.len() as u64;

        while cursor.position() + 4 <= end {
            let header_id = cursor.read_u16::<LittleEndian>().ok()?;
            let data_size = cursor.read_u16::<LittleEndian>().ok()?;
            let block_end = cursor.position() + data_size as u64;
            if block_end > end {
                break;
            }

            if header_id == Self::HEADER_ID {
                let block = &extra[cursor.position() as usize..block_end as usize];
                if let Some(times) = Self::parse_ntfs_block(block) {
                    return Some(times);
                }
            }
            cursor.set_position(block_end);
        }

        None
    }

    fn parse_ntfs_block(block: &[u8]) -> Option<Self> {
        let mut cursor = Cursor::new(block);
        let end = block.len() as u64;
        cursor.set_position(4); // reserved

        while cursor.position() + 4 <= end {
            let tag = cursor.read_u16::<LittleEndian>().ok()?;
            let size = cursor.read_u16::<LittleEndian>().ok()?;
            if tag == Self::TIMES_TAG && size == Self::TIMES_SIZE {
                return Some(Self {
                    modified: cursor.read_i64::<LittleEndian>().ok()?,
                    accessed: cursor.read_i64::<LittleEndian>().ok()?,
                    created: cursor.read_i64::<LittleEndian>().ok()?,
                });
            }
            cursor.set_position(cursor.position() + size as u64);
        }

        None
    }
}
