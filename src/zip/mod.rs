//! ZIP archive reading, writing and extraction.
//!
//! ## Architecture
//!
//! - [`structures`]: Fixed-layout records (local header, directory record, EOCD, extra fields)
//! - [`parser`]: Locating the EOCD and walking the Central Directory
//! - `writer`: Streaming entries into an archive and patching their headers
//! - `extractor`: Streaming entries out of an archive with checksum verification
//! - `archive`: The [`ZipArchive`] lifecycle tying the above to one stream
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! Appending reuses this layout: the old directory is kept as a raw image,
//! new entries overwrite it on disk, and the image is written back followed
//! by records for the new entries when the archive is closed.
//!
//! ## Supported Features
//!
//! - STORED and DEFLATE entries, with a STORED fallback for incompressible data
//! - UTF-8 or CP437 names and comments
//! - Precise timestamps in the NTFS extra field, DOS timestamps otherwise
//!
//! ## Limitations
//!
//! - No ZIP64, so entries, offsets and the directory are limited to 4 GiB
//!   and 65535 entries
//! - No encryption and no multi-disk archives

mod archive;
mod codec;
pub mod crc32;
pub mod encoding;
mod entry;
mod extractor;
pub mod parser;
pub mod structures;
pub mod time;
mod writer;

pub use archive::{AccessMode, ArchiveOptions, ZipArchive};
pub use entry::ZipFileEntry;
pub use parser::ZipParser;
pub use structures::CompressionMethod;
pub use writer::EntryTimes;
