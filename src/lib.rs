//! # zipstow
//!
//! A single-file ZIP archive engine: create archives, append to them, list
//! and extract their entries, and remove entries by rebuilding the file.
//!
//! An archive is bound to one random-access stream for its whole lifetime.
//! Files on disk and in-memory buffers both work; anything that implements
//! [`ArchiveStream`] can be written to.
//!
//! ## Features
//!
//! - STORED and DEFLATE entries, streamed in bounded chunks
//! - Appending to existing archives without rewriting their payloads
//! - CRC-32 verification on every extraction
//! - UTF-8 or CP437 names, precise NTFS timestamps
//! - Async payload sources and sinks on top of tokio
//!
//! ## Example
//!
//! ```no_run
//! use std::io::Cursor;
//! use zipstow::{AccessMode, CompressionMethod, EntryTimes, ZipArchive};
//!
//! fn main() -> zipstow::Result<()> {
//!     let mut zip = ZipArchive::create_file("notes.zip", "")?;
//!     let mut data = Cursor::new(b"hello".to_vec());
//!     zip.add_stream(CompressionMethod::Deflate, "hello.txt", &mut data, EntryTimes::now(), "")?;
//!     zip.close()?;
//!
//!     let mut zip = ZipArchive::open_file("notes.zip", AccessMode::Read)?;
//!     for entry in zip.read_central_dir()? {
//!         println!("{} ({} bytes)", entry.file_name, entry.uncompressed_size);
//!     }
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod cli;
pub mod error;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use error::{Error, ErrorKind, Result};
pub use io::ArchiveStream;
pub use zip::{
    AccessMode, ArchiveOptions, CompressionMethod, EntryTimes, ZipArchive, ZipFileEntry,
};
