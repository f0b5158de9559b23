use std::fs::{self, File, FileTimes};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::archive::ZipArchive;
use super::codec::PayloadDecoder;
use super::entry::ZipFileEntry;
use super::parser::ZipParser;
use crate::error::{Error, Result};

impl<S: Read + Seek> ZipArchive<S> {
    /// Position the stream at the entry's payload and set up its decoder.
    ///
    /// The local header is checked first; a mismatch fails before anything
    /// reaches the sink.
    fn open_payload<'a>(&'a mut self, entry: &ZipFileEntry) -> Result<PayloadDecoder<&'a mut S>> {
        let data_offset = ZipParser::new(&mut self.stream)?.get_data_offset(entry)?;
        self.stream.seek(SeekFrom::Start(data_offset))?;
        PayloadDecoder::new(
            &mut self.stream,
            entry.compression_method,
            entry.compressed_size as u64,
            entry.uncompressed_size as u64,
            entry.crc32,
            &entry.file_name,
        )
    }

    /// Write an entry's uncompressed bytes to `sink`.
    ///
    /// The archive cursor is restored afterwards, so extraction can happen
    /// in the middle of a write session.
    pub fn extract<W: Write>(&mut self, entry: &ZipFileEntry, sink: &mut W) -> Result<()> {
        let resume = self.stream.stream_position()?;
        let copied = self.copy_payload(entry, sink);
        self.stream.seek(SeekFrom::Start(resume))?;
        copied
    }

    fn copy_payload<W: Write>(&mut self, entry: &ZipFileEntry, sink: &mut W) -> Result<()> {
        let mut decoder = self.open_payload(entry)?;
        while let Some(chunk) = decoder.next_chunk()? {
            sink.write_all(chunk)?;
        }
        decoder.finish()?;
        sink.flush()?;
        Ok(())
    }

    pub fn extract_to_vec(&mut self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(entry.uncompressed_size as usize);
        self.extract(entry, &mut out)?;
        Ok(out)
    }

    /// Extract an entry to a path on disk.
    ///
    /// Missing parent directories are created. A directory entry only
    /// creates the directory. The entry's timestamps are applied to the
    /// result; a file left half-written by a failure is removed.
    pub fn extract_to_file(&mut self, entry: &ZipFileEntry, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if entry.enclosed_name().is_none() {
            return Err(Error::UnsafeEntryName(entry.file_name.clone()));
        }

        if entry.is_directory() {
            fs::create_dir_all(path)?;
            debug!(name = %entry.file_name, path = %path.display(), "created directory");
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = File::create(path)?;
        if let Err(e) = self.extract(entry, &mut file) {
            drop(file);
            if let Err(cleanup) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %cleanup, "failed to remove partial file");
            }
            return Err(e);
        }
        file.set_times(file_times(entry))?;

        debug!(
            name = %entry.file_name,
            path = %path.display(),
            size = entry.uncompressed_size,
            "extracted entry"
        );
        Ok(())
    }

    /// Non-blocking variant of [`extract`](Self::extract) for async sinks.
    pub async fn extract_async<W: AsyncWrite + Unpin>(
        &mut self,
        entry: &ZipFileEntry,
        sink: &mut W,
    ) -> Result<()> {
        let resume = self.stream.stream_position()?;
        let copied = self.copy_payload_async(entry, sink).await;
        self.stream.seek(SeekFrom::Start(resume))?;
        copied
    }

    async fn copy_payload_async<W: AsyncWrite + Unpin>(
        &mut self,
        entry: &ZipFileEntry,
        sink: &mut W,
    ) -> Result<()> {
        let mut decoder = self.open_payload(entry)?;
        while let Some(chunk) = decoder.next_chunk()? {
            sink.write_all(chunk).await?;
        }
        decoder.finish()?;
        sink.flush().await?;
        Ok(())
    }
}

fn file_times(entry: &ZipFileEntry) -> FileTimes {
    let times = FileTimes::new()
        .set_modified(entry.modified.into())
        .set_accessed(entry.accessed.into());

    #[cfg(windows)]
    let times = {
        use std::os::windows::fs::FileTimesExt;
        times.set_created(entry.created.into())
    };
    #[cfg(target_os = "macos")]
    let times = {
        use std::os::macos::fs::FileTimesExt;
        times.set_created(entry.created.into())
    };

    times
}
