mod local;
mod memory;

use std::io::{self, Read, Seek, SeekFrom, Write};

/// Random-access byte channel an archive is bound to.
///
/// Archives only need `Read + Seek` for listing and extraction. Writing
/// additionally needs `Write` and the ability to cut the channel short,
/// which happens when a DEFLATE payload is replaced by its STORED form and
/// when the directory is rewritten on close.
pub trait ArchiveStream: Read + Write + Seek {
    /// Truncate or extend the channel to exactly `len` bytes.
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}

impl<T: ArchiveStream + ?Sized> ArchiveStream for &mut T {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        (**self).set_len(len)
    }
}

/// Total length of a seekable stream, leaving the cursor where it was.
pub(crate) fn stream_len<S: Seek + ?Sized>(stream: &mut S) -> io::Result<u64> {
    let pos = stream.stream_position()?;
    let len = stream.seek(SeekFrom::End(0))?;
    if pos != len {
        stream.seek(SeekFrom::Start(pos))?;
    }
    Ok(len)
}
