use super::ArchiveStream;
use std::io::{self, Cursor};

fn resize(buf: &mut Vec<u8>, len: u64) -> io::Result<()> {
    let len = usize::try_from(len).map_err(io::Error::other)?;
    buf.resize(len, 0);
    Ok(())
}

impl ArchiveStream for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        resize(self.get_mut(), len)
    }
}

impl ArchiveStream for Cursor<&mut Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        resize(self.get_mut(), len)
    }
}
