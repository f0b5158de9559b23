use super::ArchiveStream;
use std::fs::File;
use std::io;

impl ArchiveStream for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}
