//! `std::io` adapter over an open file

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::engine::Engine;

use super::FileHandle;

/// Borrowed file plus the engine it lives in, usable anywhere a reader,
/// writer or seeker is expected. Writes go through the engine, so the
/// directory sees size changes.
pub struct FileStream<'a> {
    engine: &'a Engine,
    handle: &'a mut FileHandle,
}

impl<'a> FileStream<'a> {
    pub(crate) fn new(engine: &'a Engine, handle: &'a mut FileHandle) -> Self {
        Self { engine, handle }
    }

    pub fn handle(&self) -> &FileHandle {
        self.handle
    }
}

impl Read for FileStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.engine.read_into(self.handle, buf)?)
    }
}

impl Write for FileStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.engine.write(self.handle, buf)? as usize)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.engine.sync()?)
    }
}

impl Seek for FileStream<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(self.engine.seek(self.handle, pos)?)
    }
}
