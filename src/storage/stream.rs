//! Stream medium
//!
//! Positioned reads and writes on a plain file handle: seek, then
//! `read_exact`/`write_all`.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::Backend;
use crate::error::{Result, TesseraError};

use super::medium::{check_range, Medium};

/// Store file accessed through seek + read/write
#[derive(Debug)]
pub struct StreamMedium {
    path: PathBuf,
    file: File,
    len: u64,
}

impl StreamMedium {
    pub fn new(file: File, path: &Path) -> Result<Self> {
        let len = file
            .metadata()
            .map_err(|e| TesseraError::fatal_io(format!("stat {}", path.display()), e))?
            .len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
        })
    }
}

impl Medium for StreamMedium {
    fn backend(&self) -> Backend {
        Backend::Stream
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(offset, buf.len(), self.len)?;
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.read_exact(buf))
            .map_err(|e| TesseraError::fatal_io(format!("read at offset {}", offset), e))
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        check_range(offset, data.len(), self.len)?;
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.write_all(data))
            .map_err(|e| TesseraError::fatal_io(format!("write at offset {}", offset), e))
    }

    fn grow(&mut self, new_len: u64) -> Result<()> {
        if new_len <= self.len {
            return Ok(());
        }

        self.file.set_len(new_len).map_err(|e| {
            TesseraError::fatal_io(format!("extend {} to {} bytes", self.path.display(), new_len), e)
        })?;
        self.len = new_len;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file
            .sync_all()
            .map_err(|e| TesseraError::fatal_io("sync store file", e))
    }
}
