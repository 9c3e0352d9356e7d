//! Memory-mapped medium
//!
//! Maps the whole store file with `MAP_SHARED` semantics. Growing extends the
//! file and remaps it; `grow` takes `&mut self`, so no slice into the old
//! mapping can outlive the remap.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use crate::config::Backend;
use crate::error::{Result, TesseraError};

use super::medium::{check_range, Medium};

/// Store file accessed through a growable memory map
#[derive(Debug)]
pub struct MappedMedium {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
}

impl MappedMedium {
    /// Map an already opened store file
    pub fn new(file: File, path: &Path) -> Result<Self> {
        // SAFETY: the store file is opened read+write by this process only and
        // is never modified externally while mapped. The mapping is owned by
        // this struct and every access is bounds-checked against its length.
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .map_err(|e| TesseraError::fatal_io(format!("map {}", path.display()), e))?
        };

        Ok(Self {
            path: path.to_path_buf(),
            file,
            mmap,
        })
    }
}

impl Medium for MappedMedium {
    fn backend(&self) -> Backend {
        Backend::Mapped
    }

    fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(offset, buf.len(), self.len())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.mmap[start..start + buf.len()]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        check_range(offset, data.len(), self.len())?;
        let start = offset as usize;
        self.mmap[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn grow(&mut self, new_len: u64) -> Result<()> {
        if new_len <= self.len() {
            return Ok(());
        }

        self.mmap
            .flush()
            .map_err(|e| TesseraError::fatal_io("flush map before grow", e))?;

        self.file.set_len(new_len).map_err(|e| {
            TesseraError::fatal_io(format!("extend {} to {} bytes", self.path.display(), new_len), e)
        })?;

        // SAFETY: the file was extended before remapping, `&mut self` guarantees
        // no outstanding borrows of the old mapping, and the old mapping is
        // dropped by the assignment below.
        self.mmap = unsafe {
            MmapMut::map_mut(&self.file)
                .map_err(|e| TesseraError::fatal_io(format!("remap {}", self.path.display()), e))?
        };

        tracing::trace!(path = %self.path.display(), len = new_len, "remapped store");
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.mmap
            .flush()
            .map_err(|e| TesseraError::fatal_io("sync map to disk", e))
    }
}
