//! Backing medium abstraction
//!
//! The block layer talks to the store file through this trait only, so the
//! allocator, free list and file logic are written once and run unchanged on
//! either a memory map or a positioned file stream.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::config::Backend;
use crate::error::{Result, TesseraError};

use super::header::HEADER_REGION_SIZE;
use super::{MappedMedium, StreamMedium};

/// Raw, byte-addressable storage medium.
///
/// Lengths only ever grow. Every read or write must lie within `len()`;
/// callers grow the medium first.
pub trait Medium: Send {
    /// Which backend this is
    fn backend(&self) -> Backend;

    /// Current length in bytes
    fn len(&self) -> u64;

    /// Fill `buf` from `offset`
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `data` at `offset`
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Extend the medium to `new_len` bytes (no-op if already that long)
    fn grow(&mut self, new_len: u64) -> Result<()>;

    /// Flush everything written so far to durable storage
    fn sync(&mut self) -> Result<()>;
}

/// Open (or create) the store file at `path` with the requested backend.
///
/// Returns the medium and whether the file already held a store.
pub fn open_medium(backend: Backend, path: &Path) -> Result<(Box<dyn Medium>, bool)> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .map_err(|e| TesseraError::fatal_io(format!("open {}", path.display()), e))?;

    let existing_len = file
        .metadata()
        .map_err(|e| TesseraError::fatal_io(format!("stat {}", path.display()), e))?
        .len();
    let existed = existing_len > 0 && !header_is_blank(&mut file, existing_len)?;

    // A fresh file gets its header region before it is mapped. A file whose
    // creation stopped before the first header write starts over.
    if !existed {
        if existing_len > 0 {
            tracing::warn!(
                path = %path.display(),
                len = existing_len,
                "store file has a blank header, recreating it"
            );
            file.set_len(0)
                .map_err(|e| TesseraError::fatal_io("discard blank store", e))?;
        }
        file.set_len(HEADER_REGION_SIZE)
            .map_err(|e| TesseraError::fatal_io("reserve header region", e))?;
    }

    let medium: Box<dyn Medium> = match backend {
        Backend::Mapped => Box::new(MappedMedium::new(file, path)?),
        Backend::Stream => Box::new(StreamMedium::new(file, path)?),
    };

    Ok((medium, existed))
}

/// Whether the header region holds nothing but zeros. A store always writes
/// its magic before anything else, so such a file never held a store.
fn header_is_blank(file: &mut File, len: u64) -> Result<bool> {
    let mut raw = vec![0u8; len.min(HEADER_REGION_SIZE) as usize];
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.read_exact(&mut raw))
        .map_err(|e| TesseraError::fatal_io("read header region", e))?;
    Ok(raw.iter().all(|&b| b == 0))
}

/// Check that `[offset, offset + len)` lies inside a medium of `medium_len` bytes
pub(super) fn check_range(offset: u64, len: usize, medium_len: u64) -> Result<()> {
    let end = offset.checked_add(len as u64);
    match end {
        Some(end) if end <= medium_len => Ok(()),
        _ => Err(TesseraError::fatal_io(
            format!(
                "access of {} bytes at offset {} beyond medium length {}",
                len, offset, medium_len
            ),
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "out of range"),
        )),
    }
}
