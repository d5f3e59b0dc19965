#![allow(unsafe_code)]

//! Backing memory for the link region.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use memmap2::MmapMut;
use tracing::debug;

use crate::types::{DoubletError, Result};

/// A contiguous, growable byte region holding the header slot and records.
pub(crate) trait LinkMemory: Send {
    fn bytes(&self) -> &[u8];
    fn bytes_mut(&mut self) -> &mut [u8];
    /// Grows the region to `new_len` bytes. New bytes read as zero.
    fn grow(&mut self, new_len: usize) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// Volatile region for tests and scratch stores.
pub(crate) struct HeapMemory {
    data: Vec<u8>,
}

impl HeapMemory {
    pub fn new(len: usize) -> Self {
        Self { data: vec![0; len] }
    }
}

impl LinkMemory for HeapMemory {
    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn grow(&mut self, new_len: usize) -> Result<()> {
        if new_len > self.data.len() {
            self.data.resize(new_len, 0);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// File-backed region mapped into memory. The file stays exclusively locked
/// for the lifetime of the value.
pub(crate) struct FileMemory {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
}

impl FileMemory {
    /// Opens or creates `path`, making sure it is at least `min_len` bytes.
    pub fn open(path: &Path, min_len: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        file.try_lock_exclusive().map_err(|e| {
            DoubletError::Io(std::io::Error::new(
                e.kind(),
                format!("link store {} is locked: {e}", path.display()),
            ))
        })?;

        let file_len = file.metadata()?.len();
        if file_len < min_len as u64 {
            file.set_len(min_len as u64)?;
        }

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        debug!(
            path = %path.display(),
            bytes = mmap.len(),
            "links.mapped"
        );
        Ok(Self {
            path: path.to_path_buf(),
            file,
            mmap,
        })
    }
}

impl LinkMemory for FileMemory {
    fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    fn grow(&mut self, new_len: usize) -> Result<()> {
        if new_len <= self.mmap.len() {
            return Ok(());
        }
        self.mmap.flush()?;
        self.file.set_len(new_len as u64)?;
        self.mmap = unsafe { MmapMut::map_mut(&self.file)? };
        debug!(
            path = %self.path.display(),
            bytes = new_len,
            "links.remapped"
        );
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.mmap.flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}

impl Drop for FileMemory {
    fn drop(&mut self) {
        let _ = self.mmap.flush();
        let _ = FileExt::unlock(&self.file);
    }
}
