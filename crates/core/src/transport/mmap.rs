// FabricLink - Host-side FPGA I/O Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{check_word_access, RegisterTransport, WORD_BYTES};
use crate::{BridgeError, BridgeResult};
use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

/// Control region mapped from a device node (`/dev/mem`, UIO) or a plain file.
///
/// The mapping is established once and never resized. Accesses are volatile
/// since the other side of the region changes it behind our back.
pub struct MmapRegion {
    mmap: MmapMut,
    path: PathBuf,
}

impl MmapRegion {
    /// Maps `size` bytes at byte offset `base` of an existing file or device.
    pub fn open<P: AsRef<Path>>(path: P, base: u64, size: u64) -> BridgeResult<Self> {
        let path = path.as_ref();
        if base % WORD_BYTES != 0 {
            return Err(BridgeError::Misaligned(base));
        }
        let map_err = |source: io::Error| BridgeError::Map {
            path: path.to_path_buf(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(map_err)?;

        // Device nodes report a zero length, only plain files can be checked.
        // Touching a page past the end of a file raises SIGBUS.
        let meta = file.metadata().map_err(map_err)?;
        let end = base.checked_add(size);
        if meta.is_file() && end.map_or(true, |end| meta.len() < end) {
            return Err(map_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "file is {} bytes, region needs {:#x}..+{:#x}",
                    meta.len(),
                    base,
                    size
                ),
            )));
        }

        // SAFETY: the region is owned by this process for the session; the
        // only other writer is the target, and every access goes through
        // volatile word reads/writes below.
        let mmap = unsafe {
            MmapOptions::new()
                .offset(base)
                .len(size as usize)
                .map_mut(&file)
        }
        .map_err(map_err)?;

        tracing::info!("Mapped {:#x} bytes of {:?} at offset {:#x}", size, path, base);
        Ok(Self {
            mmap,
            path: path.to_path_buf(),
        })
    }

    /// Creates a plain file of `size` bytes, or extends a shorter one, and
    /// maps the first `size` bytes. Existing content is kept. Used for shared-memory co-simulation where the target is a simulator
    /// process instead of FPGA fabric.
    pub fn create<P: AsRef<Path>>(path: P, size: u64) -> BridgeResult<Self> {
        let path = path.as_ref();
        let map_err = |source: io::Error| BridgeError::Map {
            path: path.to_path_buf(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(map_err)?;
        if file.metadata().map_err(map_err)?.len() < size {
            file.set_len(size).map_err(map_err)?;
        }
        drop(file);

        Self::open(path, 0, size)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes outstanding writes when the region is file backed.
    pub fn flush(&self) -> BridgeResult<()> {
        self.mmap.flush().map_err(|source| BridgeError::Map {
            path: self.path.clone(),
            source,
        })
    }
}

impl std::fmt::Debug for MmapRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmapRegion")
            .field("path", &self.path)
            .field("size", &self.mmap.len())
            .finish()
    }
}

impl RegisterTransport for MmapRegion {
    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn read(&self, offset: u64) -> BridgeResult<u32> {
        check_word_access(offset, self.size())?;
        // SAFETY: bounds and alignment checked above; the mapping start is
        // page aligned plus a word-aligned base.
        let raw = unsafe {
            let ptr = self.mmap.as_ptr().add(offset as usize) as *const u32;
            std::ptr::read_volatile(ptr)
        };
        Ok(u32::from_le(raw))
    }

    fn write(&mut self, offset: u64, value: u32) -> BridgeResult<()> {
        check_word_access(offset, self.size())?;
        // SAFETY: see `read`.
        unsafe {
            let ptr = self.mmap.as_mut_ptr().add(offset as usize) as *mut u32;
            std::ptr::write_volatile(ptr, value.to_le());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_backed_region() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.shm");

        let mut region = MmapRegion::create(&path, 4096).unwrap();
        assert_eq!(region.size(), 4096);
        region.write(0x38, 0x1234_5678).unwrap();
        assert_eq!(region.read(0x38).unwrap(), 0x1234_5678);
        region.flush().unwrap();
        drop(region);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 4096);
        assert_eq!(&bytes[0x38..0x3C], &[0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn test_open_at_base_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.shm");
        let mut contents = vec![0u8; 8192];
        contents[4096..4100].copy_from_slice(&[1, 0, 0, 0]);
        std::fs::write(&path, &contents).unwrap();

        let region = MmapRegion::open(&path, 4096, 4096).unwrap();
        assert_eq!(region.read(0).unwrap(), 1);
        assert!(matches!(
            region.read(4096),
            Err(BridgeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_open_missing_file_is_setup_error() {
        let err = MmapRegion::open("/nonexistent/fabriclink.shm", 0, 4096).unwrap_err();
        assert!(matches!(err, BridgeError::Map { .. }));
    }

    #[test]
    fn test_open_short_file_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.shm");
        std::fs::write(&path, vec![0u8; 100]).unwrap();

        match MmapRegion::open(&path, 4096, 4096) {
            Err(BridgeError::Map { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::InvalidInput);
            }
            other => panic!("expected map error, got {:?}", other),
        }
        // Base zero, file still shorter than the region.
        assert!(matches!(
            MmapRegion::open(&path, 0, 4096),
            Err(BridgeError::Map { .. })
        ));
    }

    #[test]
    fn test_create_keeps_larger_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.shm");
        let mut contents = vec![0u8; 8192];
        contents[0..4].copy_from_slice(&[9, 0, 0, 0]);
        std::fs::write(&path, &contents).unwrap();

        let region = MmapRegion::create(&path, 4096).unwrap();
        assert_eq!(region.size(), 4096);
        assert_eq!(region.read(0).unwrap(), 9);
        drop(region);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8192);
    }
}
