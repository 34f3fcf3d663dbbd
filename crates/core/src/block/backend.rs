// FabricLink - Host-side FPGA I/O Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{BlockBackend, SECTOR_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

fn check_range(nsectors: u64, sector: u64, count: u32) -> io::Result<()> {
    match sector.checked_add(count as u64) {
        Some(end) if end <= nsectors => Ok(()),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "sectors {}..+{} outside device of {} sectors",
                sector, count, nsectors
            ),
        )),
    }
}

fn check_payload(count: u32, data: &[u8]) -> io::Result<()> {
    let expected = count as usize * SECTOR_SIZE;
    if data.len() != expected {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload is {} bytes, expected {}", data.len(), expected),
        ));
    }
    Ok(())
}

/// A disk image file.
#[derive(Debug)]
pub struct FileBackend {
    file: File,
    path: PathBuf,
    nsectors: u64,
}

impl FileBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len % SECTOR_SIZE as u64 != 0 {
            tracing::warn!(
                "Disk image {:?} is {} bytes, trailing {} bytes are not addressable",
                path,
                len,
                len % SECTOR_SIZE as u64
            );
        }
        Ok(Self {
            file,
            path: path.to_path_buf(),
            nsectors: len / SECTOR_SIZE as u64,
        })
    }

    /// Opens `path`, creating a zero-filled image of `create_size` bytes
    /// (rounded up to whole sectors) if it does not exist yet.
    pub fn open_or_create<P: AsRef<Path>>(path: P, create_size: Option<u64>) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(size) = create_size {
            if !path.exists() {
                let sectors = size.div_ceil(SECTOR_SIZE as u64);
                let file = OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(path)?;
                file.set_len(sectors * SECTOR_SIZE as u64)?;
                tracing::info!("Created disk image {:?} ({} sectors)", path, sectors);
            }
        }
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockBackend for FileBackend {
    fn nsectors(&self) -> u64 {
        self.nsectors
    }

    fn read(&mut self, sector: u64, count: u32) -> io::Result<Vec<u8>> {
        check_range(self.nsectors, sector, count)?;
        let mut buf = vec![0u8; count as usize * SECTOR_SIZE];
        self.file
            .seek(SeekFrom::Start(sector * SECTOR_SIZE as u64))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write(&mut self, sector: u64, count: u32, data: &[u8]) -> io::Result<()> {
        check_range(self.nsectors, sector, count)?;
        check_payload(count, data)?;
        self.file
            .seek(SeekFrom::Start(sector * SECTOR_SIZE as u64))?;
        self.file.write_all(data)?;
        self.file.flush()
    }
}

/// A RAM disk.
#[derive(Debug, Clone)]
pub struct MemBackend {
    data: Vec<u8>,
}

impl MemBackend {
    pub fn new(nsectors: u64) -> Self {
        Self {
            data: vec![0; nsectors as usize * SECTOR_SIZE],
        }
    }

    /// Wraps an existing image. A partial last sector is zero padded.
    pub fn from_bytes(mut data: Vec<u8>) -> Self {
        let padded = data.len().div_ceil(SECTOR_SIZE) * SECTOR_SIZE;
        data.resize(padded, 0);
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl BlockBackend for MemBackend {
    fn nsectors(&self) -> u64 {
        (self.data.len() / SECTOR_SIZE) as u64
    }

    fn read(&mut self, sector: u64, count: u32) -> io::Result<Vec<u8>> {
        check_range(self.nsectors(), sector, count)?;
        let start = sector as usize * SECTOR_SIZE;
        let end = start + count as usize * SECTOR_SIZE;
        Ok(self.data[start..end].to_vec())
    }

    fn write(&mut self, sector: u64, count: u32, data: &[u8]) -> io::Result<()> {
        check_range(self.nsectors(), sector, count)?;
        check_payload(count, data)?;
        let start = sector as usize * SECTOR_SIZE;
        self.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}
