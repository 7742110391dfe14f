//! Serves byte-range reads against a [`Volume`].
//!
//! Every request is zero-filled first; each registered extent it touches
//! then copies its share in. Anything not covered by an extent (gaps between
//! metadata regions, slack at the end of a cluster) reads as zero.

use std::io::{self, ErrorKind, Read, Seek, SeekFrom};

use log::warn;

use super::entry::{FileHandle, Tree};
use super::fat::ExtentKind;
use super::fdpool::DescriptorPool;
use super::import::MAX_FILE_SIZE;
use super::volume::Volume;
use crate::error::{FatblockError, Result};

impl Volume {
    /// Fill `buf` with volume bytes starting at `offset`.
    ///
    /// Fails with [`FatblockError::BackingStoreChanged`] if any backing file
    /// touched by the request was modified since import; the host must
    /// stop serving in that case.
    pub fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        buf.fill(0);
        let len = buf.len() as u64;
        let mut cursor = self.fs.first_extent(offset);

        while let Some(m) = self.fs.find_extent(offset, len, &mut cursor) {
            let from = m.req_off as usize;
            let out = &mut buf[from..from + m.len as usize];
            match m.extent.kind {
                ExtentKind::Boot => copy_with_zero_pad(self.fs.boot_sector(), m.ext_off, out),
                ExtentKind::Info => copy_with_zero_pad(self.fs.fs_info(), m.ext_off, out),
                ExtentKind::Fat => copy_with_zero_pad(self.fs.fat(), m.ext_off, out),
                ExtentKind::Dir(handle) => self.tree.dir(handle).read_at(m.ext_off, out),
                ExtentKind::File(handle) => {
                    read_backing_file(&self.tree, &mut self.pool, handle, m.ext_off, out)?
                }
            }
        }
        Ok(())
    }
}

/// Copy from `src` at `offset`; bytes past the end of `src` stay as they are.
fn copy_with_zero_pad(src: &[u8], offset: u64, out: &mut [u8]) {
    let Ok(offset) = usize::try_from(offset) else {
        return;
    };
    if offset >= src.len() {
        return;
    }
    let n = out.len().min(src.len() - offset);
    out[..n].copy_from_slice(&src[offset..offset + n]);
}

fn read_backing_file(
    tree: &Tree,
    pool: &mut DescriptorPool,
    handle: FileHandle,
    offset: u64,
    out: &mut [u8],
) -> Result<()> {
    let record = tree.file(handle);

    let unchanged = std::fs::metadata(&record.path)
        .and_then(|meta| meta.modified())
        .is_ok_and(|mtime| mtime == record.mtime);
    if !unchanged {
        pool.close(handle);
        return Err(FatblockError::BackingStoreChanged(record.path.clone()));
    }

    if offset.saturating_add(out.len() as u64) > MAX_FILE_SIZE {
        warn!(
            "read of {} truncated at the FAT32 file size limit",
            record.path.display()
        );
    }

    // Cluster slack past the recorded size stays zero
    let len = (out.len() as u64).min(record.size.saturating_sub(offset)) as usize;
    if len == 0 {
        return Ok(());
    }

    let file = pool.open(handle, &record.path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut out[..len]).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            FatblockError::ShortRead {
                path: record.path.clone(),
                offset,
                expected: len,
            }
        } else {
            FatblockError::Io(e)
        }
    })
}

/// Streams a [`Volume`] as a flat image through `Read` and `Seek`.
pub struct VolumeReader<'a> {
    volume: &'a mut Volume,
    position: u64,
}

impl<'a> VolumeReader<'a> {
    pub fn new(volume: &'a mut Volume) -> Self {
        Self {
            volume,
            position: 0,
        }
    }

    pub fn total_size(&self) -> u64 {
        self.volume.size()
    }
}

impl Read for VolumeReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let total = self.volume.size();
        if self.position >= total {
            return Ok(0);
        }
        let n = (buf.len() as u64).min(total - self.position) as usize;
        self.volume.read(&mut buf[..n], self.position)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for VolumeReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(off) => Some(off),
            SeekFrom::End(delta) => self.volume.size().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        match target {
            Some(off) => {
                self.position = off;
                Ok(off)
            }
            None => Err(io::Error::new(
                ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            )),
        }
    }
}
