use std::path::PathBuf;
use std::time::SystemTime;

use super::dirent::{Dirent, DIRENT_SIZE};

/// Index of a [`FileRecord`] within a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(pub usize);

/// Index of a [`DirRecord`] within a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirHandle(pub usize);

/// A backing file referenced by the volume. Contents are never copied.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: PathBuf,
    /// Size at import time, clamped to the FAT32 limit.
    pub size: u64,
    pub dev: u64,
    pub ino: u64,
    /// Modification time captured at import; reads fail if it changes.
    pub mtime: SystemTime,
    pub first_cluster: u32,
}

/// A directory table synthesized from a real directory.
#[derive(Debug, Clone)]
pub struct DirRecord {
    pub path: PathBuf,
    /// Declared table size in bytes.
    pub size: u64,
    pub first_cluster: u32,
    /// `.` and `..` come first in every directory except the root.
    pub entries: Vec<Dirent>,
}

impl DirRecord {
    /// Copy table bytes starting at `offset` into `buf`.
    ///
    /// Bytes past the last entry are left untouched; the caller zero-fills.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) {
        let mut done = 0;
        while done < buf.len() {
            let pos = offset + done as u64;
            let Some(entry) = self.entries.get((pos / DIRENT_SIZE as u64) as usize) else {
                break;
            };
            let within = (pos % DIRENT_SIZE as u64) as usize;
            let n = (DIRENT_SIZE - within).min(buf.len() - done);
            buf[done..done + n].copy_from_slice(&entry.as_bytes()[within..within + n]);
            done += n;
        }
    }
}

/// All file and directory records of an imported volume.
#[derive(Debug, Default)]
pub struct Tree {
    pub files: Vec<FileRecord>,
    pub dirs: Vec<DirRecord>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_file(&mut self, record: FileRecord) -> FileHandle {
        self.files.push(record);
        FileHandle(self.files.len() - 1)
    }

    pub fn push_dir(&mut self, record: DirRecord) -> DirHandle {
        self.dirs.push(record);
        DirHandle(self.dirs.len() - 1)
    }

    pub fn file(&self, handle: FileHandle) -> &FileRecord {
        &self.files[handle.0]
    }

    pub fn dir(&self, handle: DirHandle) -> &DirRecord {
        &self.dirs[handle.0]
    }

    pub fn dir_mut(&mut self, handle: DirHandle) -> &mut DirRecord {
        &mut self.dirs[handle.0]
    }
}
