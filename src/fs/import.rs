//! Builds the FAT32 tree from a real directory.
//!
//! Directories are imported depth-first and allocated bottom-up: a
//! directory's table is allocated only after all of its children, so its
//! first cluster is unknown while the children are built. Each child
//! directory's `..` entry is therefore left pending and patched once the
//! parent's own allocation succeeds.

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs::Metadata;
use std::path::Path;

use log::{debug, info, warn};

use super::dirent::{Dirent, ATTR_DIRECTORY, DIRENT_SIZE};
use super::entry::{DirHandle, DirRecord, FileHandle, FileRecord, Tree};
use super::fat::{ExtentKind, FatFs};
use super::shortname::{self, ShortName, DOTDOT_NAME, DOT_NAME};
use crate::error::{FatblockError, Result};

/// Largest file size a FAT32 directory entry can describe.
pub const MAX_FILE_SIZE: u64 = u32::MAX as u64;

/// Position of the `..` entry in a non-root directory table.
const DOTDOT_INDEX: usize = 1;

#[derive(Debug, Clone, Copy)]
pub struct FileImport {
    pub handle: FileHandle,
    pub first_cluster: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct DirImport {
    pub handle: DirHandle,
    pub first_cluster: u32,
}

struct Child {
    name: ShortName,
    attr: u8,
    first_cluster: u32,
    size: u32,
    /// Set for subdirectories whose `..` entry awaits this directory's cluster.
    pending: Option<DirHandle>,
}

/// Import `root` as the volume's root directory.
pub fn import_tree(fs: &mut FatFs, tree: &mut Tree, root: &Path) -> Result<DirImport> {
    if !std::fs::metadata(root)?.is_dir() {
        return Err(FatblockError::NotADirectory(root.to_path_buf()));
    }

    let result = import_dir(fs, tree, root, true)?;
    fs.set_root_cluster(result.first_cluster);
    fs.update_free_count();

    info!(
        "imported {} files and {} directories from {}, {} of {} clusters free",
        tree.files.len(),
        tree.dirs.len(),
        root.display(),
        fs.free_clusters(),
        fs.num_clusters() - 2
    );
    Ok(result)
}

/// Register a regular file. The file is not opened; `meta` must come from
/// a stat of `path`.
pub fn import_file(
    fs: &mut FatFs,
    tree: &mut Tree,
    path: &Path,
    meta: &Metadata,
) -> Result<FileImport> {
    let mut size = meta.len();
    if size > MAX_FILE_SIZE {
        warn!(
            "{} is {} bytes, truncating to the FAT32 limit of {} bytes",
            path.display(),
            size,
            MAX_FILE_SIZE
        );
        size = MAX_FILE_SIZE;
    }
    let mtime = meta.modified()?;
    let (dev, ino) = file_identity(meta);

    let handle = tree.push_file(FileRecord {
        path: path.to_path_buf(),
        size,
        dev,
        ino,
        mtime,
        first_cluster: 0,
    });
    let (_, first_cluster) = fs.alloc_extent(size, ExtentKind::File(handle))?;
    tree.files[handle.0].first_cluster = first_cluster;

    Ok(FileImport {
        handle,
        first_cluster,
        size: size as u32,
    })
}

/// Import a directory and everything below it.
///
/// Entries that cannot be named or stat'ed are dropped; allocation
/// failures abort the import.
///
/// Symlinks are followed. A directory that is already being imported
/// further up the current path is skipped so link cycles terminate.
pub fn import_dir(fs: &mut FatFs, tree: &mut Tree, path: &Path, is_root: bool) -> Result<DirImport> {
    let mut ancestors: Vec<(u64, u64)> = dir_identity(&std::fs::metadata(path)?)
        .into_iter()
        .collect();
    walk_dir(fs, tree, path, is_root, &mut ancestors)
}

/// `ancestors` holds the identities of the directories from the import
/// root down to `path`.
fn walk_dir(
    fs: &mut FatFs,
    tree: &mut Tree,
    path: &Path,
    is_root: bool,
    ancestors: &mut Vec<(u64, u64)>,
) -> Result<DirImport> {
    let mut names: Vec<OsString> = std::fs::read_dir(path)?
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.file_name()),
            Err(e) => {
                warn!("skipping unreadable entry in {}: {e}", path.display());
                None
            }
        })
        .collect();
    names.sort();

    let mut children: Vec<Child> = Vec::with_capacity(names.len());
    let mut used_names: HashSet<ShortName> = HashSet::with_capacity(names.len());

    for name in &names {
        let Some(raw) = name_bytes(name) else {
            debug!("skipping non-UTF-8 name {:?} in {}", name, path.display());
            continue;
        };
        if raw.first() == Some(&b'.') {
            continue;
        }
        let Some(short) = shortname::convert(raw) else {
            debug!("skipping {:?}: no 8.3 equivalent", name);
            continue;
        };
        if !used_names.insert(short) {
            warn!(
                "skipping {:?} in {}: short name {} already used",
                name,
                path.display(),
                shortname::display(&short)
            );
            continue;
        }

        let child_path = path.join(name);
        let meta = match std::fs::metadata(&child_path) {
            Ok(meta) => meta,
            Err(e) => {
                warn!("skipping {}: {e}", child_path.display());
                used_names.remove(&short);
                continue;
            }
        };

        let child = if meta.is_dir() {
            let identity = dir_identity(&meta);
            if identity.is_some_and(|id| ancestors.contains(&id)) {
                warn!(
                    "skipping {}: links back to a directory being imported",
                    child_path.display()
                );
                used_names.remove(&short);
                continue;
            }
            ancestors.extend(identity);
            let result = walk_dir(fs, tree, &child_path, false, ancestors);
            if identity.is_some() {
                ancestors.pop();
            }
            match result {
                Ok(dir) => Child {
                    name: short,
                    attr: ATTR_DIRECTORY,
                    first_cluster: dir.first_cluster,
                    size: 0,
                    pending: Some(dir.handle),
                },
                Err(FatblockError::Io(e)) => {
                    warn!("skipping {}: {e}", child_path.display());
                    used_names.remove(&short);
                    continue;
                }
                Err(e) => return Err(e),
            }
        } else if meta.is_file() {
            match import_file(fs, tree, &child_path, &meta) {
                Ok(file) => Child {
                    name: short,
                    attr: 0,
                    first_cluster: file.first_cluster,
                    size: file.size,
                    pending: None,
                },
                Err(FatblockError::Io(e)) => {
                    warn!("skipping {}: {e}", child_path.display());
                    used_names.remove(&short);
                    continue;
                }
                Err(e) => return Err(e),
            }
        } else {
            debug!("skipping special file {}", child_path.display());
            used_names.remove(&short);
            continue;
        };
        children.push(child);
    }

    let slots = children.len() + if is_root { 0 } else { 2 };
    // An empty root still declares one end-of-directory slot so it owns a cluster.
    let table_size = (slots.max(1) * DIRENT_SIZE) as u64;

    let handle = tree.push_dir(DirRecord {
        path: path.to_path_buf(),
        size: table_size,
        first_cluster: 0,
        entries: Vec::with_capacity(slots),
    });
    let (_, first_cluster) = fs.alloc_extent(table_size, ExtentKind::Dir(handle))?;

    let record = tree.dir_mut(handle);
    record.first_cluster = first_cluster;
    if !is_root {
        record
            .entries
            .push(Dirent::new(&DOT_NAME, ATTR_DIRECTORY, first_cluster, 0));
        // Parent cluster is filled in by the parent once it is allocated
        record
            .entries
            .push(Dirent::new(&DOTDOT_NAME, ATTR_DIRECTORY, 0, 0));
    }
    for child in &children {
        record.entries.push(Dirent::new(
            &child.name,
            child.attr,
            child.first_cluster,
            child.size,
        ));
    }

    // `..` pointing at the root is stored as cluster 0
    let parent_ref = if is_root { 0 } else { first_cluster };
    for pending in children.iter().filter_map(|c| c.pending) {
        tree.dir_mut(pending).entries[DOTDOT_INDEX].set_first_cluster(parent_ref);
    }

    Ok(DirImport {
        handle,
        first_cluster,
    })
}

#[cfg(unix)]
fn name_bytes(name: &OsStr) -> Option<&[u8]> {
    use std::os::unix::ffi::OsStrExt;
    Some(name.as_bytes())
}

#[cfg(not(unix))]
fn name_bytes(name: &OsStr) -> Option<&[u8]> {
    name.to_str().map(str::as_bytes)
}

#[cfg(unix)]
fn file_identity(meta: &Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (meta.dev(), meta.ino())
}

#[cfg(not(unix))]
fn file_identity(_meta: &Metadata) -> (u64, u64) {
    (0, 0)
}

#[cfg(unix)]
fn dir_identity(meta: &Metadata) -> Option<(u64, u64)> {
    Some(file_identity(meta))
}

#[cfg(not(unix))]
fn dir_identity(_meta: &Metadata) -> Option<(u64, u64)> {
    None
}
