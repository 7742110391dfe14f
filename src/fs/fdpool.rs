//! Bounded most-recently-used cache of open backing files.
//!
//! An imported tree can hold far more files than the process may keep open,
//! so only a small working set of descriptors stays open while serving reads.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io;
use std::path::Path;

use log::debug;

use super::entry::FileHandle;

pub struct DescriptorPool {
    capacity: usize,
    open: HashMap<FileHandle, File>,
    /// Most recently used first.
    order: VecDeque<FileHandle>,
}

impl DescriptorPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            open: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Return the open file for `handle`, opening `path` on a miss.
    ///
    /// A hit promotes the entry to most recently used. A miss on a full pool
    /// closes the least recently used file first.
    pub fn open(&mut self, handle: FileHandle, path: &Path) -> io::Result<&mut File> {
        if self.open.contains_key(&handle) {
            self.promote(handle);
        } else {
            if self.open.len() >= self.capacity {
                if let Some(victim) = self.order.pop_back() {
                    debug!("closing descriptor for file #{}", victim.0);
                    self.open.remove(&victim);
                }
            }
            let file = File::open(path)?;
            self.open.insert(handle, file);
            self.order.push_front(handle);
        }

        self.open
            .get_mut(&handle)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "descriptor evicted"))
    }

    /// Close the descriptor for `handle` if it is open.
    pub fn close(&mut self, handle: FileHandle) {
        if self.open.remove(&handle).is_some() {
            self.order.retain(|&h| h != handle);
        }
    }

    fn promote(&mut self, handle: FileHandle) {
        if let Some(pos) = self.order.iter().position(|&h| h == handle) {
            self.order.remove(pos);
        }
        self.order.push_front(handle);
    }

    pub fn contains(&self, handle: FileHandle) -> bool {
        self.open.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
