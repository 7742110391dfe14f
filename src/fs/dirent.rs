//! FAT directory entry encoding.

use byteorder::{ByteOrder, LittleEndian};

use super::shortname::ShortName;

pub const DIRENT_SIZE: usize = 32;

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
pub const ATTR_DEVICE: u8 = 0x40;

const NAME_OFFSET: usize = 0;
const ATTR_OFFSET: usize = 11;
const CLUSTER_HI_OFFSET: usize = 20;
const CLUSTER_LO_OFFSET: usize = 26;
const SIZE_OFFSET: usize = 28;

/// One 32-byte short-name directory entry, stored in on-disk form.
///
/// Reserved bytes and all timestamps are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dirent {
    bytes: [u8; DIRENT_SIZE],
}

impl Dirent {
    pub fn new(name: &ShortName, attr: u8, first_cluster: u32, size: u32) -> Self {
        let mut bytes = [0u8; DIRENT_SIZE];
        bytes[NAME_OFFSET..NAME_OFFSET + 11].copy_from_slice(name);
        bytes[ATTR_OFFSET] = attr;
        LittleEndian::write_u32(&mut bytes[SIZE_OFFSET..SIZE_OFFSET + 4], size);
        let mut entry = Self { bytes };
        entry.set_first_cluster(first_cluster);
        entry
    }

    /// Rewrite only the first-cluster fields.
    pub fn set_first_cluster(&mut self, cluster: u32) {
        LittleEndian::write_u16(
            &mut self.bytes[CLUSTER_HI_OFFSET..CLUSTER_HI_OFFSET + 2],
            (cluster >> 16) as u16,
        );
        LittleEndian::write_u16(
            &mut self.bytes[CLUSTER_LO_OFFSET..CLUSTER_LO_OFFSET + 2],
            cluster as u16,
        );
    }

    pub fn name(&self) -> &[u8] {
        &self.bytes[NAME_OFFSET..NAME_OFFSET + 11]
    }

    pub fn attr(&self) -> u8 {
        self.bytes[ATTR_OFFSET]
    }

    pub fn is_directory(&self) -> bool {
        self.attr() & ATTR_DIRECTORY != 0
    }

    pub fn first_cluster(&self) -> u32 {
        let hi = LittleEndian::read_u16(&self.bytes[CLUSTER_HI_OFFSET..CLUSTER_HI_OFFSET + 2]);
        let lo = LittleEndian::read_u16(&self.bytes[CLUSTER_LO_OFFSET..CLUSTER_LO_OFFSET + 2]);
        ((hi as u32) << 16) | lo as u32
    }

    pub fn size(&self) -> u32 {
        LittleEndian::read_u32(&self.bytes[SIZE_OFFSET..SIZE_OFFSET + 4])
    }

    pub fn as_bytes(&self) -> &[u8; DIRENT_SIZE] {
        &self.bytes
    }

    /// Decode an entry from raw directory table bytes.
    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        let bytes: [u8; DIRENT_SIZE] = raw.get(..DIRENT_SIZE)?.try_into().ok()?;
        Some(Self { bytes })
    }
}
