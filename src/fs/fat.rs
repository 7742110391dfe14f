//! FAT32 volume layout: boot sector, FSInfo, the FAT itself, and the extent
//! index that maps byte ranges of the virtual volume to their data sources.
//!
//! The virtual volume layout is:
//!   [ Boot sector (0) | FSInfo (1) | Backup boot sector (6) | ... ]   reserved
//!   [ FAT (single copy, padded so data starts on a cluster boundary) ]
//!   [ Data clusters 2, 3, 4, ... allocated bottom-up ]

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use super::entry::{DirHandle, FileHandle};
use crate::error::{FatblockError, Result};

pub const SECTOR_SIZE: u64 = 512;
pub const RESERVED_SECTORS: u64 = 32;
pub const FSINFO_SECTOR: u64 = 1;
pub const BACKUP_BOOT_SECTOR: u64 = 6;
const NUM_FATS: u8 = 1;
const MEDIA_BYTE: u8 = 0xF8;

pub const MIN_CLUSTER_SIZE: u32 = 512;
pub const MAX_CLUSTER_SIZE: u32 = 32 * 1024;

// FAT32 entry values (low 28 bits significant)
pub const FAT_FREE: u32 = 0;
pub const FAT_BAD: u32 = 0x0FFF_FFF7;
pub const FAT_EOC: u32 = 0x0FFF_FFFF;
const FAT_ENTRY_MASK: u32 = 0x0FFF_FFFF;
const FAT_ENTRY_SIZE: u64 = 4;
/// Highest cluster number that is not a reserved marker.
const MAX_CLUSTER: u64 = 0x0FFF_FFF6;
/// Readers pick the FAT type from the cluster count alone; below this it is FAT16.
pub const MIN_FAT32_CLUSTERS: u64 = 65525;

const FSINFO_LEAD_SIG: u32 = 0x4161_5252;
const FSINFO_STRUCT_SIG: u32 = 0x6141_7272;
const FSINFO_TRAIL_SIG: u32 = 0xAA55_0000;
const FSINFO_UNKNOWN: u32 = 0xFFFF_FFFF;

/// What a region of the virtual volume is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentKind {
    Boot,
    Info,
    Fat,
    File(FileHandle),
    Dir(DirHandle),
}

/// A contiguous byte range of the virtual volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub start: u64,
    pub len: u64,
    pub kind: ExtentKind,
}

impl Extent {
    pub fn end(&self) -> u64 {
        self.start + self.len
    }
}

/// Intersection of a request with one extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentMatch {
    pub extent: Extent,
    /// Offset of the overlap within the request.
    pub req_off: u64,
    /// Offset of the overlap within the extent.
    pub ext_off: u64,
    pub len: u64,
}

/// Identity fields written into the boot sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeIdentity {
    pub oem_name: [u8; 8],
    pub label: [u8; 11],
    pub volume_id: u32,
}

impl Default for VolumeIdentity {
    fn default() -> Self {
        Self {
            oem_name: *b"FATBLOCK",
            label: *b"NO NAME    ",
            volume_id: 0x4641_5442,
        }
    }
}

/// Cluster bookkeeping and fixed metadata of a synthesized FAT32 volume.
#[derive(Debug)]
pub struct FatFs {
    cluster_size: u32,
    sectors_per_cluster: u8,
    fat_sectors: u32,
    total_sectors: u32,
    /// Byte offset of cluster 2.
    data_offset: u64,
    total_size: u64,

    identity: VolumeIdentity,
    root_cluster: u32,
    free_clusters: u32,

    boot_sector: [u8; SECTOR_SIZE as usize],
    fs_info: [u8; SECTOR_SIZE as usize],
    fat: Vec<u8>,

    /// Sorted by start offset: fixed regions first, then data in allocation order.
    extents: Vec<Extent>,
    /// Clusters 0 and 1 included.
    num_clusters: u32,
    /// One past the last cluster the requested data size covers.
    alloc_limit: u32,
    next_cluster: u32,
}

impl FatFs {
    /// Lay out a volume whose data region holds `data_size` bytes.
    ///
    /// The image always carries at least [`MIN_FAT32_CLUSTERS`] data clusters,
    /// so `total_size` can exceed what `data_size` implies.
    pub fn new(cluster_size: u32, data_size: u64) -> Result<Self> {
        if !cluster_size.is_power_of_two()
            || !(MIN_CLUSTER_SIZE..=MAX_CLUSTER_SIZE).contains(&cluster_size)
        {
            return Err(FatblockError::InvalidGeometry(format!(
                "cluster size {cluster_size} is not a power of two between {MIN_CLUSTER_SIZE} and {MAX_CLUSTER_SIZE}"
            )));
        }

        let requested_clusters = data_size.div_ceil(cluster_size as u64);
        if requested_clusters > MAX_CLUSTER - 1 {
            return Err(FatblockError::InvalidGeometry(format!(
                "{requested_clusters} data clusters exceed the FAT32 limit"
            )));
        }
        // Small volumes are padded with free clusters so they still read as FAT32.
        // Allocation stays bounded by the requested size.
        let data_clusters = requested_clusters.max(MIN_FAT32_CLUSTERS);
        let num_clusters = data_clusters + 2;

        let sectors_per_cluster = cluster_size as u64 / SECTOR_SIZE;
        let min_fat_sectors = (num_clusters * FAT_ENTRY_SIZE).div_ceil(SECTOR_SIZE);
        // Grow the FAT so the data region starts on a cluster boundary.
        let data_start_sector =
            (RESERVED_SECTORS + min_fat_sectors).div_ceil(sectors_per_cluster) * sectors_per_cluster;
        let fat_sectors = data_start_sector - RESERVED_SECTORS;
        let total_sectors = data_start_sector + data_clusters * sectors_per_cluster;
        if total_sectors > u32::MAX as u64 {
            return Err(FatblockError::InvalidGeometry(format!(
                "{total_sectors} sectors exceed the FAT32 limit"
            )));
        }

        let mut fat = vec![0u8; (num_clusters * FAT_ENTRY_SIZE) as usize];
        write_fat_entry(&mut fat, 0, 0x0FFF_FF00 | MEDIA_BYTE as u32);
        write_fat_entry(&mut fat, 1, FAT_EOC);

        let fat_len = fat_sectors * SECTOR_SIZE;
        let mut fs = Self {
            cluster_size,
            sectors_per_cluster: sectors_per_cluster as u8,
            fat_sectors: fat_sectors as u32,
            total_sectors: total_sectors as u32,
            data_offset: data_start_sector * SECTOR_SIZE,
            total_size: total_sectors * SECTOR_SIZE,
            identity: VolumeIdentity::default(),
            root_cluster: 0,
            free_clusters: data_clusters as u32,
            boot_sector: [0; SECTOR_SIZE as usize],
            fs_info: [0; SECTOR_SIZE as usize],
            fat,
            extents: Vec::new(),
            num_clusters: num_clusters as u32,
            alloc_limit: (requested_clusters + 2) as u32,
            next_cluster: 2,
        };

        fs.register(0, SECTOR_SIZE, ExtentKind::Boot);
        fs.register(FSINFO_SECTOR * SECTOR_SIZE, SECTOR_SIZE, ExtentKind::Info);
        fs.register(BACKUP_BOOT_SECTOR * SECTOR_SIZE, SECTOR_SIZE, ExtentKind::Boot);
        fs.register(RESERVED_SECTORS * SECTOR_SIZE, fat_len, ExtentKind::Fat);
        fs.encode_boot_sector();
        fs.encode_fs_info();

        debug!(
            "FAT32 layout: {} clusters of {} bytes, {} FAT sectors, data at {:#x}, {} bytes total",
            data_clusters, cluster_size, fat_sectors, fs.data_offset, fs.total_size
        );
        Ok(fs)
    }

    fn register(&mut self, start: u64, len: u64, kind: ExtentKind) -> Extent {
        let extent = Extent { start, len, kind };
        self.extents.push(extent);
        extent
    }

    /// Allocate contiguous clusters for `len` bytes and register their extent.
    ///
    /// Returns the extent and its first cluster. A zero-length request gets
    /// an empty extent and cluster 0 without touching the FAT.
    pub fn alloc_extent(&mut self, len: u64, kind: ExtentKind) -> Result<(Extent, u32)> {
        if len == 0 {
            let start = self.cluster_offset(self.next_cluster);
            return Ok((self.register(start, 0, kind), 0));
        }

        let count = len.div_ceil(self.cluster_size as u64);
        let available = (self.alloc_limit - self.next_cluster) as u64;
        if count > available {
            return Err(FatblockError::CapacityExceeded {
                needed: count,
                available,
            });
        }

        let first = self.next_cluster;
        let last = first + count as u32 - 1;
        for cluster in first..last {
            write_fat_entry(&mut self.fat, cluster, cluster + 1);
        }
        write_fat_entry(&mut self.fat, last, FAT_EOC);
        self.next_cluster = last + 1;

        let start = self.cluster_offset(first);
        let extent = self.register(start, count * self.cluster_size as u64, kind);
        Ok((extent, first))
    }

    /// Index of the first extent that could intersect a request at `start`.
    pub fn first_extent(&self, start: u64) -> usize {
        self.extents.partition_point(|e| e.end() <= start)
    }

    /// Next extent at or after `cursor` that intersects `[start, start + len)`.
    ///
    /// Advances `cursor` past the returned extent; call repeatedly until
    /// `None` to visit every intersecting extent in offset order.
    pub fn find_extent(&self, start: u64, len: u64, cursor: &mut usize) -> Option<ExtentMatch> {
        let end = start.saturating_add(len);
        while let Some(&extent) = self.extents.get(*cursor) {
            *cursor += 1;
            if extent.start >= end {
                // Sorted: nothing further can intersect
                *cursor = self.extents.len();
                return None;
            }
            if extent.len == 0 || extent.end() <= start {
                continue;
            }
            let from = start.max(extent.start);
            let to = end.min(extent.end());
            return Some(ExtentMatch {
                extent,
                req_off: from - start,
                ext_off: from - extent.start,
                len: to - from,
            });
        }
        None
    }

    /// Point the boot sector at the root directory's first cluster.
    pub fn set_root_cluster(&mut self, cluster: u32) {
        self.root_cluster = cluster;
        self.encode_boot_sector();
    }

    /// Record the unallocated cluster count in FSInfo.
    pub fn update_free_count(&mut self) {
        self.free_clusters = self.num_clusters - self.next_cluster;
        self.encode_fs_info();
    }

    pub fn set_identity(&mut self, identity: VolumeIdentity) {
        self.identity = identity;
        self.encode_boot_sector();
    }

    /// Byte offset of a data cluster.
    pub fn cluster_offset(&self, cluster: u32) -> u64 {
        self.data_offset + (cluster as u64).saturating_sub(2) * self.cluster_size as u64
    }

    pub fn fat_entry(&self, cluster: u32) -> u32 {
        read_fat_entry(&self.fat, cluster)
    }

    pub fn extents(&self) -> &[Extent] {
        &self.extents
    }

    pub fn boot_sector(&self) -> &[u8] {
        &self.boot_sector
    }

    pub fn fs_info(&self) -> &[u8] {
        &self.fs_info
    }

    pub fn fat(&self) -> &[u8] {
        &self.fat
    }

    pub fn cluster_size(&self) -> u32 {
        self.cluster_size
    }

    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn root_cluster(&self) -> u32 {
        self.root_cluster
    }

    pub fn num_clusters(&self) -> u32 {
        self.num_clusters
    }

    pub fn next_cluster(&self) -> u32 {
        self.next_cluster
    }

    pub fn free_clusters(&self) -> u32 {
        self.free_clusters
    }

    fn encode_boot_sector(&mut self) {
        let b = &mut self.boot_sector;
        b.fill(0);
        b[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
        b[3..11].copy_from_slice(&self.identity.oem_name);
        LittleEndian::write_u16(&mut b[11..13], SECTOR_SIZE as u16);
        b[13] = self.sectors_per_cluster;
        LittleEndian::write_u16(&mut b[14..16], RESERVED_SECTORS as u16);
        b[16] = NUM_FATS;
        // Root entry count, 16-bit total sectors and 16-bit FAT size stay zero on FAT32
        b[21] = MEDIA_BYTE;
        LittleEndian::write_u16(&mut b[24..26], 63); // sectors per track
        LittleEndian::write_u16(&mut b[26..28], 255); // heads
        LittleEndian::write_u32(&mut b[32..36], self.total_sectors);
        LittleEndian::write_u32(&mut b[36..40], self.fat_sectors);
        LittleEndian::write_u32(&mut b[44..48], self.root_cluster);
        LittleEndian::write_u16(&mut b[48..50], FSINFO_SECTOR as u16);
        LittleEndian::write_u16(&mut b[50..52], BACKUP_BOOT_SECTOR as u16);
        b[64] = 0x80; // drive number
        b[66] = 0x29; // extended boot signature
        LittleEndian::write_u32(&mut b[67..71], self.identity.volume_id);
        b[71..82].copy_from_slice(&self.identity.label);
        b[82..90].copy_from_slice(b"FAT32   ");
        b[510] = 0x55;
        b[511] = 0xAA;
    }

    fn encode_fs_info(&mut self) {
        let s = &mut self.fs_info;
        s.fill(0);
        LittleEndian::write_u32(&mut s[0..4], FSINFO_LEAD_SIG);
        LittleEndian::write_u32(&mut s[484..488], FSINFO_STRUCT_SIG);
        LittleEndian::write_u32(&mut s[488..492], self.free_clusters);
        let next_free = if self.next_cluster < self.num_clusters {
            self.next_cluster
        } else {
            FSINFO_UNKNOWN
        };
        LittleEndian::write_u32(&mut s[492..496], next_free);
        LittleEndian::write_u32(&mut s[508..512], FSINFO_TRAIL_SIG);
    }
}

/// Read a FAT32 entry. Out-of-range clusters read as free.
fn read_fat_entry(fat_data: &[u8], cluster: u32) -> u32 {
    let off = cluster as usize * 4;
    match fat_data.get(off..off + 4) {
        Some(raw) => LittleEndian::read_u32(raw) & FAT_ENTRY_MASK,
        None => FAT_FREE,
    }
}

/// Write a FAT32 entry, preserving the reserved upper 4 bits.
fn write_fat_entry(fat_data: &mut [u8], cluster: u32, value: u32) {
    let off = cluster as usize * 4;
    let Some(raw) = fat_data.get_mut(off..off + 4) else {
        return;
    };
    let existing = LittleEndian::read_u32(raw);
    LittleEndian::write_u32(raw, (existing & !FAT_ENTRY_MASK) | (value & FAT_ENTRY_MASK));
}

pub fn is_end_of_chain(entry: u32) -> bool {
    (entry & FAT_ENTRY_MASK) >= 0x0FFF_FFF8
}
