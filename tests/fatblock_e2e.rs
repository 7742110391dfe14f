//! End-to-end tests importing real directory trees.
//!
//! Each test builds a small tree under a temp dir, imports it, and inspects
//! the synthesized image either through `Volume::read` directly or by
//! mounting the whole image with the `fatfs` reader.
//!
//! Run with: cargo test --test fatblock_e2e

use std::fs::OpenOptions;
use std::io::{Cursor, Read};
use std::path::Path;
use std::time::{Duration, SystemTime};

use fatblock::fs::dirent::{Dirent, ATTR_DIRECTORY, DIRENT_SIZE};
use fatblock::fs::fat::{BACKUP_BOOT_SECTOR, SECTOR_SIZE};
use fatblock::fs::ExtentKind;
use fatblock::{BlockDevice, FatblockConfig, FatblockError, Volume, VolumeReader};
use tempfile::TempDir;

fn config_512() -> FatblockConfig {
    FatblockConfig {
        cluster_size: 512,
        ..Default::default()
    }
}

fn write_file(root: &Path, rel: &str, data: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, data).unwrap();
}

/// hello.txt, docs/readme.md, docs/deep/nested.bin (3000 bytes), empty/
fn sample_tree() -> TempDir {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "hello.txt", b"Hello, FAT32!");
    write_file(tmp.path(), "docs/readme.md", b"# readme\n");
    let nested: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
    write_file(tmp.path(), "docs/deep/nested.bin", &nested);
    std::fs::create_dir(tmp.path().join("empty")).unwrap();
    tmp
}

fn small_volume(root: &Path) -> Volume {
    Volume::import_with_data_size(root, 512 * 1024, &config_512()).unwrap()
}

fn read_image(volume: &mut Volume) -> Vec<u8> {
    let mut image = Vec::new();
    VolumeReader::new(volume).read_to_end(&mut image).unwrap();
    image
}

fn read_dirents(volume: &mut Volume, cluster: u32) -> Vec<Dirent> {
    let offset = volume.fs().cluster_offset(cluster);
    let mut buf = vec![0u8; volume.fs().cluster_size() as usize];
    volume.read(&mut buf, offset).unwrap();
    buf.chunks(DIRENT_SIZE)
        .take_while(|raw| raw[0] != 0)
        .map(|raw| Dirent::from_bytes(raw).unwrap())
        .collect()
}

fn find_dirent(entries: &[Dirent], name: &[u8; 11]) -> Dirent {
    *entries
        .iter()
        .find(|d| d.name() == name)
        .unwrap_or_else(|| panic!("missing {:?}", String::from_utf8_lossy(name)))
}

// ============================================================================
// Reference reader
// ============================================================================

#[test]
fn test_fatfs_mounts_image() {
    let tmp = sample_tree();
    let mut volume = Volume::import(tmp.path(), 40, &config_512()).unwrap();
    let image = read_image(&mut volume);

    let fs = fatfs::FileSystem::new(Cursor::new(image), fatfs::FsOptions::new()).unwrap();
    let root = fs.root_dir();

    let mut names: Vec<String> = root
        .iter()
        .map(|e| e.unwrap().file_name().to_ascii_uppercase())
        .collect();
    names.sort();
    assert_eq!(names, vec!["DOCS", "EMPTY", "HELLO.TXT"]);

    let mut hello = String::new();
    root.open_file("HELLO.TXT")
        .unwrap()
        .read_to_string(&mut hello)
        .unwrap();
    assert_eq!(hello, "Hello, FAT32!");

    let mut nested = Vec::new();
    root.open_file("DOCS/DEEP/NESTED.BIN")
        .unwrap()
        .read_to_end(&mut nested)
        .unwrap();
    assert_eq!(nested.len(), 3000);
    assert!(nested.iter().enumerate().all(|(i, &b)| b == (i % 251) as u8));

    let empty = root.open_dir("EMPTY").unwrap();
    let entries: Vec<String> = empty.iter().map(|e| e.unwrap().file_name()).collect();
    assert_eq!(entries, vec![".", ".."]);
}

#[test]
fn test_fatfs_mounts_default_config_image() {
    let tmp = sample_tree();
    // 4096-byte clusters leave far fewer than 65525 clusters in 100 MiB
    let mut volume = Volume::import(tmp.path(), 100, &FatblockConfig::default()).unwrap();
    assert!(volume.fs().num_clusters() - 2 >= 65_525);
    let image = read_image(&mut volume);

    let fs = fatfs::FileSystem::new(Cursor::new(image), fatfs::FsOptions::new()).unwrap();
    assert_eq!(fs.fat_type(), fatfs::FatType::Fat32);

    let mut readme = String::new();
    fs.root_dir()
        .open_file("DOCS/README.MD")
        .unwrap()
        .read_to_string(&mut readme)
        .unwrap();
    assert_eq!(readme, "# readme\n");
}

#[test]
fn test_fatfs_reads_label() {
    let tmp = TempDir::new().unwrap();
    let config = FatblockConfig {
        volume_label: "backup".to_string(),
        ..config_512()
    };
    let mut volume = Volume::import(tmp.path(), 40, &config).unwrap();
    let image = read_image(&mut volume);

    assert_eq!(&image[71..82], b"BACKUP     ");
    let fs = fatfs::FileSystem::new(Cursor::new(image), fatfs::FsOptions::new()).unwrap();
    assert_eq!(fs.volume_label().trim_end(), "BACKUP");
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_single_file_layout() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "foo.txt", b"abcd");
    let mut volume = small_volume(tmp.path());

    let root_cluster = volume.fs().root_cluster();
    let entries = read_dirents(&mut volume, root_cluster);
    assert_eq!(entries.len(), 1);
    let foo = entries[0];
    assert_eq!(foo.name(), b"FOO     TXT");
    assert_eq!(foo.size(), 4);
    assert_eq!(foo.first_cluster(), 2);

    let mut cluster = vec![0xAAu8; 512];
    let offset = volume.fs().cluster_offset(2);
    volume.read(&mut cluster, offset).unwrap();
    assert_eq!(&cluster[..4], b"abcd");
    assert!(cluster[4..].iter().all(|&b| b == 0));
}

#[test]
fn test_empty_subdirectory() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("sub/inner")).unwrap();
    let mut volume = small_volume(tmp.path());

    let root_cluster = volume.fs().root_cluster();
    let sub = find_dirent(&read_dirents(&mut volume, root_cluster), b"SUB        ");
    assert_ne!(sub.attr() & ATTR_DIRECTORY, 0);

    let sub_entries = read_dirents(&mut volume, sub.first_cluster());
    let inner = find_dirent(&sub_entries, b"INNER      ");
    assert!(inner.is_directory());

    let inner_entries = read_dirents(&mut volume, inner.first_cluster());
    assert_eq!(inner_entries.len(), 2);
    assert_eq!(inner_entries[0].name(), b".          ");
    assert_eq!(inner_entries[0].first_cluster(), inner.first_cluster());
    assert_eq!(inner_entries[1].name(), b"..         ");
    assert_eq!(inner_entries[1].first_cluster(), sub.first_cluster());

    // A parent that is the root is referenced as cluster 0
    assert_eq!(sub_entries[1].name(), b"..         ");
    assert_eq!(sub_entries[1].first_cluster(), 0);
}

#[test]
fn test_disallowed_name_is_absent() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "a+b.txt", b"plus");
    write_file(tmp.path(), "ok.txt", b"fine");
    let mut volume = small_volume(tmp.path());

    let root_cluster = volume.fs().root_cluster();
    let entries = read_dirents(&mut volume, root_cluster);
    let names: Vec<&[u8]> = entries.iter().map(|d| d.name()).collect();
    assert_eq!(names, vec![b"OK      TXT".as_slice()]);
    assert_eq!(volume.tree().files.len(), 1);
}

#[test]
fn test_touched_file_is_reported() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "foo.txt", b"abcd");
    write_file(tmp.path(), "other.txt", b"untouched");
    let mut volume = small_volume(tmp.path());

    let file = OpenOptions::new()
        .write(true)
        .open(tmp.path().join("foo.txt"))
        .unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(3600))
        .unwrap();

    let foo_offset = volume.fs().cluster_offset(2);
    let mut buf = vec![0u8; 512];
    match volume.read(&mut buf, foo_offset) {
        Err(FatblockError::BackingStoreChanged(path)) => assert!(path.ends_with("foo.txt")),
        other => panic!("expected BackingStoreChanged, got {other:?}"),
    }

    // Extents that avoid the changed file still read
    let other_offset = volume.fs().cluster_offset(3);
    volume.read(&mut buf, other_offset).unwrap();
    assert_eq!(&buf[..9], b"untouched");
}

#[test]
fn test_tree_larger_than_image() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "big.bin", &vec![7u8; 10 * 1024]);

    let err = Volume::import_with_data_size(tmp.path(), 4096, &config_512())
        .err()
        .unwrap();
    assert!(matches!(err, FatblockError::CapacityExceeded { .. }));
}

// ============================================================================
// Image properties
// ============================================================================

#[test]
fn test_import_is_deterministic() {
    let tmp = sample_tree();
    let first = read_image(&mut small_volume(tmp.path()));
    let second = read_image(&mut small_volume(tmp.path()));
    assert_eq!(first.len(), second.len());
    assert!(first == second, "images differ");
}

#[test]
fn test_extents_are_disjoint_and_sized() {
    let tmp = sample_tree();
    let volume = small_volume(tmp.path());
    let cluster = volume.fs().cluster_size() as u64;

    let extents = volume.fs().extents();
    for pair in extents.windows(2) {
        assert!(pair[0].end() <= pair[1].start, "{pair:?} overlap");
    }

    for extent in extents {
        let size = match extent.kind {
            ExtentKind::File(h) => volume.tree().file(h).size,
            ExtentKind::Dir(h) => volume.tree().dir(h).size,
            _ => continue,
        };
        assert_eq!(extent.len, size.div_ceil(cluster) * cluster);
        assert!(extent.end() <= volume.size());
    }
}

#[test]
fn test_metadata_regions() {
    let tmp = sample_tree();
    let mut volume = small_volume(tmp.path());

    let mut head = vec![0xEEu8; 4 * 1024];
    volume.read(&mut head, 0).unwrap();
    let boot = volume.fs().boot_sector().to_vec();
    let info = volume.fs().fs_info().to_vec();

    assert_eq!(&head[..512], &boot[..]);
    assert_eq!(&head[512..1024], &info[..]);
    let backup = (BACKUP_BOOT_SECTOR * SECTOR_SIZE) as usize;
    assert!(head[1024..backup].iter().all(|&b| b == 0));
    assert_eq!(&head[backup..backup + 512], &boot[..]);
    assert!(head[backup + 512..].iter().all(|&b| b == 0));

    let fat_offset = 32 * SECTOR_SIZE;
    let mut fat = vec![0u8; 8];
    volume.read(&mut fat, fat_offset).unwrap();
    assert_eq!(&fat[..4], &0x0FFF_FFF8u32.to_le_bytes());
    assert_eq!(&fat[4..], &0x0FFF_FFFFu32.to_le_bytes());
}

#[test]
fn test_read_past_end_is_zero() {
    let tmp = sample_tree();
    let mut volume = small_volume(tmp.path());
    let mut buf = vec![0xEEu8; 1024];
    volume.read(&mut buf, volume.size() + 4096).unwrap();
    assert!(buf.iter().all(|&b| b == 0));
}

#[test]
fn test_many_files_small_descriptor_cache() {
    let tmp = TempDir::new().unwrap();
    for i in 0..12 {
        write_file(tmp.path(), &format!("f{i:02}.dat"), format!("payload {i}").as_bytes());
    }
    let config = FatblockConfig {
        descriptor_cache_size: 3,
        ..config_512()
    };
    let mut volume = Volume::import_with_data_size(tmp.path(), 512 * 1024, &config).unwrap();

    // Two passes so evicted descriptors get reopened
    for _ in 0..2 {
        for i in 0..12u32 {
            let offset = volume.fs().cluster_offset(2 + i);
            let mut buf = vec![0u8; 16];
            volume.read(&mut buf, offset).unwrap();
            let expected = format!("payload {i}");
            assert_eq!(&buf[..expected.len()], expected.as_bytes());
            assert!(volume.open_descriptors() <= 3);
        }
    }
}

#[test]
fn test_block_device_rejects_writes() {
    let tmp = sample_tree();
    let mut volume = small_volume(tmp.path());
    let device: &mut dyn BlockDevice = &mut volume;
    assert!(matches!(
        device.write(&[1u8; 512], 0),
        Err(FatblockError::ReadOnly)
    ));

    let mut sector = vec![0u8; 512];
    device.read(&mut sector, 0).unwrap();
    assert_eq!(&sector[510..], &[0x55, 0xAA]);
}
