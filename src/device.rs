//! Block-device surface served by a synthesized volume.

use crate::error::Result;
use crate::fs::Volume;

/// Byte-addressed read-only device, as seen by a virtual block host.
pub trait BlockDevice {
    /// Device length in bytes.
    fn size(&self) -> u64;

    /// Fill `buf` starting at byte `offset`.
    fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<()>;

    fn write(&mut self, buf: &[u8], offset: u64) -> Result<()>;
}

impl BlockDevice for Volume {
    fn size(&self) -> u64 {
        Volume::size(self)
    }

    fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        Volume::read(self, buf, offset)
    }

    fn write(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        Volume::write(self, buf, offset)
    }
}

/// Human-readable size in binary units.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FatblockConfig;
    use tempfile::TempDir;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.0 KiB");
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(64 * 1024 * 1024), "64.0 MiB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GiB");
        assert_eq!(format_size(2048 * 1024 * 1024 * 1024), "2.0 TiB");
    }

    fn serve(device: &mut dyn BlockDevice) -> Vec<u8> {
        let mut sector = vec![0u8; 512];
        device.read(&mut sector, 0).unwrap();
        sector
    }

    #[test]
    fn test_volume_as_block_device() {
        let tmp = TempDir::new().unwrap();
        let config = FatblockConfig {
            cluster_size: 512,
            ..Default::default()
        };
        let mut volume = Volume::import(tmp.path(), 1, &config).unwrap();
        let expected = volume.size();

        let device: &mut dyn BlockDevice = &mut volume;
        assert_eq!(device.size(), expected);
        assert!(device.write(&[0u8; 512], 0).is_err());

        let sector = serve(device);
        assert_eq!(&sector[510..], &[0x55, 0xAA]);
    }
}
