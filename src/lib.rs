//! Synthesizes a read-only FAT32 volume from a real directory tree and answers
//! byte-range reads against it without copying file contents.
//!
//! The volume is built once by [`fs::Volume::import`] and then served through
//! the [`device::BlockDevice`] trait.

pub mod config;
pub mod device;
pub mod error;
pub mod fs;

pub use config::FatblockConfig;
pub use device::BlockDevice;
pub use error::{FatblockError, Result};
pub use fs::{Volume, VolumeReader};
