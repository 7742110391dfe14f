use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FatblockError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image capacity exceeded: need {needed} clusters, have {available}")]
    CapacityExceeded { needed: u64, available: u64 },

    #[error("invalid volume geometry: {0}")]
    InvalidGeometry(String),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// A backing file changed after import. Hosts must stop serving reads.
    #[error("backing store changed: {}", .0.display())]
    BackingStoreChanged(PathBuf),

    #[error("short read from {}: expected {expected} bytes at offset {offset}", .path.display())]
    ShortRead {
        path: PathBuf,
        offset: u64,
        expected: usize,
    },

    #[error("volume is read-only")]
    ReadOnly,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, FatblockError>;

impl From<FatblockError> for std::io::Error {
    fn from(e: FatblockError) -> Self {
        match e {
            FatblockError::Io(e) => e,
            other => std::io::Error::other(other),
        }
    }
}
