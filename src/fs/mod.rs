pub mod dirent;
pub mod entry;
pub mod fat;
pub mod fdpool;
pub mod import;
pub mod read;
pub mod shortname;
pub mod volume;

pub use entry::{DirHandle, DirRecord, FileHandle, FileRecord, Tree};
pub use fat::{Extent, ExtentKind, ExtentMatch, FatFs};
pub use read::VolumeReader;
pub use volume::Volume;
