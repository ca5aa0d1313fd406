use core::fmt;

use crate::block::BlockError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Filesystem is not mounted or the disk failed
    NotReady,
    NotFound,
    NotADirectory,
    IsADirectory,
    AlreadyExists,
    /// Empty path, `.`/`..` leaf, name too long or path too deep
    InvalidPath,
    NoInodes,
    NoSpace,
    /// Write would grow the file past the direct-block ceiling
    FileTooLarge,
    /// Write starts past end of file and would leave a hole
    InvalidOffset,
    /// On-disk structures are inconsistent
    Corrupt,
    /// Sector read or write failed
    Io,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FsError::NotReady => "filesystem not ready",
            FsError::NotFound => "no such file or directory",
            FsError::NotADirectory => "not a directory",
            FsError::IsADirectory => "is a directory",
            FsError::AlreadyExists => "already exists",
            FsError::InvalidPath => "invalid path",
            FsError::NoInodes => "no free inodes",
            FsError::NoSpace => "no space left on device",
            FsError::FileTooLarge => "file too large",
            FsError::InvalidOffset => "invalid offset",
            FsError::Corrupt => "filesystem corrupt",
            FsError::Io => "i/o error",
        };
        f.write_str(msg)
    }
}

impl From<BlockError> for FsError {
    fn from(err: BlockError) -> Self {
        log::warn!("luxfs: block device error: {}", err);
        FsError::Io
    }
}
