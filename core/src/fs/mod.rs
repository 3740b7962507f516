//! Filesystem side of the boot disk: signature detection for the loader and
//! the FAT32 formatter for the image tool.

pub mod detect;
pub mod fat32_format;

use core::fmt;

use crate::disk::gpt_ops::GptError;

pub use detect::{classify, detect, FsKind};
pub use fat32_format::{format_fat32, format_partition, verify_fat32, Fat32Layout};

/// Step of the formatter that was running when a write failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatStage {
    BootSector,
    FsInfo,
    BackupBootSector,
    BackupFsInfo,
    /// FAT copy number (0 or 1)
    Fat(u8),
    RootCluster,
    Flush,
}

impl fmt::Display for FormatStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BootSector => write!(f, "boot sector"),
            Self::FsInfo => write!(f, "FSInfo sector"),
            Self::BackupBootSector => write!(f, "backup boot sector"),
            Self::BackupFsInfo => write!(f, "backup FSInfo sector"),
            Self::Fat(n) => write!(f, "FAT #{}", n + 1),
            Self::RootCluster => write!(f, "root directory cluster"),
            Self::Flush => write!(f, "flush"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fat32Error {
    /// Block read failed
    IoError,
    WriteFailed(FormatStage),
    /// Cluster size is not a power-of-two multiple of the block size, or
    /// more than 128 blocks
    InvalidClusterSize,
    PartitionTooSmall,
    /// Sector counts do not fit the 32-bit BPB fields
    PartitionTooLarge,
    InvalidBootSector,
    InvalidFsInfo,
    InvalidFat,
    /// Partition lookup in the GPT failed
    Gpt(GptError),
}

impl From<GptError> for Fat32Error {
    fn from(err: GptError) -> Self {
        Self::Gpt(err)
    }
}

impl fmt::Display for Fat32Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError => write!(f, "I/O error"),
            Self::WriteFailed(stage) => write!(f, "write failed: {}", stage),
            Self::InvalidClusterSize => write!(f, "invalid cluster size"),
            Self::PartitionTooSmall => write!(f, "partition too small for FAT32"),
            Self::PartitionTooLarge => write!(f, "partition too large for FAT32"),
            Self::InvalidBootSector => write!(f, "invalid FAT32 boot sector"),
            Self::InvalidFsInfo => write!(f, "invalid FSInfo sector"),
            Self::InvalidFat => write!(f, "invalid FAT"),
            Self::Gpt(err) => write!(f, "{}", err),
        }
    }
}
