use core::fmt;

/// Primary header lives right after the protective MBR
pub const PRIMARY_HEADER_LBA: u64 = 1;
/// Primary partition table starts after MBR + primary header
pub const PRIMARY_TABLE_LBA: u64 = 2;

pub const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";
pub const GPT_REVISION: u32 = 0x0001_0000;
pub const GPT_HEADER_SIZE: u32 = 92;

pub const PARTITION_ENTRY_SIZE: usize = 128;
pub const PARTITION_ENTRY_COUNT: usize = 128;
pub const PARTITION_TABLE_SIZE: usize = PARTITION_ENTRY_SIZE * PARTITION_ENTRY_COUNT;

/// Partition starts and ends are aligned to this many bytes
pub const ALIGNMENT_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GptError {
    /// Block read or write failed
    IoError,
    /// Header signature is not "EFI PART"
    InvalidSignature,
    /// Header fields are inconsistent (size, entry geometry, LBAs)
    InvalidHeader,
    /// Stored CRC32 does not match the data
    ChecksumMismatch,
    /// Every slot of the partition table is in use
    TableFull,
    /// New partition would end past the last usable LBA
    NoSpace { overflow: u64 },
    /// Zero or unrepresentable size
    InvalidSize,
    /// Disk cannot hold two headers, two tables and one usable block
    DiskTooSmall,
    /// Index past the used region of the table
    PartitionNotFound,
    /// Symbolic partition type has no registered GUID
    UnknownType,
}

impl fmt::Display for GptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError => write!(f, "I/O error"),
            Self::InvalidSignature => write!(f, "invalid GPT header signature"),
            Self::InvalidHeader => write!(f, "invalid GPT header"),
            Self::ChecksumMismatch => write!(f, "GPT checksum mismatch"),
            Self::TableFull => write!(f, "no free partition entries available"),
            Self::NoSpace { overflow } => write!(f, "out of space, {} blocks over", overflow),
            Self::InvalidSize => write!(f, "invalid size"),
            Self::DiskTooSmall => write!(f, "disk too small for a GPT"),
            Self::PartitionNotFound => write!(f, "partition not found"),
            Self::UnknownType => write!(f, "unknown partition type"),
        }
    }
}
