// Filesystem signature probe

use alloc::vec;
use core::fmt;
use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;

/// Bytes read from the start of a partition for classification
pub const PROBE_SIZE: usize = 4096;

const FAT32_ID_OFFSET: usize = 82;
const FAT32_ID: &[u8; 5] = b"FAT32";

/// ext2/3/4 superblock magic at 1024 + 0x38
const EXT_MAGIC_OFFSET: usize = 1080;
const EXT_MAGIC: [u8; 2] = [0x53, 0xEF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsKind {
    None,
    Fat32,
    Ext4,
}

impl FsKind {
    pub fn name(&self) -> &'static str {
        match self {
            FsKind::None => "None",
            FsKind::Fat32 => "FAT32",
            FsKind::Ext4 => "EXT4",
        }
    }
}

impl fmt::Display for FsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn has_at(probe: &[u8], offset: usize, sig: &[u8]) -> bool {
    probe
        .get(offset..offset + sig.len())
        .map_or(false, |bytes| bytes == sig)
}

/// Classify the first bytes of a partition. FAT32 is checked first.
pub fn classify(probe: &[u8]) -> FsKind {
    if has_at(probe, FAT32_ID_OFFSET, FAT32_ID) {
        FsKind::Fat32
    } else if has_at(probe, EXT_MAGIC_OFFSET, &EXT_MAGIC) {
        FsKind::Ext4
    } else {
        FsKind::None
    }
}

/// Read the probe window at `start_lba` and classify it.
///
/// Read errors classify as `FsKind::None`.
pub fn detect<B: BlockIo>(block_io: &mut B, start_lba: u64) -> FsKind {
    let bs = block_io.block_size().to_u64() as usize;
    let blocks = (PROBE_SIZE + bs - 1) / bs;
    let mut probe = vec![0u8; blocks * bs];

    match block_io.read_blocks(Lba(start_lba), &mut probe) {
        Ok(()) => classify(&probe),
        Err(_) => FsKind::None,
    }
}
